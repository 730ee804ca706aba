use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::executor::Executor;

/// Identifies a future in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FutureId(u64);

impl fmt::Display for FutureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The explicitly injected environment of a family of futures: where
/// deferred work runs, and how futures behave.
///
/// Cheap to clone. Futures created by `then` and the combinators inherit
/// the scheduler of the future they were derived from.
#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<dyn Executor>,
    config: Config,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new(executor: Arc<dyn Executor>) -> Scheduler {
        Scheduler::with_config(executor, Config::default())
    }

    pub fn with_config(executor: Arc<dyn Executor>, config: Config) -> Scheduler {
        Scheduler {
            executor,
            config,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn schedule<F>(&self, id: FutureId, what: &'static str, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        tracing::trace!(future = %id, what, "scheduling task");
        self.executor.add(Box::new(work));
    }

    pub(crate) fn next_id(&self) -> FutureId {
        FutureId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

use std::fmt;
use std::sync::Arc;

use crate::detail::core::{Core, Phase, Pile};
use crate::future::{Future, Reason, Value};
use crate::outcome::{Outcome, Resolution};

/// The settlement side of a [`Future`]: the pair of functions a producer
/// uses to fulfill or reject it.
///
/// Clones share the same future. Only the first settlement through any clone
/// takes effect; later calls are ignored.
pub struct Promise<T, E> {
    pub(crate) core: Arc<Core<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Promise<T, E> {
        Promise {
            core: self.core.clone(),
        }
    }
}

impl<T: Value, E: Reason> Promise<T, E> {
    pub fn fulfill(&self, value: T) {
        self.core.settle(Outcome::Value(Resolution::Value(value)));
    }

    /// Fulfills with a value, or forwards to a nested future.
    pub fn resolve(&self, resolution: impl Into<Resolution<T, E>>) {
        self.core.settle(Outcome::Value(resolution.into()));
    }

    pub fn reject(&self, reason: E) {
        self.core.settle(Outcome::Error(reason));
    }

    pub fn settle(&self, outcome: impl Into<Outcome<T, E>>) {
        match outcome.into() {
            Outcome::Value(value) => self.fulfill(value),
            Outcome::Error(reason) => self.reject(reason),
        }
    }

    /// True once a settlement call has taken effect, including resolution
    /// with a nested future that is still pending.
    pub fn is_resolved(&self) -> bool {
        self.core.phase() != Phase::Pending
    }

    pub fn future(&self) -> Future<T, E> {
        Future {
            core: self.core.clone(),
        }
    }

    /// Drops this handle, moving the core onto `pile` if it was the last.
    pub(crate) fn release(self, pile: &mut Pile) {
        if let Some(core) = Arc::into_inner(self.core) {
            pile.push(Box::new(core));
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("future", &self.core.id())
            .field("phase", &self.core.phase())
            .finish()
    }
}

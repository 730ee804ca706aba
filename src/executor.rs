use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

/// A unit of deferred work.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// An Executor accepts units of work with add(), which must be
/// threadsafe.
///
/// Implementations must never run `work` inline: it runs only after the
/// call to `add` has returned. Work added from one thread should run in
/// submission order where the executor can offer it.
pub trait Executor: Send + Sync {
    fn add(&self, work: Work);
}

/// Queues work until the owner drains it with [`run`](Self::run).
///
/// Work added by a task that is currently running goes to the back of the
/// queue instead of being executed nested, so one call to `run` behaves like
/// an event loop turning until it goes idle.
#[derive(Default)]
pub struct QueuedExecutor {
    queue: Mutex<VecDeque<Work>>,
}

impl QueuedExecutor {
    pub fn new() -> QueuedExecutor {
        QueuedExecutor::default()
    }

    /// Runs the oldest queued task. Returns false if the queue was empty.
    pub fn run_once(&self) -> bool {
        // The lock is released before the work runs so it can add more.
        let work = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match work {
            Some(work) => {
                work();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, returning how many ran.
    pub fn run(&self) -> usize {
        let mut ran = 0;
        while self.run_once() {
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Executor for QueuedExecutor {
    fn add(&self, work: Work) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(work);
    }
}

impl fmt::Debug for QueuedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

enum Message {
    Run(Work),
    Close,
}

struct PoolState {
    tx: Mutex<mpsc::Sender<Message>>,
    rx: Mutex<mpsc::Receiver<Message>>,
    size: usize,
}

impl PoolState {
    fn send(&self, msg: Message) {
        let sent = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(msg);
        if sent.is_err() {
            tracing::warn!("thread pool has no workers left; dropping task");
        }
    }

    fn work(&self, idx: usize) {
        tracing::trace!(worker = idx, "worker started");
        loop {
            let msg = self.rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
            match msg {
                Ok(Message::Run(work)) => {
                    if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                        tracing::warn!(worker = idx, "task panicked");
                    }
                }
                Ok(Message::Close) | Err(_) => break,
            }
        }
        tracing::trace!(worker = idx, "worker stopped");
    }
}

/// A fixed-size pool of worker threads pulling work from a shared channel.
///
/// Dropping the pool asks every worker to stop once the work queued ahead
/// of the request has run.
pub struct ThreadPoolExecutor {
    state: Arc<PoolState>,
}

impl ThreadPoolExecutor {
    pub fn new(size: usize) -> io::Result<ThreadPoolExecutor> {
        ThreadPoolExecutor::with_name_prefix(size, "deferred-worker-")
    }

    pub fn with_name_prefix(size: usize, name_prefix: &str) -> io::Result<ThreadPoolExecutor> {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(PoolState {
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
            size,
        });
        // Dropping the pool on a failed spawn closes the workers already started.
        let pool = ThreadPoolExecutor { state };
        for idx in 0..size {
            let state = pool.state.clone();
            thread::Builder::new()
                .name(format!("{name_prefix}{idx}"))
                .spawn(move || state.work(idx))?;
        }
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.state.size
    }
}

impl Executor for ThreadPoolExecutor {
    fn add(&self, work: Work) {
        self.state.send(Message::Run(work));
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        for _ in 0..self.state.size {
            self.state.send(Message::Close);
        }
    }
}

impl fmt::Debug for ThreadPoolExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolExecutor")
            .field("size", &self.state.size)
            .finish()
    }
}

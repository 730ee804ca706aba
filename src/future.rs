use std::fmt;
use std::sync::Arc;

use crate::detail::core::Core;
use crate::error::{guard, Fault};
use crate::outcome::{Outcome, Resolution, State};
use crate::promise::Promise;
use crate::reaction::{Finally, OnFulfilled, OnRejected, Then};
use crate::scheduler::{FutureId, Scheduler};

/// A type a future can be fulfilled with. A settled value is shared by the
/// tasks that deliver it and cloned once per attached reaction, never while
/// the future is locked.
pub trait Value: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Value for T {}

/// A type a future can be rejected with. `From<Fault>` lets panics and
/// resolution cycles become rejections.
pub trait Reason: Clone + Send + Sync + From<Fault> + 'static {}

impl<E: Clone + Send + Sync + From<Fault> + 'static> Reason for E {}

/// A value that is not available yet.
///
/// A future starts pending and settles exactly once, to a value or to a
/// reason. Continuations attached with [`then`](Future::then) and friends
/// each produce a new future and always run from a task handed to the
/// future's [`Scheduler`], never inside the call that attached or settled.
pub struct Future<T, E> {
    pub(crate) core: Arc<Core<T, E>>,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Future<T, E> {
        Future {
            core: self.core.clone(),
        }
    }
}

impl<T: Value, E: Reason> Future<T, E> {
    /// Creates a future settled by `producer`, which runs once from a
    /// scheduled task. A panicking producer rejects the future.
    pub fn new<F>(scheduler: &Scheduler, producer: F) -> Future<T, E>
    where
        F: FnOnce(Promise<T, E>) + Send + 'static,
    {
        let (future, promise) = Future::pending(scheduler);
        scheduler.schedule(future.id(), "producer", move || {
            let settle = promise.clone();
            if let Err(fault) = guard(move || producer(settle)) {
                promise.reject(E::from(fault));
            }
        });
        future
    }

    /// Creates an unsettled future together with its settlement functions.
    pub fn pending(scheduler: &Scheduler) -> (Future<T, E>, Promise<T, E>) {
        let core = Core::new(scheduler.clone());
        (Future { core: core.clone() }, Promise { core })
    }

    /// Attaches a reaction built from an explicit pair of handlers, either
    /// of which may pass its outcome through.
    pub fn then_with<U: Value>(
        &self,
        on_fulfilled: OnFulfilled<T, U, E>,
        on_rejected: OnRejected<U, E>,
    ) -> Future<U, E> {
        let (downstream, promise) = Future::pending(self.core.scheduler());
        tracing::trace!(
            future = %self.id(),
            downstream = %downstream.id(),
            pass_through = on_fulfilled.is_pass_through() && on_rejected.is_pass_through(),
            "attaching reaction"
        );
        self.core.attach(Box::new(Then {
            on_fulfilled,
            on_rejected,
            downstream: promise,
        }));
        downstream
    }

    /// Attaches both handlers. Returning `Err` from either rejects the
    /// downstream future.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U, E>
    where
        U: Value,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
        R: FnOnce(E) -> Result<U, E> + Send + 'static,
    {
        self.then_with(OnFulfilled::value(on_fulfilled), OnRejected::value(on_rejected))
    }

    /// Attaches a fulfillment handler; rejections pass through.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Future<U, E>
    where
        U: Value,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.then_with(OnFulfilled::value(on_fulfilled), OnRejected::pass_through())
    }

    /// Attaches a fulfillment handler returning a future; the downstream
    /// settles the way that future does.
    pub fn chain<U, F>(&self, on_fulfilled: F) -> Future<U, E>
    where
        U: Value,
        F: FnOnce(T) -> Future<U, E> + Send + 'static,
    {
        self.then_with(OnFulfilled::future(on_fulfilled), OnRejected::pass_through())
    }

    /// Attaches a rejection handler; fulfillments pass through.
    pub fn catch<R>(&self, on_rejected: R) -> Future<T, E>
    where
        R: FnOnce(E) -> Result<T, E> + Send + 'static,
    {
        self.then_with(OnFulfilled::pass_through(), OnRejected::value(on_rejected))
    }

    /// Runs `callback` once this future settles either way, then settles
    /// the returned future identically.
    pub fn finally<F>(&self, callback: F) -> Future<T, E>
    where
        F: FnOnce() + Send + 'static,
    {
        let (downstream, promise) = Future::pending(self.core.scheduler());
        self.core.attach(Box::new(Finally {
            callback,
            downstream: promise,
        }));
        downstream
    }

    /// The settled outcome, if known now. A future fulfilled with a nested
    /// future reports the nested outcome, or `None` while that is pending.
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        let mut visited: Vec<Arc<Core<T, E>>> = Vec::new();
        let mut core = self.core.clone();
        loop {
            match core.settled()? {
                Outcome::Value(Resolution::Value(value)) => return Some(Outcome::Value(value)),
                Outcome::Error(reason) => return Some(Outcome::Error(reason)),
                Outcome::Value(Resolution::Future(inner)) => {
                    visited.push(core);
                    if visited.iter().any(|seen| Arc::ptr_eq(seen, &inner.core)) {
                        return None;
                    }
                    core = inner.core;
                }
            }
        }
    }
}

impl<T, E> Future<T, E> {
    /// The recorded state. With lazy forwarding a future fulfilled with a
    /// still pending nested future already reports `Fulfilled`.
    pub fn state(&self) -> State {
        self.core.phase().state()
    }

    pub fn id(&self) -> FutureId {
        self.core.id()
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.core.scheduler()
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::{Future, Reason, Value};
    use crate::config::{Config, Forwarding};
    use crate::error::{Error, Fault};
    use crate::executor::{Executor, QueuedExecutor, ThreadPoolExecutor, Work};
    use crate::outcome::{Outcome, State};
    use crate::promise::Promise;
    use crate::reaction::{OnFulfilled, OnRejected};
    use crate::scheduler::Scheduler;

    fn queued() -> (Arc<QueuedExecutor>, Scheduler) {
        let exec = Arc::new(QueuedExecutor::new());
        let scheduler = Scheduler::new(exec.clone());
        (exec, scheduler)
    }

    fn queued_with(forwarding: Forwarding) -> (Arc<QueuedExecutor>, Scheduler) {
        let exec = Arc::new(QueuedExecutor::new());
        let config = Config::default().with_forwarding(forwarding);
        let scheduler = Scheduler::with_config(exec.clone(), config);
        (exec, scheduler)
    }

    type Log<T, E> = Arc<Mutex<Vec<Outcome<T, E>>>>;

    /// Attaches a terminal reaction recording every outcome it sees.
    fn record<T: Value, E: Reason>(future: &Future<T, E>) -> Log<T, E> {
        let log: Log<T, E> = Arc::new(Mutex::new(Vec::new()));
        let (ok, err) = (log.clone(), log.clone());
        future.then(
            move |value| {
                ok.lock().unwrap().push(Outcome::Value(value));
                Ok(())
            },
            move |reason| {
                err.lock().unwrap().push(Outcome::Error(reason));
                Ok(())
            },
        );
        log
    }

    #[test]
    fn test_producer_runs_once_and_deferred() {
        let (exec, s) = queued();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let future = Future::<u32, String>::new(&s, move |promise| {
            c.fetch_add(1, Ordering::SeqCst);
            promise.fulfill(7);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(future.state(), State::Pending);
        exec.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(future.peek(), Some(Outcome::Value(7)));
    }

    #[test]
    fn test_settlement_is_idempotent() {
        let (exec, s) = queued();
        let (future, promise) = Future::<u32, String>::pending(&s);
        let log = record(&future);
        promise.fulfill(1);
        exec.run();
        promise.fulfill(2);
        promise.reject("late".to_string());
        assert!(promise.is_resolved());
        exec.run();
        assert_eq!(future.state(), State::Fulfilled);
        assert_eq!(future.peek(), Some(Outcome::Value(1)));
        assert_eq!(*log.lock().unwrap(), vec![Outcome::Value(1)]);
    }

    #[test]
    fn test_reaction_never_synchronous_after_settlement() {
        let (exec, s) = queued();
        let future = Future::<u32, String>::resolve(&s, 3);
        assert_eq!(future.state(), State::Fulfilled);
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        future.and_then(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        exec.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        exec.run();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_then_without_handlers_passes_through() {
        let (exec, s) = queued();
        let ok = Future::<u32, String>::resolve(&s, 4)
            .then_with(OnFulfilled::pass_through(), OnRejected::pass_through());
        let err = Future::<u32, String>::reject(&s, "no".to_string())
            .then_with(OnFulfilled::pass_through(), OnRejected::pass_through());
        exec.run();
        assert_eq!(ok.peek(), Some(Outcome::Value(4)));
        assert_eq!(err.peek(), Some(Outcome::Error("no".to_string())));
    }

    #[test]
    fn test_missing_rejection_handler_keeps_rejection() {
        let (exec, s) = queued();
        let downstream = Future::<u32, String>::reject(&s, "bad".to_string())
            .and_then(|v| Ok(v + 1))
            .and_then(|v| Ok(v * 2));
        exec.run();
        assert_eq!(downstream.state(), State::Rejected);
        assert_eq!(downstream.peek(), Some(Outcome::Error("bad".to_string())));
    }

    #[test]
    fn test_reactions_run_in_attachment_order() {
        let (exec, s) = queued();
        let (future, promise) = Future::<u32, String>::pending(&s);
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = order.clone();
            future.and_then(move |_| {
                order.lock().unwrap().push(tag);
                Ok(())
            });
        }
        promise.fulfill(0);
        exec.run();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_handler_error_rejects_downstream() {
        let (exec, s) = queued();
        let downstream: Future<u32, String> =
            Future::resolve(&s, 1).and_then(|_| Err("thrown".to_string()));
        exec.run();
        assert_eq!(downstream.peek(), Some(Outcome::Error("thrown".to_string())));
    }

    #[test]
    fn test_handler_panic_rejects_downstream() {
        let (exec, s) = queued();
        let downstream: Future<u32, Error> =
            Future::resolve(&s, 1).and_then(|_| -> Result<u32, Error> { panic!("handler blew up") });
        exec.run();
        assert_eq!(
            downstream.peek(),
            Some(Outcome::Error(Error::Fault(Fault::Panicked(
                "handler blew up".to_string()
            ))))
        );
    }

    #[test]
    fn test_producer_panic_rejects() {
        let (exec, s) = queued();
        let future = Future::<u32, String>::new(&s, |_| panic!("producer blew up"));
        exec.run();
        assert_eq!(
            future.peek(),
            Some(Outcome::Error("callback panicked: producer blew up".to_string()))
        );
    }

    #[test]
    fn test_producer_panic_after_settling_is_ignored() {
        let (exec, s) = queued();
        let future = Future::<u32, String>::new(&s, |promise| {
            promise.fulfill(5);
            panic!("after the fact");
        });
        exec.run();
        assert_eq!(future.peek(), Some(Outcome::Value(5)));
    }

    #[test]
    fn test_catch_recovers_and_passes_values() {
        let (exec, s) = queued();
        let recovered = Future::<u32, String>::reject(&s, "x".to_string())
            .catch(|reason| Ok(reason.len() as u32));
        let untouched = Future::<u32, String>::resolve(&s, 9).catch(|_| Ok(0));
        exec.run();
        assert_eq!(recovered.peek(), Some(Outcome::Value(1)));
        assert_eq!(untouched.peek(), Some(Outcome::Value(9)));
    }

    #[test]
    fn test_then_picks_matching_handler() {
        let (exec, s) = queued();
        let from_err = Future::<u32, String>::reject(&s, "abc".to_string())
            .then(|v| Ok(format!("value {v}")), |e| Ok(format!("reason {e}")));
        let from_ok = Future::<u32, String>::resolve(&s, 2)
            .then(|v| Ok(format!("value {v}")), |e| Ok(format!("reason {e}")));
        exec.run();
        assert_eq!(from_err.peek(), Some(Outcome::Value("reason abc".to_string())));
        assert_eq!(from_ok.peek(), Some(Outcome::Value("value 2".to_string())));
    }

    #[test]
    fn test_chain_forwards_returned_future() {
        let (exec, s) = queued();
        let (inner, inner_promise) = Future::<u32, String>::pending(&s);
        let chained = Future::<u32, String>::resolve(&s, 1).chain(move |_| inner);
        let log = record(&chained);
        exec.run();
        assert!(log.lock().unwrap().is_empty());
        inner_promise.fulfill(42);
        exec.run();
        assert_eq!(*log.lock().unwrap(), vec![Outcome::Value(42)]);
        assert_eq!(chained.peek(), Some(Outcome::Value(42)));
    }

    #[test]
    fn test_chain_forwards_nested_rejection() {
        let (exec, s) = queued();
        let nested = s.clone();
        let chained = Future::<u32, String>::resolve(&s, 1)
            .chain(move |_| Future::<u32, String>::reject(&nested, "deep".to_string()));
        exec.run();
        assert_eq!(chained.peek(), Some(Outcome::Error("deep".to_string())));
    }

    #[test]
    fn test_lazy_forwarding_reports_fulfilled_early() {
        let (exec, s) = queued_with(Forwarding::Lazy);
        let (inner, inner_promise) = Future::<u32, String>::pending(&s);
        let (outer, outer_promise) = Future::<u32, String>::pending(&s);
        outer_promise.resolve(inner);
        assert_eq!(outer.state(), State::Fulfilled);
        assert_eq!(outer.peek(), None);
        let log = record(&outer);
        exec.run();
        assert!(log.lock().unwrap().is_empty());
        inner_promise.reject("inner".to_string());
        exec.run();
        assert_eq!(*log.lock().unwrap(), vec![Outcome::Error("inner".to_string())]);
        // The recorded state never changes, even though the outcome is a rejection.
        assert_eq!(outer.state(), State::Fulfilled);
        assert_eq!(outer.peek(), Some(Outcome::Error("inner".to_string())));
    }

    #[test]
    fn test_adopt_forwarding_waits_for_nested() {
        let (exec, s) = queued_with(Forwarding::Adopt);
        let (inner, inner_promise) = Future::<u32, String>::pending(&s);
        let (outer, outer_promise) = Future::<u32, String>::pending(&s);
        outer_promise.resolve(inner);
        assert_eq!(outer.state(), State::Pending);
        assert!(outer_promise.is_resolved());
        outer_promise.fulfill(1);
        let log = record(&outer);
        exec.run();
        assert_eq!(outer.state(), State::Pending);
        inner_promise.reject("inner".to_string());
        exec.run();
        assert_eq!(outer.state(), State::Rejected);
        assert_eq!(*log.lock().unwrap(), vec![Outcome::Error("inner".to_string())]);
    }

    #[test]
    fn test_nested_forwarding_to_depth() {
        for forwarding in [Forwarding::Lazy, Forwarding::Adopt] {
            let (exec, s) = queued_with(forwarding);
            let (innermost, promise) = Future::<u32, String>::pending(&s);
            let mut outer = innermost;
            for _ in 0..5 {
                outer = Future::<u32, String>::resolve_with(&s, outer);
            }
            let log = record(&outer);
            promise.fulfill(11);
            exec.run();
            assert_eq!(*log.lock().unwrap(), vec![Outcome::Value(11)]);
        }
    }

    #[test]
    fn test_resolving_with_itself_rejects() {
        for forwarding in [Forwarding::Lazy, Forwarding::Adopt] {
            let (exec, s) = queued_with(forwarding);
            let (future, promise) = Future::<u32, String>::pending(&s);
            promise.resolve(future.clone());
            exec.run();
            assert_eq!(future.state(), State::Rejected);
            assert_eq!(
                future.peek(),
                Some(Outcome::Error("future resolved with itself".to_string()))
            );
        }
    }

    #[test]
    fn test_finally_runs_and_passes_outcome() {
        let (exec, s) = queued();
        let calls = Arc::new(AtomicUsize::new(0));
        let (c1, c2) = (calls.clone(), calls.clone());
        let ok = Future::<u32, String>::resolve(&s, 1).finally(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let err = Future::<u32, String>::reject(&s, "e".to_string()).finally(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        });
        exec.run();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(ok.peek(), Some(Outcome::Value(1)));
        assert_eq!(err.peek(), Some(Outcome::Error("e".to_string())));
    }

    #[test]
    fn test_finally_panic_rejects() {
        let (exec, s) = queued();
        let future = Future::<u32, String>::resolve(&s, 1).finally(|| panic!("cleanup"));
        exec.run();
        assert_eq!(
            future.peek(),
            Some(Outcome::Error("callback panicked: cleanup".to_string()))
        );
    }

    #[test]
    fn test_racing_settlers_on_thread_pool() {
        let pool = Arc::new(ThreadPoolExecutor::new(4).unwrap());
        let s = Scheduler::new(pool.clone());
        let (future, promise) = Future::<usize, String>::pending(&s);
        let (tx, rx) = mpsc::channel();
        for _ in 0..8 {
            let tx = tx.clone();
            future.and_then(move |v| {
                tx.send(v).unwrap();
                Ok(())
            });
        }
        std::thread::scope(|scope| {
            for i in 0..8 {
                let promise = promise.clone();
                scope.spawn(move || promise.fulfill(i));
            }
        });
        let winner = match future.peek() {
            Some(Outcome::Value(v)) => v,
            other => panic!("expected fulfilled future, got {other:?}"),
        };
        for _ in 0..8 {
            assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), winner);
        }
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_long_chain_on_thread_pool() {
        let pool = Arc::new(ThreadPoolExecutor::new(2).unwrap());
        let s = Scheduler::new(pool.clone());
        let mut future = Future::<u64, String>::new(&s, |promise| promise.fulfill(0));
        for _ in 0..100 {
            future = future.and_then(|v| Ok(v + 1));
        }
        let (tx, rx) = mpsc::channel();
        future.and_then(move |v| {
            tx.send(v).unwrap();
            Ok(())
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 100);
    }

    /// Holds up the first `add` it sees, then queues everything in the
    /// order the `add` calls finished.
    struct SlowFirstAdd {
        queue: QueuedExecutor,
        adds: AtomicUsize,
        first: Mutex<mpsc::Sender<()>>,
    }

    impl Executor for SlowFirstAdd {
        fn add(&self, work: Work) {
            if self.adds.fetch_add(1, Ordering::SeqCst) == 0 {
                self.first.lock().unwrap().send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
            }
            self.queue.add(work);
        }
    }

    #[test]
    fn test_attach_during_settlement_keeps_order() {
        let (tx, rx) = mpsc::channel();
        let exec = Arc::new(SlowFirstAdd {
            queue: QueuedExecutor::new(),
            adds: AtomicUsize::new(0),
            first: Mutex::new(tx),
        });
        let s = Scheduler::new(exec.clone());
        let (future, promise) = Future::<u32, String>::pending(&s);
        let order = Arc::new(Mutex::new(Vec::new()));
        let push = |n: u32| {
            let order = order.clone();
            move |_: u32| {
                order.lock().unwrap().push(n);
                Ok(())
            }
        };
        future.and_then(push(1));
        future.and_then(push(2));
        thread::scope(|scope| {
            scope.spawn(|| promise.fulfill(7));
            // Settlement has started handing reactions to the executor.
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
            future.and_then(push(3));
        });
        assert_eq!(exec.queue.run(), 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_dropping_long_pending_chain() {
        let (exec, s) = queued();
        let (root, promise) = Future::<u32, String>::pending(&s);
        let mut tail = root.and_then(Ok);
        for _ in 0..100_000 {
            tail = tail.and_then(Ok);
        }
        drop(tail);
        drop(root);
        drop(promise);
        assert_eq!(exec.pending(), 0);
    }

    #[test]
    fn test_dropping_long_nested_chains() {
        let (exec, s) = queued_with(Forwarding::Lazy);
        let mut outer = Future::<u32, String>::resolve(&s, 0);
        for _ in 0..100_000 {
            outer = Future::resolve_with(&s, outer);
        }
        assert_eq!(outer.state(), State::Fulfilled);
        drop(outer);
        assert_eq!(exec.pending(), 0);

        let (exec, s) = queued_with(Forwarding::Adopt);
        let (root, promise) = Future::<u32, String>::pending(&s);
        let mut outer = root.clone();
        for _ in 0..100_000 {
            outer = Future::resolve_with(&s, outer);
        }
        assert_eq!(outer.state(), State::Pending);
        drop(outer);
        drop(root);
        drop(promise);
        assert_eq!(exec.pending(), 0);
    }

    static SETTLED_BY_CLONE: Mutex<Option<Promise<Loud, String>>> = Mutex::new(None);

    /// A value whose `clone` tries to settle a future.
    #[derive(Debug, PartialEq)]
    struct Loud(u32);

    impl Clone for Loud {
        fn clone(&self) -> Loud {
            if let Some(promise) = SETTLED_BY_CLONE.lock().unwrap().as_ref() {
                promise.reject("from clone".to_string());
            }
            Loud(self.0)
        }
    }

    #[test]
    fn test_value_clone_runs_outside_the_lock() {
        let (exec, s) = queued();
        let (future, promise) = Future::<Loud, String>::pending(&s);
        *SETTLED_BY_CLONE.lock().unwrap() = Some(promise.clone());
        let before = future.and_then(|loud| Ok(loud.0));
        promise.fulfill(Loud(4));
        let after = future.and_then(|loud| Ok(loud.0 + 1));
        exec.run();
        assert_eq!(future.peek(), Some(Outcome::Value(Loud(4))));
        assert_eq!(before.peek(), Some(Outcome::Value(4)));
        assert_eq!(after.peek(), Some(Outcome::Value(5)));
        SETTLED_BY_CLONE.lock().unwrap().take();
    }
}

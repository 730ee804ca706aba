use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::Forwarding;
use crate::error::Fault;
use crate::future::{Reason, Value};
use crate::microspinlock::MicroSpinLock;
use crate::outcome::{Outcome, Resolution, State};
use crate::scheduler::{FutureId, Scheduler};
use crate::scopeguard::ScopeGuard;

/// A continuation attached to a core. Exactly one of the two methods is
/// called, exactly once, always from a scheduled task.
pub(crate) trait React<T, E>: Send {
    fn fulfilled(self: Box<Self>, value: T);
    fn rejected(self: Box<Self>, reason: E);

    /// Called instead of either of the above when the reaction is dropped
    /// unrun. Moves any core it solely owns onto `pile` rather than
    /// dropping it in place.
    fn release(self: Box<Self>, pile: &mut Pile) {
        let _ = pile;
    }
}

/// A core taken out of its last `Arc`, waiting to release what it links to.
pub(crate) trait Release {
    fn release(self: Box<Self>, pile: &mut Pile);
}

pub(crate) type Pile = Vec<Box<dyn Release>>;

pub(crate) type Reaction<T, E> = Box<dyn React<T, E>>;

/// What a core stores once settled. A fulfillment may be a nested future
/// when forwarding lazily.
pub(crate) type Settled<T, E> = Outcome<Resolution<T, E>, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum Phase {
    Pending = 0,
    /// Resolved with a nested future that has not settled yet. Further
    /// settlement attempts are ignored.
    Adopting = 1,
    Fulfilled = 2,
    Rejected = 3,
}

impl Phase {
    fn from_u8(raw: u8) -> Phase {
        match raw {
            0 => Phase::Pending,
            1 => Phase::Adopting,
            2 => Phase::Fulfilled,
            _ => Phase::Rejected,
        }
    }

    fn is_settled(self) -> bool {
        matches!(self, Phase::Fulfilled | Phase::Rejected)
    }

    pub(crate) fn state(self) -> State {
        match self {
            Phase::Pending | Phase::Adopting => State::Pending,
            Phase::Fulfilled => State::Fulfilled,
            Phase::Rejected => State::Rejected,
        }
    }
}

/// A helper struct for writing Finite State Machines. The lock also
/// protects whatever data the actions passed in touch.
pub(crate) struct Fsm {
    lock: MicroSpinLock,
    state: AtomicU8,
}

impl Fsm {
    pub(crate) fn new(start: Phase) -> Fsm {
        Fsm {
            lock: MicroSpinLock::new(),
            state: AtomicU8::new(start as u8),
        }
    }

    fn locked<R>(&self, action: impl FnOnce() -> R) -> R {
        if !self.lock.try_lock() {
            self.lock.lock();
        }
        let _unlock = ScopeGuard::new(|| self.lock.unlock());
        action()
    }

    /// Atomically do a state transition with accompanying action.
    /// The action runs under the lock before the new state is published.
    /// Returns true on success, false and action unexecuted otherwise.
    pub(crate) fn update_state<F>(&self, old_state: Phase, new_state: Phase, action: F) -> bool
    where
        F: FnOnce(),
    {
        self.locked(|| {
            if self.get_state() != old_state {
                return false;
            }
            action();
            self.state.store(new_state as u8, Ordering::Release);
            true
        })
    }

    /// Runs `action` under the lock with the current state, without a
    /// transition.
    pub(crate) fn with_state<R>(&self, action: impl FnOnce(Phase) -> R) -> R {
        self.locked(|| action(self.get_state()))
    }

    pub(crate) fn get_state(&self) -> Phase {
        Phase::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// The shared state behind a `Future` and its `Promise`s.
pub(crate) struct Core<T, E> {
    id: FutureId,
    scheduler: Scheduler,
    fsm: Fsm,
    /// Written once, under the lock, on the transition to a settled phase.
    outcome: UnsafeCell<Option<Arc<Settled<T, E>>>>,
    /// Only touched under the lock while not settled.
    reactions: UnsafeCell<VecDeque<Reaction<T, E>>>,
}

// outcome and reactions are only accessed while holding the fsm lock. The
// outcome is shared by reference between dispatched tasks.
unsafe impl<T: Send + Sync, E: Send + Sync> Sync for Core<T, E> {}

impl<T, E> Core<T, E> {
    pub(crate) fn id(&self) -> FutureId {
        self.id
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub(crate) fn phase(&self) -> Phase {
        self.fsm.get_state()
    }

    /// Empties this core, then every core reachable only through its lazily
    /// nested outcome. Reactions hand their downstream cores to `pile`.
    fn unlink(&mut self, pile: &mut Pile) {
        let mut next = self.take_links(pile);
        while let Some(mut core) = next.and_then(Arc::into_inner) {
            next = core.take_links(pile);
        }
    }

    fn take_links(&mut self, pile: &mut Pile) -> Option<Arc<Core<T, E>>> {
        for reaction in mem::take(self.reactions.get_mut()) {
            reaction.release(pile);
        }
        match self.outcome.get_mut().take().and_then(Arc::into_inner) {
            Some(Outcome::Value(Resolution::Future(inner))) => Some(inner.core),
            _ => None,
        }
    }
}

impl<T, E> Drop for Core<T, E> {
    fn drop(&mut self) {
        let mut pile = Pile::new();
        self.unlink(&mut pile);
        while let Some(core) = pile.pop() {
            core.release(&mut pile);
        }
    }
}

impl<T: Value, E: Reason> Release for Core<T, E> {
    fn release(mut self: Box<Self>, pile: &mut Pile) {
        self.unlink(pile);
    }
}

impl<T: Value, E: Reason> Core<T, E> {
    pub(crate) fn new(scheduler: Scheduler) -> Arc<Core<T, E>> {
        Arc::new(Core {
            id: scheduler.next_id(),
            scheduler,
            fsm: Fsm::new(Phase::Pending),
            outcome: UnsafeCell::new(None),
            reactions: UnsafeCell::new(VecDeque::new()),
        })
    }

    /// A copy of the stored outcome, if settled. The copy is made after the
    /// lock is released.
    pub(crate) fn settled(&self) -> Option<Settled<T, E>> {
        self.stored().map(|settled| (*settled).clone())
    }

    fn stored(&self) -> Option<Arc<Settled<T, E>>> {
        self.fsm.with_state(|phase| {
            if phase.is_settled() {
                unsafe { (*self.outcome.get()).clone() }
            } else {
                None
            }
        })
    }

    /// First-settle-wins entry point for every settlement function.
    /// Returns whether this call decided the future.
    pub(crate) fn settle(self: &Arc<Self>, settled: Settled<T, E>) -> bool {
        let inner = match settled {
            Outcome::Value(Resolution::Future(inner)) => inner,
            settled => return self.complete(Phase::Pending, settled),
        };
        if Arc::ptr_eq(&inner.core, self) {
            return self.complete(Phase::Pending, Outcome::Error(E::from(Fault::Cycle)));
        }
        match self.scheduler.config().forwarding {
            Forwarding::Lazy => {
                self.complete(Phase::Pending, Outcome::Value(Resolution::Future(inner)))
            }
            Forwarding::Adopt => {
                if !self.fsm.update_state(Phase::Pending, Phase::Adopting, || {}) {
                    self.ignored();
                    return false;
                }
                tracing::debug!(future = %self.id, nested = %inner.core.id, "adopting nested future");
                inner.core.attach(Box::new(Adopt {
                    target: self.clone(),
                }));
                true
            }
        }
    }

    /// Records the outcome, dispatches every queued reaction in attachment
    /// order, then publishes the settled phase. All of it happens under the
    /// lock, so a reaction attached afterwards is dispatched behind them.
    fn complete(&self, from: Phase, settled: Settled<T, E>) -> bool {
        let to = match settled {
            Outcome::Value(_) => Phase::Fulfilled,
            Outcome::Error(_) => Phase::Rejected,
        };
        let settled = Arc::new(settled);
        let mut dispatched = 0;
        let won = self.fsm.update_state(from, to, || {
            let reactions = unsafe {
                *self.outcome.get() = Some(settled.clone());
                mem::take(&mut *self.reactions.get())
            };
            dispatched = reactions.len();
            for reaction in reactions {
                self.dispatch(settled.clone(), reaction);
            }
        });
        if !won {
            self.ignored();
            return false;
        }
        tracing::debug!(future = %self.id, state = ?to, reactions = dispatched, "future settled");
        if to == Phase::Rejected && dispatched == 0 {
            tracing::debug!(future = %self.id, "rejected with no reactions attached");
        }
        true
    }

    fn ignored(&self) {
        tracing::debug!(future = %self.id, phase = ?self.phase(), "ignoring settlement of resolved future");
    }

    /// Queues `reaction` while unsettled, otherwise dispatches it at once.
    /// Either way the reaction never runs inside this call.
    pub(crate) fn attach(&self, reaction: Reaction<T, E>) {
        self.fsm.with_state(|phase| {
            let settled = if phase.is_settled() {
                unsafe { (*self.outcome.get()).clone() }
            } else {
                None
            };
            match settled {
                Some(settled) => self.dispatch(settled, reaction),
                None => {
                    unsafe { (*self.reactions.get()).push_back(reaction) };
                    tracing::trace!(future = %self.id, "reaction queued");
                }
            }
        });
    }

    /// Hands `reaction` to the scheduler. Called under the lock; the value
    /// or reason is cloned later, by the task.
    fn dispatch(&self, settled: Arc<Settled<T, E>>, reaction: Reaction<T, E>) {
        let what = match *settled {
            Outcome::Value(Resolution::Future(_)) => "forward",
            Outcome::Value(Resolution::Value(_)) => "fulfilled",
            Outcome::Error(_) => "rejected",
        };
        self.scheduler.schedule(self.id, what, move || match &*settled {
            Outcome::Value(Resolution::Future(inner)) => inner.core.attach(reaction),
            Outcome::Value(Resolution::Value(value)) => reaction.fulfilled(value.clone()),
            Outcome::Error(reason) => reaction.rejected(reason.clone()),
        });
    }
}

/// Settles an adopting core with the outcome of the future it adopted.
struct Adopt<T, E> {
    target: Arc<Core<T, E>>,
}

impl<T: Value, E: Reason> React<T, E> for Adopt<T, E> {
    fn fulfilled(self: Box<Self>, value: T) {
        self.target
            .complete(Phase::Adopting, Outcome::Value(Resolution::Value(value)));
    }

    fn rejected(self: Box<Self>, reason: E) {
        self.target.complete(Phase::Adopting, Outcome::Error(reason));
    }

    fn release(self: Box<Self>, pile: &mut Pile) {
        if let Some(target) = Arc::into_inner(self.target) {
            pile.push(Box::new(target));
        }
    }
}

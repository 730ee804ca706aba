//! Handlers attached by `then` and the reactions that feed their results
//! into a downstream future.

use std::convert;

use crate::detail::core::{Pile, React};
use crate::error::guard;
use crate::future::{Future, Reason, Value};
use crate::outcome::Resolution;
use crate::promise::Promise;

type Handler<A, U, E> = Box<dyn FnOnce(A) -> Result<Resolution<U, E>, E> + Send>;

/// What to do with a fulfillment value: call a handler, or pass the value
/// through unchanged.
pub enum OnFulfilled<T, U, E> {
    Handler(Handler<T, U, E>),
    PassThrough(fn(T) -> U),
}

impl<T: 'static, U: 'static, E: 'static> OnFulfilled<T, U, E> {
    /// A handler producing the downstream value, or `Err` to reject it.
    pub fn value<F>(func: F) -> OnFulfilled<T, U, E>
    where
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        OnFulfilled::Handler(Box::new(move |value| func(value).map(Resolution::Value)))
    }

    /// A handler producing a future the downstream forwards to.
    pub fn future<F>(func: F) -> OnFulfilled<T, U, E>
    where
        F: FnOnce(T) -> Future<U, E> + Send + 'static,
    {
        OnFulfilled::Handler(Box::new(move |value| Ok(Resolution::Future(func(value)))))
    }

    pub fn resolution<F>(func: F) -> OnFulfilled<T, U, E>
    where
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        OnFulfilled::Handler(Box::new(func))
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, OnFulfilled::PassThrough(_))
    }
}

impl<T, E> OnFulfilled<T, T, E> {
    pub fn pass_through() -> OnFulfilled<T, T, E> {
        OnFulfilled::PassThrough(convert::identity)
    }
}

/// What to do with a rejection reason: call a handler, or reject the
/// downstream with the same reason.
pub enum OnRejected<U, E> {
    Handler(Handler<E, U, E>),
    PassThrough,
}

impl<U: 'static, E: 'static> OnRejected<U, E> {
    /// A handler recovering with a downstream value, or `Err` to reject it.
    pub fn value<F>(func: F) -> OnRejected<U, E>
    where
        F: FnOnce(E) -> Result<U, E> + Send + 'static,
    {
        OnRejected::Handler(Box::new(move |reason| func(reason).map(Resolution::Value)))
    }

    pub fn future<F>(func: F) -> OnRejected<U, E>
    where
        F: FnOnce(E) -> Future<U, E> + Send + 'static,
    {
        OnRejected::Handler(Box::new(move |reason| Ok(Resolution::Future(func(reason)))))
    }

    pub fn resolution<F>(func: F) -> OnRejected<U, E>
    where
        F: FnOnce(E) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        OnRejected::Handler(Box::new(func))
    }

    pub fn pass_through() -> OnRejected<U, E> {
        OnRejected::PassThrough
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, OnRejected::PassThrough)
    }
}

/// Calls `handler` behind the panic boundary and settles `downstream` with
/// whatever it produced.
fn invoke<A, U: Value, E: Reason>(handler: Handler<A, U, E>, arg: A, downstream: Promise<U, E>) {
    match guard(move || handler(arg)) {
        Ok(Ok(resolution)) => downstream.resolve(resolution),
        Ok(Err(reason)) => downstream.reject(reason),
        Err(fault) => downstream.reject(E::from(fault)),
    }
}

/// The reaction built by `then`.
pub(crate) struct Then<T, U, E> {
    pub(crate) on_fulfilled: OnFulfilled<T, U, E>,
    pub(crate) on_rejected: OnRejected<U, E>,
    pub(crate) downstream: Promise<U, E>,
}

impl<T: Value, U: Value, E: Reason> React<T, E> for Then<T, U, E> {
    fn fulfilled(self: Box<Self>, value: T) {
        let Then {
            on_fulfilled,
            downstream,
            ..
        } = *self;
        match on_fulfilled {
            OnFulfilled::Handler(handler) => invoke(handler, value, downstream),
            OnFulfilled::PassThrough(convert) => downstream.fulfill(convert(value)),
        }
    }

    fn rejected(self: Box<Self>, reason: E) {
        let Then {
            on_rejected,
            downstream,
            ..
        } = *self;
        match on_rejected {
            OnRejected::Handler(handler) => invoke(handler, reason, downstream),
            OnRejected::PassThrough => downstream.reject(reason),
        }
    }

    fn release(self: Box<Self>, pile: &mut Pile) {
        let Then { downstream, .. } = *self;
        downstream.release(pile);
    }
}

/// The reaction built by `finally`: runs a callback on either outcome and
/// passes the outcome on unless the callback panics.
pub(crate) struct Finally<T, E, F> {
    pub(crate) callback: F,
    pub(crate) downstream: Promise<T, E>,
}

impl<T, E, F> React<T, E> for Finally<T, E, F>
where
    T: Value,
    E: Reason,
    F: FnOnce() + Send + 'static,
{
    fn fulfilled(self: Box<Self>, value: T) {
        let Finally { callback, downstream } = *self;
        match guard(callback) {
            Ok(()) => downstream.fulfill(value),
            Err(fault) => downstream.reject(E::from(fault)),
        }
    }

    fn rejected(self: Box<Self>, reason: E) {
        let Finally { callback, downstream } = *self;
        match guard(callback) {
            Ok(()) => downstream.reject(reason),
            Err(fault) => downstream.reject(E::from(fault)),
        }
    }

    fn release(self: Box<Self>, pile: &mut Pile) {
        self.downstream.release(pile);
    }
}

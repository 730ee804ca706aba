//! Constructors that settle a new future from plain values or from the
//! outcomes of other futures.

use std::sync::{Arc, Mutex, PoisonError};

use crate::future::{Future, Reason, Value};
use crate::outcome::{Outcome, Resolution};
use crate::reaction::{OnFulfilled, OnRejected};
use crate::scheduler::Scheduler;

/// Results gathered by `all` and `all_settled`, indexed by input position.
struct Gather<V> {
    slots: Vec<Option<V>>,
    remaining: usize,
}

impl<V> Gather<V> {
    fn new(len: usize) -> Arc<Mutex<Gather<V>>> {
        let slots = (0..len).map(|_| None).collect();
        Arc::new(Mutex::new(Gather {
            slots,
            remaining: len,
        }))
    }

    /// Stores the result for `idx`. Returns every result, in input order,
    /// once the last one arrives.
    fn fill(gather: &Mutex<Gather<V>>, idx: usize, value: V) -> Option<Vec<V>> {
        let mut gather = gather.lock().unwrap_or_else(PoisonError::into_inner);
        if gather.slots[idx].replace(value).is_none() {
            gather.remaining -= 1;
        }
        if gather.remaining > 0 {
            return None;
        }
        Some(gather.slots.iter_mut().filter_map(Option::take).collect())
    }
}

impl<T: Value, E: Reason> Future<T, E> {
    /// A future fulfilled with `value`.
    pub fn resolve(scheduler: &Scheduler, value: T) -> Future<T, E> {
        Future::resolve_with(scheduler, Resolution::Value(value))
    }

    /// A future fulfilled with a value, or forwarding to a nested future's
    /// eventual outcome.
    pub fn resolve_with(scheduler: &Scheduler, resolution: impl Into<Resolution<T, E>>) -> Future<T, E> {
        let (future, promise) = Future::pending(scheduler);
        promise.resolve(resolution);
        future
    }

    /// A future rejected with `reason`.
    pub fn reject(scheduler: &Scheduler, reason: E) -> Future<T, E> {
        let (future, promise) = Future::pending(scheduler);
        promise.reject(reason);
        future
    }

    /// Fulfills with every input's value, in input order, once all have
    /// fulfilled. Rejects with the first rejection; whatever the other
    /// inputs do afterwards is ignored.
    ///
    /// Each input goes through [`resolve_with`](Future::resolve_with), so it
    /// may be a future or a [`Resolution`]. Plain values can be passed as
    /// `values.into_iter().map(Resolution::Value)`.
    pub fn all<I, R>(scheduler: &Scheduler, inputs: I) -> Future<Vec<T>, E>
    where
        I: IntoIterator<Item = R>,
        R: Into<Resolution<T, E>>,
    {
        let inputs = coerce(scheduler, inputs);
        let (all, promise) = Future::pending(scheduler);
        if inputs.is_empty() {
            promise.fulfill(Vec::new());
            return all;
        }
        tracing::trace!(future = %all.id(), inputs = inputs.len(), "gathering all");
        let gather = Gather::new(inputs.len());
        for (idx, input) in inputs.into_iter().enumerate() {
            let (gather, fulfilled, rejected) = (gather.clone(), promise.clone(), promise.clone());
            input.then_with(
                OnFulfilled::value(move |value| {
                    if let Some(values) = Gather::fill(&gather, idx, value) {
                        fulfilled.fulfill(values);
                    }
                    Ok(())
                }),
                OnRejected::value(move |reason| {
                    rejected.reject(reason);
                    Ok(())
                }),
            );
        }
        all
    }

    /// Settles the way the first input to settle does. Inputs are taken as
    /// in [`all`](Future::all).
    ///
    /// An empty input never settles.
    pub fn race<I, R>(scheduler: &Scheduler, inputs: I) -> Future<T, E>
    where
        I: IntoIterator<Item = R>,
        R: Into<Resolution<T, E>>,
    {
        let inputs = coerce(scheduler, inputs);
        let (race, promise) = Future::pending(scheduler);
        tracing::trace!(future = %race.id(), inputs = inputs.len(), "racing");
        for input in inputs {
            let (fulfilled, rejected) = (promise.clone(), promise.clone());
            input.then_with(
                OnFulfilled::value(move |value| {
                    fulfilled.fulfill(value);
                    Ok(())
                }),
                OnRejected::value(move |reason| {
                    rejected.reject(reason);
                    Ok(())
                }),
            );
        }
        race
    }

    /// Fulfills with every input's outcome, in input order, once all have
    /// settled. Never rejects. Inputs are taken as in [`all`](Future::all).
    pub fn all_settled<I, R>(scheduler: &Scheduler, inputs: I) -> Future<Vec<Outcome<T, E>>, E>
    where
        I: IntoIterator<Item = R>,
        R: Into<Resolution<T, E>>,
    {
        let inputs = coerce(scheduler, inputs);
        let (all, promise) = Future::pending(scheduler);
        if inputs.is_empty() {
            promise.fulfill(Vec::new());
            return all;
        }
        let gather = Gather::new(inputs.len());
        for (idx, input) in inputs.into_iter().enumerate() {
            let (on_value, on_error) = (gather.clone(), gather.clone());
            let (fulfilled, also_fulfilled) = (promise.clone(), promise.clone());
            input.then_with(
                OnFulfilled::value(move |value| {
                    if let Some(outcomes) = Gather::fill(&on_value, idx, Outcome::Value(value)) {
                        fulfilled.fulfill(outcomes);
                    }
                    Ok(())
                }),
                OnRejected::value(move |reason| {
                    if let Some(outcomes) = Gather::fill(&on_error, idx, Outcome::Error(reason)) {
                        also_fulfilled.fulfill(outcomes);
                    }
                    Ok(())
                }),
            );
        }
        all
    }
}

/// Passes every input through `resolve_with`.
fn coerce<T, E, I, R>(scheduler: &Scheduler, inputs: I) -> Vec<Future<T, E>>
where
    T: Value,
    E: Reason,
    I: IntoIterator<Item = R>,
    R: Into<Resolution<T, E>>,
{
    inputs
        .into_iter()
        .map(|input| Future::<T, E>::resolve_with(scheduler, input))
        .collect()
}

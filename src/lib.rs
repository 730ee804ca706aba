//! Settle-once futures whose continuations run through an injected
//! scheduler.
//!
//! A [`Future`] starts pending and settles exactly once, through its
//! [`Promise`], to a value or a reason. Every continuation attached with
//! [`Future::then`] and friends yields a new future and is dispatched as a
//! task on the [`Executor`] behind the future's [`Scheduler`], in attachment
//! order and never inline.
//!
//! ```
//! use std::sync::Arc;
//!
//! use deferred::{Future, Outcome, QueuedExecutor, Scheduler};
//!
//! let exec = Arc::new(QueuedExecutor::new());
//! let scheduler = Scheduler::new(exec.clone());
//!
//! let doubled = Future::<u32, String>::new(&scheduler, |promise| promise.fulfill(21))
//!     .and_then(|value| Ok(value * 2));
//!
//! exec.run();
//! assert_eq!(doubled.peek(), Some(Outcome::Value(42)));
//! ```

mod combinators;
pub mod config;
mod detail;
pub mod error;
pub mod executor;
pub mod future;
pub mod microspinlock;
pub mod outcome;
pub mod promise;
pub mod reaction;
pub mod scheduler;
mod scopeguard;

pub use config::{Config, Forwarding};
pub use error::{Error, Fault};
pub use executor::{Executor, QueuedExecutor, ThreadPoolExecutor, Work};
pub use future::{Future, Reason, Value};
pub use outcome::{Outcome, Resolution, State};
pub use promise::Promise;
pub use reaction::{OnFulfilled, OnRejected};
pub use scheduler::{FutureId, Scheduler};

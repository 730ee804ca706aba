//! Failures the core converts into rejections.
//!
//! Reason types carried by a [`Future`](crate::Future) must implement
//! `From<Fault>`: when a producer or handler panics, or a future is resolved
//! with itself, the core needs a reason of the caller's type to reject with.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// A failure raised by the core rather than by user code returning `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// A producer or handler panicked. Carries the panic message when the
    /// payload was a string.
    #[error("callback panicked: {0}")]
    Panicked(String),
    /// A future was resolved with itself.
    #[error("future resolved with itself")]
    Cycle,
}

impl Fault {
    fn from_panic(payload: Box<dyn Any + Send>) -> Fault {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_string(),
                Err(_) => "non-string panic payload".to_string(),
            },
        };
        Fault::Panicked(message)
    }
}

impl From<Fault> for String {
    fn from(fault: Fault) -> String {
        fault.to_string()
    }
}

/// A general purpose rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl Error {
    pub fn rejected(reason: impl Into<String>) -> Error {
        Error::Rejected(reason.into())
    }
}

/// Runs `func`, converting a panic into [`Fault::Panicked`].
pub(crate) fn guard<R>(func: impl FnOnce() -> R) -> Result<R, Fault> {
    panic::catch_unwind(AssertUnwindSafe(func)).map_err(|payload| {
        let fault = Fault::from_panic(payload);
        tracing::warn!(%fault, "caught panic at settlement boundary");
        fault
    })
}

use crate::future::Future;

/// The externally visible settlement state of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

impl State {
    pub fn is_settled(self) -> bool {
        self != State::Pending
    }
}

/// The result a future settled with: a value or a reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Value(T),
    Error(E),
}

impl<T, E> Outcome<T, E> {
    pub fn has_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }

    pub fn has_error(&self) -> bool {
        matches!(self, Outcome::Error(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Value(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Error(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Value(value) => Ok(value),
            Outcome::Error(reason) => Err(reason),
        }
    }

    pub fn state(&self) -> State {
        match self {
            Outcome::Value(_) => State::Fulfilled,
            Outcome::Error(_) => State::Rejected,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Outcome<T, E> {
        match result {
            Ok(value) => Outcome::Value(value),
            Err(reason) => Outcome::Error(reason),
        }
    }
}

/// What a future is fulfilled with: a plain value, or another future whose
/// outcome is forwarded.
#[derive(Debug, Clone)]
pub enum Resolution<T, E> {
    Value(T),
    Future(Future<T, E>),
}

impl<T, E> From<Future<T, E>> for Resolution<T, E> {
    fn from(future: Future<T, E>) -> Resolution<T, E> {
        Resolution::Future(future)
    }
}

use serde::Deserialize;

/// How a future fulfilled with another future behaves before the inner one
/// settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Forwarding {
    /// The outer future is marked `Fulfilled` at once and stores the inner
    /// future as its outcome. Reactions are forwarded to the inner future when
    /// they are dispatched, so `then` observes the inner outcome while `state`
    /// reports `Fulfilled` early.
    #[default]
    Lazy,
    /// The outer future stays `Pending` until the inner future settles and
    /// then takes on its outcome.
    Adopt,
}

/// Settings shared by every future created through one
/// [`Scheduler`](crate::Scheduler).
///
/// Deserializable so hosts can embed it in their own configuration files:
///
/// ```toml
/// forwarding = "adopt"
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub forwarding: Forwarding,
}

impl Config {
    pub fn with_forwarding(mut self, forwarding: Forwarding) -> Config {
        self.forwarding = forwarding;
        self
    }
}

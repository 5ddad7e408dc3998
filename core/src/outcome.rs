//! Results of chain execution and routing.

use crate::{NetworkError, Response};

/// The final result of executing a source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A response to serve.
    Response(Response),
    /// The chain ended in a network failure; surface it as a failed fetch.
    NetworkError(NetworkError),
    /// The chain produced nothing usable.
    NoResult,
}

impl Outcome {
    /// The response, if any.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Response(r) => Some(r),
            Self::NetworkError(_) | Self::NoResult => None,
        }
    }

    /// Returns `true` for [`Outcome::Response`].
    #[must_use]
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response(_))
    }
}

/// The router's top-level result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// A rule matched; its chain produced this outcome.
    Matched(Outcome),
    /// No rule matched.
    Unmatched,
}

impl RouteDecision {
    /// The outcome, if a rule matched.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            Self::Matched(o) => Some(o),
            Self::Unmatched => None,
        }
    }

    /// The response, if a rule matched and its chain produced one.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.outcome().and_then(Outcome::response)
    }

    /// Returns `true` if the caller should defer to the programmable handler.
    ///
    /// A matched network error is a failed fetch, not a fallback.
    #[must_use]
    pub fn should_fall_back(&self) -> bool {
        matches!(self, Self::Unmatched | Self::Matched(Outcome::NoResult))
    }
}

//! Source steps and chains: where a matched rule's response comes from.
//!
//! A [`SourceChain`] is an ordered, non-empty list of [`SourceStep`]s. Each
//! step names a source ([`SourceKind`]) and a [`Behavior`] deciding what its
//! result does to the rest of the chain.

use crate::{RequestSnapshot, ValidationError, MAX_CHAIN_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a step's result does to the rest of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Behavior {
    /// Success ends the chain with this step's response; anything else
    /// falls through to the next step.
    #[default]
    FinishWithSuccess,
    /// Success serves this step's response at once while the remaining
    /// steps run in the background for their side effects. Anything else
    /// records the response (if any) as the fallback and falls through.
    ContinueDiscardingLatter,
}

/// Bare source type, usable as shorthand for a one-step chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// Fetch from the network.
    Network,
    /// Look up the default cache.
    Cache,
    /// Invoke the programmable handler.
    FetchEvent,
    /// Race the network against the programmable handler.
    RaceNetworkAndFetchHandler,
    /// Race the network against the default cache.
    RaceNetworkAndCache,
}

impl SourceType {
    /// Every source type, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Network,
        Self::Cache,
        Self::FetchEvent,
        Self::RaceNetworkAndFetchHandler,
        Self::RaceNetworkAndCache,
    ];

    /// The serialized name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::FetchEvent => "fetch-event",
            Self::RaceNetworkAndFetchHandler => "race-network-and-fetch-handler",
            Self::RaceNetworkAndCache => "race-network-and-cache",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown source type \"{s}\""))
    }
}

/// The response-producing operation of a step.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// Fetch from the network, optionally writing the response to a cache.
    Network {
        /// Cache to write the fetched response into.
        update_cache_name: Option<String>,
        /// Whether non-OK responses are written too. `None` defers to
        /// [`RouterConfig::cache_error_responses`](crate::RouterConfig::cache_error_responses).
        cache_error_response: Option<bool>,
    },
    /// Look up a named cache.
    Cache {
        /// Cache to look in. `None` uses the router's default cache.
        cache_name: Option<String>,
        /// Request to look up instead of the routed one.
        request_override: Option<RequestSnapshot>,
    },
    /// Invoke the programmable handler.
    FetchHandler {
        /// Tag passed to the handler so it can tell router invocations apart.
        callback_id: Option<String>,
    },
    /// Race the network against the programmable handler.
    RaceNetworkAndHandler,
    /// Race the network against a cache lookup.
    RaceNetworkAndCache {
        /// Cache to look in. `None` uses the router's default cache.
        cache_name: Option<String>,
    },
}

impl SourceKind {
    /// Short name used in logs and traces.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Cache { .. } => "cache",
            Self::FetchHandler { .. } => "fetch-event",
            Self::RaceNetworkAndHandler => "race-network-and-fetch-handler",
            Self::RaceNetworkAndCache { .. } => "race-network-and-cache",
        }
    }
}

impl From<SourceType> for SourceKind {
    fn from(source: SourceType) -> Self {
        match source {
            SourceType::Network => Self::Network {
                update_cache_name: None,
                cache_error_response: None,
            },
            SourceType::Cache => Self::Cache {
                cache_name: None,
                request_override: None,
            },
            SourceType::FetchEvent => Self::FetchHandler { callback_id: None },
            SourceType::RaceNetworkAndFetchHandler => Self::RaceNetworkAndHandler,
            SourceType::RaceNetworkAndCache => Self::RaceNetworkAndCache { cache_name: None },
        }
    }
}

/// One step of a source chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceStep {
    /// The operation.
    pub kind: SourceKind,
    /// What the result does to the rest of the chain.
    pub behavior: Behavior,
}

impl SourceStep {
    /// A step with the default behavior.
    #[must_use]
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            behavior: Behavior::default(),
        }
    }

    /// Plain network fetch.
    #[must_use]
    pub fn network() -> Self {
        SourceType::Network.into()
    }

    /// Network fetch that writes its response into `cache_name`.
    #[must_use]
    pub fn network_updating(cache_name: impl Into<String>) -> Self {
        Self::new(SourceKind::Network {
            update_cache_name: Some(cache_name.into()),
            cache_error_response: None,
        })
    }

    /// Lookup in a named cache.
    #[must_use]
    pub fn cache(cache_name: impl Into<String>) -> Self {
        Self::new(SourceKind::Cache {
            cache_name: Some(cache_name.into()),
            request_override: None,
        })
    }

    /// Programmable handler invocation.
    #[must_use]
    pub fn fetch_handler() -> Self {
        SourceType::FetchEvent.into()
    }

    /// Set the behavior (builder pattern).
    #[must_use]
    pub fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyCacheName`] if a cache name is given
    /// but empty.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let named = match &self.kind {
            SourceKind::Network {
                update_cache_name, ..
            } => update_cache_name.as_deref(),
            SourceKind::Cache { cache_name, .. } | SourceKind::RaceNetworkAndCache { cache_name } => {
                cache_name.as_deref()
            }
            SourceKind::FetchHandler { .. } | SourceKind::RaceNetworkAndHandler => None,
        };
        match named {
            Some(name) if name.trim().is_empty() => Err(ValidationError::EmptyCacheName {
                source_type: self.kind.label(),
            }),
            _ => Ok(()),
        }
    }
}

impl From<SourceType> for SourceStep {
    fn from(source: SourceType) -> Self {
        Self::new(source.into())
    }
}

impl fmt::Display for SourceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SourceKind::Network {
                update_cache_name: Some(cache),
                ..
            } => write!(f, "network(update={cache})")?,
            SourceKind::Cache {
                cache_name: Some(cache),
                ..
            }
            | SourceKind::RaceNetworkAndCache {
                cache_name: Some(cache),
            } => write!(f, "{}({cache})", self.kind.label())?,
            SourceKind::FetchHandler {
                callback_id: Some(id),
            } => write!(f, "fetch-event({id})")?,
            kind => f.write_str(kind.label())?,
        }
        if self.behavior == Behavior::ContinueDiscardingLatter {
            f.write_str("+continue")?;
        }
        Ok(())
    }
}

/// An ordered list of source steps.
///
/// Emptiness and length are checked by [`validate`](Self::validate) at
/// admission rather than at construction, so a whole batch can be reported
/// against the rule that carries it.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceChain {
    steps: Vec<SourceStep>,
}

impl SourceChain {
    /// Create a chain from steps.
    #[must_use]
    pub fn new(steps: Vec<SourceStep>) -> Self {
        Self { steps }
    }

    /// The steps, in order.
    #[must_use]
    pub fn steps(&self) -> &[SourceStep] {
        &self.steps
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` if the chain has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validate the chain.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::EmptySourceChain`] for an empty chain
    /// - [`ValidationError::ChainTooLong`] above [`MAX_CHAIN_LENGTH`]
    /// - any error from [`SourceStep::validate`]
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steps.is_empty() {
            return Err(ValidationError::EmptySourceChain);
        }
        if self.steps.len() > MAX_CHAIN_LENGTH {
            return Err(ValidationError::ChainTooLong {
                len: self.steps.len(),
                max: MAX_CHAIN_LENGTH,
            });
        }
        self.steps.iter().try_for_each(SourceStep::validate)
    }
}

impl From<SourceType> for SourceChain {
    fn from(source: SourceType) -> Self {
        Self::new(vec![source.into()])
    }
}

impl From<SourceStep> for SourceChain {
    fn from(step: SourceStep) -> Self {
        Self::new(vec![step])
    }
}

impl FromIterator<SourceStep> for SourceChain {
    fn from_iter<I: IntoIterator<Item = SourceStep>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for SourceChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{step}")?;
        }
        f.write_str("]")
    }
}

//! Serialized rule definitions.
//!
//! These types mirror the runtime types but are serde-deserializable, so rule
//! sets can be shipped as JSON or YAML and compiled into [`Rule`]s.
//!
//! | Config type | Runtime type | Compiler |
//! |-------------|-------------|----------|
//! | [`RuleDocument`] | `Vec<Rule>` | [`RuleDocument::compile`] |
//! | [`RuleConfig`] | [`Rule`] | [`RuleConfig::compile`] |
//! | [`ConditionConfig`] | [`Condition`] | [`ConditionConfig::compile`] |
//! | [`SourceConfig`] | [`SourceChain`] | [`SourceConfig::compile`] |
//! | [`StepConfig`] | [`SourceStep`] | [`StepConfig::compile`] |
//!
//! ```json
//! {
//!   "condition": {
//!     "or": [ { "urlPattern": "/**/*.png" }, { "urlPattern": "/**/*.css" } ]
//!   },
//!   "source": [ { "cacheName": "static" }, "network" ]
//! }
//! ```
//!
//! Compilation checks shape (known keys, non-empty objects, step fields that
//! fit the step type). Structural limits are left to
//! [`Router::add_rules`](crate::Router::add_rules).

use crate::{
    Behavior, Condition, RequestAttributes, RequestError, RequestSnapshot, Rule, RunningStatus,
    SourceChain, SourceKind, SourceStep, SourceType, ValidationError,
};
use serde::{Deserialize, Serialize};

/// Errors from compiling serialized rules.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The document is not valid JSON or does not have the rule shape.
    #[error("invalid rule document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A condition object has no keys.
    #[error("condition object is empty; give at least one of urlPattern, requestMethod, requestMode, requestDestination, runningStatus, timeWindow, rttLessThan, rttGreaterThan, and, or, not")]
    EmptyCondition,

    /// A step object names neither a type nor a cache.
    #[error("source step has no \"type\" and no \"cacheName\"")]
    MissingSourceType,

    /// A step object carries a field its type does not use.
    #[error("field \"{field}\" does not apply to source type \"{source_type}\"")]
    UnexpectedField {
        /// The offending field, as written.
        field: &'static str,
        /// The step's type.
        source_type: SourceType,
    },

    /// A `requestOverride` URL does not parse.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// A value was rejected while building the runtime type.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// An error inside the rule at `index`.
    #[error("rule {index}: {source}")]
    Rule {
        /// Position of the rule in its document.
        index: usize,
        /// The underlying error.
        source: Box<ConfigError>,
    },
}

/// A rule document: a single rule, a list, or `{"rules": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleDocument {
    /// `{"rules": [...]}`
    Envelope {
        /// The rules, in priority order.
        rules: Vec<RuleConfig>,
    },
    /// `[...]`
    List(Vec<RuleConfig>),
    /// `{"condition": ..., "source": ...}`
    Single(RuleConfig),
}

impl RuleDocument {
    /// The rules, in priority order.
    #[must_use]
    pub fn into_rules(self) -> Vec<RuleConfig> {
        match self {
            Self::Envelope { rules } | Self::List(rules) => rules,
            Self::Single(rule) => vec![rule],
        }
    }

    /// Compile every rule.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Rule`] for the first rule that fails.
    pub fn compile(self) -> Result<Vec<Rule>, ConfigError> {
        self.into_rules()
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                rule.compile().map_err(|source| ConfigError::Rule {
                    index,
                    source: Box::new(source),
                })
            })
            .collect()
    }
}

/// Parse and compile a JSON rule document.
///
/// # Errors
///
/// [`ConfigError::Parse`] for malformed JSON, otherwise the errors of
/// [`RuleDocument::compile`].
pub fn parse_rules_json(json: &str) -> Result<Vec<Rule>, ConfigError> {
    serde_json::from_str::<RuleDocument>(json)?.compile()
}

/// Configuration for a [`Rule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    /// When the rule applies.
    pub condition: ConditionConfig,
    /// Where the response comes from.
    pub source: SourceConfig,
}

impl RuleConfig {
    /// Compile into a [`Rule`].
    ///
    /// # Errors
    ///
    /// Propagates condition and source errors.
    pub fn compile(&self) -> Result<Rule, ConfigError> {
        Ok(Rule::new(self.condition.compile()?, self.source.compile()?))
    }
}

/// Time window bounds in ms since the Unix epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeWindowConfig {
    /// Inclusive start; defaults to 0.
    #[serde(default)]
    pub from: u64,
    /// Exclusive end; absent is unbounded.
    #[serde(default)]
    pub to: Option<u64>,
}

/// Configuration for a [`Condition`].
///
/// Every present key contributes one condition; several keys combine with
/// AND. The three request keys fold into one request-attribute condition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConditionConfig {
    /// URL glob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pattern: Option<String>,
    /// Request method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    /// Request mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_mode: Option<String>,
    /// Request destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_destination: Option<String>,
    /// Handler running status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_status: Option<RunningStatus>,
    /// Wall-clock window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindowConfig>,
    /// RTT upper bound (exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_less_than: Option<u64>,
    /// RTT lower bound (exclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtt_greater_than: Option<u64>,
    /// All must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<Vec<ConditionConfig>>,
    /// Any must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<ConditionConfig>>,
    /// Must not match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not: Option<Box<ConditionConfig>>,
}

impl ConditionConfig {
    /// Compile into a [`Condition`].
    ///
    /// # Errors
    ///
    /// - [`ConfigError::EmptyCondition`] for an object with no keys
    /// - [`ConfigError::Invalid`] for a URL pattern that does not compile
    pub fn compile(&self) -> Result<Condition, ConfigError> {
        let mut parts = Vec::new();

        if let Some(pattern) = &self.url_pattern {
            parts.push(Condition::url_pattern(pattern.as_str())?);
        }
        if self.request_method.is_some()
            || self.request_mode.is_some()
            || self.request_destination.is_some()
        {
            parts.push(Condition::RequestAttribute(RequestAttributes {
                method: self
                    .request_method
                    .as_deref()
                    .map(str::to_ascii_uppercase),
                mode: self.request_mode.clone(),
                destination: self.request_destination.clone(),
            }));
        }
        if let Some(status) = self.running_status {
            parts.push(Condition::RunningStatus(status));
        }
        if let Some(window) = self.time_window {
            parts.push(Condition::time_window(window.from, window.to));
        }
        if self.rtt_less_than.is_some() || self.rtt_greater_than.is_some() {
            parts.push(Condition::NetworkQuality {
                rtt_less_than: self.rtt_less_than,
                rtt_greater_than: self.rtt_greater_than,
            });
        }
        if let Some(children) = &self.and {
            parts.push(Condition::And(compile_all(children)?));
        }
        if let Some(children) = &self.or {
            parts.push(Condition::Or(compile_all(children)?));
        }
        if let Some(inner) = &self.not {
            parts.push(Condition::not(inner.compile()?));
        }

        match parts.len() {
            0 => Err(ConfigError::EmptyCondition),
            _ => Ok(Condition::from_all(parts, Condition::always())),
        }
    }
}

fn compile_all(children: &[ConditionConfig]) -> Result<Vec<Condition>, ConfigError> {
    children.iter().map(ConditionConfig::compile).collect()
}

/// Configuration for a [`SourceChain`]: one step or a list of steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceConfig {
    /// A single step (usually a bare source type).
    Single(StepConfig),
    /// Steps in order.
    Chain(Vec<StepConfig>),
}

impl SourceConfig {
    /// Compile into a [`SourceChain`].
    ///
    /// # Errors
    ///
    /// Propagates step errors. An empty list compiles to an empty chain,
    /// which admission rejects.
    pub fn compile(&self) -> Result<SourceChain, ConfigError> {
        match self {
            Self::Single(step) => Ok(step.compile()?.into()),
            Self::Chain(steps) => steps.iter().map(StepConfig::compile).collect(),
        }
    }
}

/// Configuration for a [`SourceStep`]: a bare type or a step object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// `"network"`, `"cache"`, ...
    Type(SourceType),
    /// `{"type": "network", "updatedCacheName": "static"}`, ...
    Object(StepObject),
}

/// A source step written out as an object.
///
/// `type` may be omitted when `cacheName` is given; the step is then a cache
/// lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StepObject {
    /// The source type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    /// Cache to look in (`cache`, `race-network-and-cache`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_name: Option<String>,
    /// Cache to write the fetched response into (`network`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_cache_name: Option<String>,
    /// Whether non-2xx responses are written (`network`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_error_response: Option<bool>,
    /// URL to look up instead of the request's (`cache`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_override: Option<String>,
    /// Tag passed to the handler (`fetch-event`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    /// What the step's result does to the rest of the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Behavior>,
}

impl StepConfig {
    /// Compile into a [`SourceStep`].
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MissingSourceType`] for an object with neither
    ///   `type` nor `cacheName`
    /// - [`ConfigError::UnexpectedField`] for a field the type does not use
    /// - [`ConfigError::Request`] for an unparseable `requestOverride`
    pub fn compile(&self) -> Result<SourceStep, ConfigError> {
        match self {
            Self::Type(source_type) => Ok((*source_type).into()),
            Self::Object(object) => object.compile(),
        }
    }
}

impl StepObject {
    fn compile(&self) -> Result<SourceStep, ConfigError> {
        let source_type = match (self.source_type, &self.cache_name) {
            (Some(t), _) => t,
            (None, Some(_)) => SourceType::Cache,
            (None, None) => return Err(ConfigError::MissingSourceType),
        };
        let reject = |field: &'static str, present: bool| {
            if present {
                Err(ConfigError::UnexpectedField { field, source_type })
            } else {
                Ok(())
            }
        };

        let network_fields =
            self.updated_cache_name.is_some() || self.cache_error_response.is_some();
        if source_type != SourceType::Network {
            reject("updatedCacheName", self.updated_cache_name.is_some())?;
            reject("cacheErrorResponse", self.cache_error_response.is_some())?;
        }
        if !matches!(
            source_type,
            SourceType::Cache | SourceType::RaceNetworkAndCache
        ) {
            reject("cacheName", self.cache_name.is_some())?;
        }
        if source_type != SourceType::Cache {
            reject("requestOverride", self.request_override.is_some())?;
        }
        if source_type != SourceType::FetchEvent {
            reject("callbackId", self.callback_id.is_some())?;
        }

        let kind = match source_type {
            SourceType::Network if network_fields => SourceKind::Network {
                update_cache_name: self.updated_cache_name.clone(),
                cache_error_response: self.cache_error_response,
            },
            SourceType::Cache => SourceKind::Cache {
                cache_name: self.cache_name.clone(),
                request_override: self
                    .request_override
                    .as_deref()
                    .map(|url| RequestSnapshot::get(url))
                    .transpose()?,
            },
            SourceType::FetchEvent => SourceKind::FetchHandler {
                callback_id: self.callback_id.clone(),
            },
            SourceType::RaceNetworkAndCache => SourceKind::RaceNetworkAndCache {
                cache_name: self.cache_name.clone(),
            },
            other => other.into(),
        };
        Ok(SourceStep {
            kind,
            behavior: self.behavior.unwrap_or_default(),
        })
    }
}

//! swroute - declarative request routing in front of a programmable fetch handler
//!
//! An application declares, ahead of time, which requests are answered from
//! the network, from a named cache, from the programmable handler, or from a
//! race between sources. Requests that no rule claims fall back to the
//! handler.
//!
//! # Architecture
//!
//! - [`Condition`]: closed boolean tree over a [`RequestSnapshot`] and [`RuntimeContext`]
//! - [`SourceChain`]: ordered [`SourceStep`]s, each with a [`Behavior`]
//! - [`Rule`] / [`RuleSet`]: `(condition, chain)` pairs, insertion order is priority
//! - [`SourceChainExecutor`]: drives the [`Capabilities`] and folds step results into an [`Outcome`]
//! - [`Router`]: first match wins, returns a [`RouteDecision`]
//!
//! # Key Design Insights
//!
//! 1. **Validate at admission**: [`Router::add_rules`] checks a whole batch
//!    before appending any of it. Evaluation never fails.
//!
//! 2. **First match wins, not first success**: once a rule matches, later
//!    rules are never consulted, even if the chain yields [`Outcome::NoResult`].
//!
//! 3. **Side effects outlive the decision**: cache writes and revalidation
//!    run in the background; [`Router::drain`] waits for them.
//!
//! # Example
//!
//! ```
//! use swroute::prelude::*;
//!
//! let rules = vec![
//!     Rule::new(
//!         Condition::Or(vec![
//!             Condition::url_pattern("/**/*.png").unwrap(),
//!             Condition::url_pattern("/**/*.css").unwrap(),
//!         ]),
//!         SourceChain::new(vec![SourceStep::cache("static"), SourceStep::network()]),
//!     ),
//!     Rule::new(Condition::rtt_greater_than(150), SourceType::FetchEvent),
//! ];
//!
//! let mut set = RuleSet::new();
//! set.add_rules(rules, DEFAULT_MAX_RULES).unwrap();
//!
//! let request = RequestSnapshot::get("https://app.test/img/logo.png").unwrap();
//! let (index, _rule) = set
//!     .find_match(&request, &RuntimeContext::default(), &GlobMatcher)
//!     .unwrap();
//! assert_eq!(index, 0);
//! ```

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod capability;
mod condition;
mod context;
mod executor;
mod outcome;
mod request;
mod router;
mod rule;
mod source;
mod trace;
mod url_pattern;

#[cfg(feature = "config")]
mod config;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

// Core types
pub use condition::{Condition, RequestAttributes};
pub use context::{system_now_ms, RunningStatus, RuntimeContext, RuntimeProbe};
pub use outcome::{Outcome, RouteDecision};
pub use request::{RequestBuilder, RequestError, RequestSnapshot};
pub use rule::{Rule, RuleSet};
pub use source::{Behavior, SourceChain, SourceKind, SourceStep, SourceType};
pub use url_pattern::{GlobMatcher, UrlPattern, UrlPatternMatcher};

// Execution
pub use capability::{
    CacheStorage, CacheWriteError, Capabilities, FetchHandler, HandlerError, Network,
    NetworkError, Response,
};
pub use executor::SourceChainExecutor;
pub use router::{Router, RouterConfig};

// Serialized rules (feature-gated)
#[cfg(feature = "config")]
pub use config::{
    parse_rules_json, ConditionConfig, ConfigError, RuleConfig, RuleDocument, SourceConfig,
    StepConfig, StepObject, TimeWindowConfig,
};

// Trace types
pub use trace::{ConditionTrace, MatchTrace, RouteTrace, RuleStep};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use swroute::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Behavior,
        CacheStorage,
        Capabilities,
        Condition,
        FetchHandler,
        GlobMatcher,
        Network,
        NetworkError,
        Outcome,
        RequestSnapshot,
        Response,
        RouteDecision,
        Router,
        RouterConfig,
        Rule,
        RuleSet,
        RunningStatus,
        RuntimeContext,
        SourceChain,
        SourceStep,
        SourceType,
        ValidationError,
        DEFAULT_MAX_RULES,
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum nesting depth of a condition tree.
///
/// Validated at admission via [`Condition::validate`].
pub const MAX_CONDITION_DEPTH: usize = 32;

/// Maximum number of children in a single `And` or `Or` condition.
///
/// Depth alone does not bound a tree: a single `Or` with millions of children
/// sits at depth 2.
pub const MAX_CONDITIONS_PER_COMPOUND: usize = 256;

/// Maximum number of steps in a source chain.
pub const MAX_CHAIN_LENGTH: usize = 16;

/// Maximum length of a URL pattern, in bytes.
pub const MAX_PATTERN_LENGTH: usize = 8192;

/// Default for [`RouterConfig::max_rules`].
pub const DEFAULT_MAX_RULES: usize = 1024;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors from rule admission.
///
/// Caught when rules are added, never while routing. A rejected batch leaves
/// the rule set unchanged; fix the rule and add the batch again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A network-quality condition with neither bound.
    #[error("network quality condition needs rttLessThan, rttGreaterThan, or both")]
    EmptyNetworkQuality,

    /// A network-quality condition no RTT can satisfy.
    #[error(
        "network quality range is empty: no RTT is above {greater_than} and below {less_than}"
    )]
    EmptyRttRange {
        /// Exclusive upper bound.
        less_than: u64,
        /// Exclusive lower bound.
        greater_than: u64,
    },

    /// A source chain with no steps.
    #[error("source chain is empty; give at least one source")]
    EmptySourceChain,

    /// A step names a cache with an empty name.
    #[error("{source_type} step has an empty cache name")]
    EmptyCacheName {
        /// The step's source type.
        source_type: &'static str,
    },

    /// An empty URL pattern.
    #[error("URL pattern is empty")]
    EmptyUrlPattern,

    /// A URL pattern that cannot be compiled.
    #[error("invalid URL pattern \"{pattern}\": {reason}")]
    InvalidUrlPattern {
        /// The pattern as written.
        pattern: String,
        /// Why it failed.
        reason: String,
    },

    /// A URL pattern above [`MAX_PATTERN_LENGTH`].
    #[error("URL pattern length is {len}, but maximum allowed is {max}")]
    PatternTooLong {
        /// Actual length.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A time window that ends before it starts.
    #[error("time window is empty: to ({to}) must be greater than from ({from})")]
    InvalidTimeWindow {
        /// Inclusive start.
        from: u64,
        /// Exclusive end.
        to: u64,
    },

    /// Condition nesting above [`MAX_CONDITION_DEPTH`].
    #[error(
        "condition nesting depth is {depth}, but maximum allowed is {max}; flatten the condition tree"
    )]
    DepthExceeded {
        /// Depth reached.
        depth: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// An `And`/`Or` above [`MAX_CONDITIONS_PER_COMPOUND`] children.
    #[error("compound condition has {count} children, but maximum allowed is {max}")]
    TooManyConditions {
        /// Actual count.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// A source chain above [`MAX_CHAIN_LENGTH`] steps.
    #[error("source chain has {len} steps, but maximum allowed is {max}")]
    ChainTooLong {
        /// Actual length.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Admitting the batch would exceed [`RouterConfig::max_rules`].
    #[error("rule set would hold {count} rules, but maximum allowed is {max}")]
    TooManyRules {
        /// Size after admission.
        count: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// The rule at `index` in the batch is invalid.
    #[error("rule {index}: {source}")]
    Rule {
        /// Position in the batch.
        index: usize,
        /// What is wrong with it.
        source: Box<ValidationError>,
    },
}

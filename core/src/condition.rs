//! Condition: boolean predicates over a request and runtime context
//!
//! A [`Condition`] is a closed tree: five leaf kinds that each read one
//! aspect of the [`RequestSnapshot`] or [`RuntimeContext`], and three
//! combinators (`And`, `Or`, `Not`). Evaluation is pure and synchronous.
//!
//! # INV: structural checks happen at admission
//!
//! [`Condition::validate`] rejects malformed trees (empty RTT bounds, inverted
//! time windows, excessive depth or fan-out). [`Condition::evaluate`] never
//! fails; it assumes the tree has been validated.

use crate::{
    ConditionTrace, RequestSnapshot, RunningStatus, RuntimeContext, UrlPattern,
    UrlPatternMatcher, ValidationError, MAX_CONDITIONS_PER_COMPOUND, MAX_CONDITION_DEPTH,
};
use std::fmt;

/// Request attributes compared for equality.
///
/// Absent fields are unconstrained. The method is compared ASCII
/// case-insensitively; mode and destination compare exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestAttributes {
    /// Required request method.
    pub method: Option<String>,
    /// Required request mode.
    pub mode: Option<String>,
    /// Required request destination.
    pub destination: Option<String>,
}

impl RequestAttributes {
    fn matches(&self, request: &RequestSnapshot) -> bool {
        self.method
            .as_deref()
            .map_or(true, |m| m.eq_ignore_ascii_case(request.method()))
            && self.mode.as_deref().map_or(true, |m| m == request.mode())
            && self
                .destination
                .as_deref()
                .map_or(true, |d| d == request.destination())
    }
}

/// A boolean condition tree.
///
/// # Variants
///
/// - `UrlPattern`: request URL matches the pattern
/// - `RequestAttribute`: every present attribute equals the request's
/// - `TimeWindow`: `from <= now < to` (`to = None` is unbounded)
/// - `RunningStatus`: the handler's running status equals this one
/// - `NetworkQuality`: RTT is strictly inside every present bound
/// - `And`: all children match (empty matches)
/// - `Or`: any child matches (empty does not match)
/// - `Not`: the child does not match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Request URL matches the pattern.
    UrlPattern(UrlPattern),

    /// Request attributes equal the given values.
    RequestAttribute(RequestAttributes),

    /// Wall-clock time falls inside `[from, to)`.
    TimeWindow {
        /// Inclusive lower bound, ms since the Unix epoch.
        from: u64,
        /// Exclusive upper bound, ms since the Unix epoch. `None` is unbounded.
        to: Option<u64>,
    },

    /// The programmable handler's running status.
    RunningStatus(RunningStatus),

    /// RTT estimate bounds, in milliseconds.
    NetworkQuality {
        /// Matches if RTT is strictly below this.
        rtt_less_than: Option<u64>,
        /// Matches if RTT is strictly above this.
        rtt_greater_than: Option<u64>,
    },

    /// All children must match (logical AND).
    /// Short-circuits on the first `false`.
    And(Vec<Condition>),

    /// Any child must match (logical OR).
    /// Short-circuits on the first `true`.
    Or(Vec<Condition>),

    /// Inverts the child (logical NOT).
    Not(Box<Condition>),
}

impl Condition {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// A condition that always matches (`And([])`).
    #[must_use]
    pub fn always() -> Self {
        Self::And(Vec::new())
    }

    /// Match the request URL against a glob pattern.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`UrlPattern::new`].
    pub fn url_pattern(pattern: impl Into<String>) -> Result<Self, ValidationError> {
        UrlPattern::new(pattern).map(Self::UrlPattern)
    }

    /// Match the request method.
    #[must_use]
    pub fn method(method: impl Into<String>) -> Self {
        Self::RequestAttribute(RequestAttributes {
            method: Some(method.into().to_ascii_uppercase()),
            ..RequestAttributes::default()
        })
    }

    /// Match the request mode.
    #[must_use]
    pub fn mode(mode: impl Into<String>) -> Self {
        Self::RequestAttribute(RequestAttributes {
            mode: Some(mode.into()),
            ..RequestAttributes::default()
        })
    }

    /// Match the request destination.
    #[must_use]
    pub fn destination(destination: impl Into<String>) -> Self {
        Self::RequestAttribute(RequestAttributes {
            destination: Some(destination.into()),
            ..RequestAttributes::default()
        })
    }

    /// Match the handler's running status.
    #[must_use]
    pub fn running_status(status: RunningStatus) -> Self {
        Self::RunningStatus(status)
    }

    /// Match when the RTT estimate is strictly below `ms`.
    #[must_use]
    pub fn rtt_less_than(ms: u64) -> Self {
        Self::NetworkQuality {
            rtt_less_than: Some(ms),
            rtt_greater_than: None,
        }
    }

    /// Match when the RTT estimate is strictly above `ms`.
    #[must_use]
    pub fn rtt_greater_than(ms: u64) -> Self {
        Self::NetworkQuality {
            rtt_less_than: None,
            rtt_greater_than: Some(ms),
        }
    }

    /// Match while `from <= now < to`.
    #[must_use]
    pub fn time_window(from: u64, to: Option<u64>) -> Self {
        Self::TimeWindow { from, to }
    }

    /// Logical NOT.
    #[must_use]
    #[allow(clippy::should_implement_trait)] // constructor, not an operator
    pub fn not(inner: Self) -> Self {
        Self::Not(Box::new(inner))
    }

    /// Compose conditions with AND semantics, optimizing for common cases.
    ///
    /// - Empty → `catch_all`
    /// - Single → unwrapped
    /// - Multiple → `And(conditions)`
    #[must_use]
    pub fn from_all(mut conditions: Vec<Self>, catch_all: Self) -> Self {
        match conditions.len() {
            0 => catch_all,
            1 => conditions.pop().unwrap_or(catch_all),
            _ => Self::And(conditions),
        }
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    /// Evaluate this condition.
    ///
    /// URL patterns are judged by `patterns`; everything else reads the
    /// request and context directly.
    pub fn evaluate(
        &self,
        request: &RequestSnapshot,
        context: &RuntimeContext,
        patterns: &dyn UrlPatternMatcher,
    ) -> bool {
        match self {
            Self::UrlPattern(p) => patterns.matches(p, request.url()),
            Self::RequestAttribute(attrs) => attrs.matches(request),
            Self::TimeWindow { from, to } => {
                *from <= context.now_ms && to.map_or(true, |to| context.now_ms < to)
            }
            Self::RunningStatus(status) => context.running_status == *status,
            Self::NetworkQuality {
                rtt_less_than,
                rtt_greater_than,
            } => {
                rtt_less_than.map_or(true, |lt| context.rtt_ms < lt)
                    && rtt_greater_than.map_or(true, |gt| context.rtt_ms > gt)
            }
            Self::And(children) => children
                .iter()
                .all(|c| c.evaluate(request, context, patterns)),
            Self::Or(children) => children
                .iter()
                .any(|c| c.evaluate(request, context, patterns)),
            Self::Not(inner) => !inner.evaluate(request, context, patterns),
        }
    }

    /// Evaluate with full trace for debugging.
    ///
    /// Unlike [`evaluate()`](Self::evaluate), this does NOT short-circuit
    /// And/Or. The `matched` result is still identical.
    #[must_use]
    pub fn evaluate_with_trace(
        &self,
        request: &RequestSnapshot,
        context: &RuntimeContext,
        patterns: &dyn UrlPatternMatcher,
    ) -> ConditionTrace {
        match self {
            Self::And(children) => {
                let children: Vec<ConditionTrace> = children
                    .iter()
                    .map(|c| c.evaluate_with_trace(request, context, patterns))
                    .collect();
                let matched = children.iter().all(ConditionTrace::matched);
                ConditionTrace::And { matched, children }
            }
            Self::Or(children) => {
                let children: Vec<ConditionTrace> = children
                    .iter()
                    .map(|c| c.evaluate_with_trace(request, context, patterns))
                    .collect();
                let matched = children.iter().any(ConditionTrace::matched);
                ConditionTrace::Or { matched, children }
            }
            Self::Not(inner) => {
                let inner = inner.evaluate_with_trace(request, context, patterns);
                ConditionTrace::Not {
                    matched: !inner.matched(),
                    inner: Box::new(inner),
                }
            }
            leaf => ConditionTrace::Leaf {
                matched: leaf.evaluate(request, context, patterns),
                condition: leaf.to_string(),
                observed: leaf.observed(request, context),
            },
        }
    }

    /// What a leaf looked at, for traces.
    fn observed(&self, request: &RequestSnapshot, context: &RuntimeContext) -> String {
        match self {
            Self::UrlPattern(_) => request.url().to_string(),
            Self::RequestAttribute(_) => format!(
                "method={} mode={} destination={}",
                request.method(),
                request.mode(),
                request.destination()
            ),
            Self::TimeWindow { .. } => format!("now={}", context.now_ms),
            Self::RunningStatus(_) => context.running_status.to_string(),
            Self::NetworkQuality { .. } => format!("rtt={}", context.rtt_ms),
            Self::And(_) | Self::Or(_) | Self::Not(_) => String::new(),
        }
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Calculate the depth of this condition tree.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::And(cs) | Self::Or(cs) => 1 + cs.iter().map(Self::depth).max().unwrap_or(0),
            Self::Not(c) => 1 + c.depth(),
            _ => 1,
        }
    }

    /// Validate this condition against structural and safety constraints.
    ///
    /// Checks:
    /// - nesting depth does not exceed [`MAX_CONDITION_DEPTH`]
    /// - `And`/`Or` have at most [`MAX_CONDITIONS_PER_COMPOUND`] children
    /// - `NetworkQuality` has at least one bound and a non-empty range
    /// - `TimeWindow` has `from < to`
    ///
    /// Recursion stops as soon as the depth limit is crossed, so validating a
    /// pathologically deep tree is bounded by the limit.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found (depth-first, in order).
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(1)
    }

    fn validate_at(&self, depth: usize) -> Result<(), ValidationError> {
        if depth > MAX_CONDITION_DEPTH {
            return Err(ValidationError::DepthExceeded {
                depth,
                max: MAX_CONDITION_DEPTH,
            });
        }
        match self {
            Self::UrlPattern(_) | Self::RequestAttribute(_) | Self::RunningStatus(_) => Ok(()),
            Self::TimeWindow { from, to } => match to {
                Some(to) if *to <= *from => Err(ValidationError::InvalidTimeWindow {
                    from: *from,
                    to: *to,
                }),
                _ => Ok(()),
            },
            Self::NetworkQuality {
                rtt_less_than,
                rtt_greater_than,
            } => match (rtt_less_than, rtt_greater_than) {
                (None, None) => Err(ValidationError::EmptyNetworkQuality),
                // strict bounds on integers: (gt, lt) is empty when lt <= gt + 1
                (Some(lt), Some(gt)) if *lt <= gt.saturating_add(1) => {
                    Err(ValidationError::EmptyRttRange {
                        less_than: *lt,
                        greater_than: *gt,
                    })
                }
                _ => Ok(()),
            },
            Self::And(children) | Self::Or(children) => {
                if children.len() > MAX_CONDITIONS_PER_COMPOUND {
                    return Err(ValidationError::TooManyConditions {
                        count: children.len(),
                        max: MAX_CONDITIONS_PER_COMPOUND,
                    });
                }
                children.iter().try_for_each(|c| c.validate_at(depth + 1))
            }
            Self::Not(inner) => inner.validate_at(depth + 1),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UrlPattern(p) => write!(f, "urlPattern({p})"),
            Self::RequestAttribute(attrs) => {
                f.write_str("request(")?;
                let mut sep = "";
                if let Some(m) = &attrs.method {
                    write!(f, "method={m}")?;
                    sep = " ";
                }
                if let Some(m) = &attrs.mode {
                    write!(f, "{sep}mode={m}")?;
                    sep = " ";
                }
                if let Some(d) = &attrs.destination {
                    write!(f, "{sep}destination={d}")?;
                }
                f.write_str(")")
            }
            Self::TimeWindow { from, to: Some(to) } => write!(f, "timeWindow({from}..{to})"),
            Self::TimeWindow { from, to: None } => write!(f, "timeWindow({from}..)"),
            Self::RunningStatus(s) => write!(f, "runningStatus({s})"),
            Self::NetworkQuality {
                rtt_less_than,
                rtt_greater_than,
            } => {
                f.write_str("rtt(")?;
                if let Some(gt) = rtt_greater_than {
                    write!(f, ">{gt}")?;
                }
                if rtt_less_than.is_some() && rtt_greater_than.is_some() {
                    f.write_str(" ")?;
                }
                if let Some(lt) = rtt_less_than {
                    write!(f, "<{lt}")?;
                }
                f.write_str(")")
            }
            Self::And(cs) => write!(f, "and[{}]", cs.len()),
            Self::Or(cs) => write!(f, "or[{}]", cs.len()),
            Self::Not(_) => f.write_str("not"),
        }
    }
}

//! Evaluation trace types for debugging routing decisions.
//!
//! Trace types mirror the runtime types ([`Condition`](crate::Condition),
//! [`RuleSet`](crate::RuleSet)) but capture evaluation results instead of
//! inputs.
//!
//! # Two Levels of Trace
//!
//! - [`ConditionTrace`]: per condition, which sub-expressions matched?
//! - [`MatchTrace`]: per rule set, which rules were evaluated, which one won?

use crate::RouteDecision;
use std::fmt;

/// Trace of a condition evaluation.
///
/// In And/Or, ALL children are evaluated (no short-circuit) for maximum
/// debugging value. The `matched` result is still correct.
pub enum ConditionTrace {
    /// A leaf condition.
    Leaf {
        /// Whether this leaf matched.
        matched: bool,
        /// The leaf as written (e.g. `"urlPattern(/**/*.png)"`).
        condition: String,
        /// What the leaf looked at (e.g. `"rtt=200"`).
        observed: String,
    },
    /// AND: all children must match.
    And {
        /// Whether all children matched.
        matched: bool,
        /// Trace of each child (all evaluated, no short-circuit).
        children: Vec<ConditionTrace>,
    },
    /// OR: any child must match.
    Or {
        /// Whether any child matched.
        matched: bool,
        /// Trace of each child (all evaluated, no short-circuit).
        children: Vec<ConditionTrace>,
    },
    /// NOT: inverts inner result.
    Not {
        /// Whether the NOT matched (i.e., inner did NOT match).
        matched: bool,
        /// Trace of the inner condition.
        inner: Box<ConditionTrace>,
    },
}

impl ConditionTrace {
    /// Get the overall match result of this condition.
    #[must_use]
    pub fn matched(&self) -> bool {
        match self {
            Self::Leaf { matched, .. }
            | Self::And { matched, .. }
            | Self::Or { matched, .. }
            | Self::Not { matched, .. } => *matched,
        }
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let mark = if self.matched() { "+" } else { "-" };
        let pad = "  ".repeat(indent);
        match self {
            Self::Leaf {
                condition,
                observed,
                ..
            } => writeln!(f, "{pad}{mark} {condition}  [{observed}]"),
            Self::And { children, .. } | Self::Or { children, .. } => {
                let op = if matches!(self, Self::And { .. }) {
                    "and"
                } else {
                    "or"
                };
                writeln!(f, "{pad}{mark} {op}")?;
                children.iter().try_for_each(|c| c.render(f, indent + 1))
            }
            Self::Not { inner, .. } => {
                writeln!(f, "{pad}{mark} not")?;
                inner.render(f, indent + 1)
            }
        }
    }
}

impl fmt::Debug for ConditionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf {
                matched,
                condition,
                observed,
            } => f
                .debug_struct("Leaf")
                .field("matched", matched)
                .field("condition", condition)
                .field("observed", observed)
                .finish(),
            Self::And { matched, children } => f
                .debug_struct("And")
                .field("matched", matched)
                .field("children", children)
                .finish(),
            Self::Or { matched, children } => f
                .debug_struct("Or")
                .field("matched", matched)
                .field("children", children)
                .finish(),
            Self::Not { matched, inner } => f
                .debug_struct("Not")
                .field("matched", matched)
                .field("inner", inner)
                .finish(),
        }
    }
}

/// Human-readable tree, one line per node, `+`/`-` for matched/unmatched.
impl fmt::Display for ConditionTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}

/// One rule's evaluation in a trace.
#[derive(Debug)]
pub struct RuleStep {
    /// Index in the rule set (0-based, insertion order).
    pub index: usize,
    /// Full condition evaluation trace.
    pub condition: ConditionTrace,
}

impl RuleStep {
    /// Did this rule's condition match?
    #[must_use]
    pub fn matched(&self) -> bool {
        self.condition.matched()
    }
}

/// Trace of rule selection over a [`RuleSet`](crate::RuleSet).
///
/// # INV: `steps` stops at the first match
///
/// Rules after the matching one are never evaluated, so they never appear.
#[derive(Debug, Default)]
pub struct MatchTrace {
    /// Each rule that was evaluated, in order.
    pub steps: Vec<RuleStep>,
}

impl MatchTrace {
    /// Index of the matching rule, if any.
    #[must_use]
    pub fn matched_rule(&self) -> Option<usize> {
        self.steps.last().filter(|s| s.matched()).map(|s| s.index)
    }
}

/// Trace of a full [`Router::route`](crate::Router::route) call.
///
/// # INV: `decision` == `route()` result
#[derive(Debug)]
pub struct RouteTrace {
    /// The decision (identical to what `route()` returns).
    pub decision: RouteDecision,
    /// How the rule was selected.
    pub selection: MatchTrace,
}

//! Rules and the ordered rule set.

use crate::{
    Condition, MatchTrace, RequestSnapshot, RuleStep, RuntimeContext, SourceChain,
    UrlPatternMatcher, ValidationError,
};
use std::sync::Arc;

/// A routing rule: when `condition` holds, respond from `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// When the rule applies.
    pub condition: Condition,
    /// Where the response comes from.
    pub source: SourceChain,
}

impl Rule {
    /// Create a rule. Nothing is checked until admission.
    pub fn new(condition: Condition, source: impl Into<SourceChain>) -> Self {
        Self {
            condition,
            source: source.into(),
        }
    }

    /// Validate condition and source chain.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`Condition::validate`] or
    /// [`SourceChain::validate`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.condition.validate()?;
        self.source.validate()
    }
}

/// Ordered, append-only collection of rules.
///
/// # INV: insertion order is priority order
///
/// Rules are never reordered, deduplicated or edited in place.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// An empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch, all or nothing.
    ///
    /// Every rule is validated before any is appended, and the resulting
    /// size must not exceed `max_rules`.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::Rule`] wrapping the first invalid rule's error
    /// - [`ValidationError::TooManyRules`] if the batch would exceed `max_rules`
    ///
    /// On error the set is unchanged.
    pub fn add_rules(&mut self, batch: Vec<Rule>, max_rules: usize) -> Result<(), ValidationError> {
        for (index, rule) in batch.iter().enumerate() {
            rule.validate().map_err(|source| ValidationError::Rule {
                index,
                source: Box::new(source),
            })?;
        }
        let count = self.rules.len() + batch.len();
        if count > max_rules {
            return Err(ValidationError::TooManyRules {
                count,
                max: max_rules,
            });
        }
        self.rules.extend(batch.into_iter().map(Arc::new));
        Ok(())
    }

    /// The first rule whose condition holds, with its index.
    #[must_use]
    pub fn find_match(
        &self,
        request: &RequestSnapshot,
        context: &RuntimeContext,
        patterns: &dyn UrlPatternMatcher,
    ) -> Option<(usize, Arc<Rule>)> {
        self.rules
            .iter()
            .position(|rule| rule.condition.evaluate(request, context, patterns))
            .map(|index| (index, Arc::clone(&self.rules[index])))
    }

    /// Like [`find_match`](Self::find_match), recording every rule evaluated.
    ///
    /// The trace stops at the first match.
    #[must_use]
    pub fn explain(
        &self,
        request: &RequestSnapshot,
        context: &RuntimeContext,
        patterns: &dyn UrlPatternMatcher,
    ) -> (Option<(usize, Arc<Rule>)>, MatchTrace) {
        let mut trace = MatchTrace::default();
        for (index, rule) in self.rules.iter().enumerate() {
            let condition = rule.condition.evaluate_with_trace(request, context, patterns);
            let matched = condition.matched();
            trace.steps.push(RuleStep { index, condition });
            if matched {
                return (Some((index, Arc::clone(rule))), trace);
            }
        }
        (None, trace)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(AsRef::as_ref)
    }
}

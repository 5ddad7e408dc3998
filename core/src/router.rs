//! The router: rule selection plus chain execution.

use crate::{
    Capabilities, MatchTrace, RequestSnapshot, RouteDecision, RouteTrace, Rule, RuleSet,
    RuntimeContext, SourceChainExecutor, ValidationError,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Router-wide settings.
///
/// Deserializes from any serde format; absent fields take their defaults.
///
/// ```
/// # use swroute::RouterConfig;
/// let config = RouterConfig::default();
/// assert_eq!(config.default_cache_name, "default");
/// assert!(config.cache_error_responses);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// Cache used by steps that name none.
    pub default_cache_name: String,
    /// Whether network steps write non-2xx responses to their update cache
    /// when the step leaves it unspecified.
    pub cache_error_responses: bool,
    /// Upper bound on the number of admitted rules.
    pub max_rules: usize,
    /// Per-operation timeout for fetches, lookups and handler calls.
    pub operation_timeout_ms: Option<u64>,
}

impl RouterConfig {
    /// [`operation_timeout_ms`](Self::operation_timeout_ms) as a [`Duration`].
    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_cache_name: "default".into(),
            cache_error_responses: true,
            max_rules: crate::DEFAULT_MAX_RULES,
            operation_timeout_ms: None,
        }
    }
}

/// Routes requests through an ordered rule set.
///
/// `route` may be called concurrently; `add_rules` takes an exclusive lock
/// that is never held across an await.
///
/// # Example
///
/// ```no_run
/// # use swroute::prelude::*;
/// # async fn demo(capabilities: Capabilities) -> Result<(), ValidationError> {
/// let router = Router::new(capabilities);
/// router.add_rules(vec![
///     Rule::new(Condition::url_pattern("/**/*.png")?, SourceType::Cache),
///     Rule::new(Condition::always(), SourceType::Network),
/// ])?;
///
/// let request = RequestSnapshot::get("https://a.test/logo.png").expect("valid url");
/// let decision = router.route(&request, &RuntimeContext::default()).await;
/// if decision.should_fall_back() {
///     // hand the request to the fetch handler
/// }
/// router.drain().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Router {
    rules: RwLock<RuleSet>,
    executor: SourceChainExecutor,
    config: Arc<RouterConfig>,
}

impl Router {
    /// A router with default settings and no rules.
    pub fn new(capabilities: Capabilities) -> Self {
        Self::with_config(capabilities, RouterConfig::default())
    }

    /// A router with the given settings and no rules.
    pub fn with_config(capabilities: Capabilities, config: RouterConfig) -> Self {
        let config = Arc::new(config);
        Self {
            rules: RwLock::new(RuleSet::new()),
            executor: SourceChainExecutor::new(capabilities, Arc::clone(&config)),
            config,
        }
    }

    /// Router settings.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Validate and append a batch of rules, all or nothing.
    ///
    /// # Errors
    ///
    /// See [`RuleSet::add_rules`]. On error no rule is added.
    pub fn add_rules(&self, batch: Vec<Rule>) -> Result<(), ValidationError> {
        let added = batch.len();
        let mut rules = self.rules.write();
        match rules.add_rules(batch, self.config.max_rules) {
            Ok(()) => {
                tracing::debug!(added, total = rules.len(), "rules admitted");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "rule batch rejected");
                Err(error)
            }
        }
    }

    /// Number of admitted rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Returns `true` if no rule has been admitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// Route a request.
    ///
    /// The first rule whose condition holds decides, even if its chain yields
    /// [`Outcome::NoResult`](crate::Outcome::NoResult). No match yields
    /// [`RouteDecision::Unmatched`].
    ///
    /// # Panics
    ///
    /// Must be polled inside a Tokio runtime: races, cache writes and
    /// background steps are spawned as tasks. Dropping the returned future
    /// aborts any race still in flight.
    pub async fn route(&self, request: &RequestSnapshot, context: &RuntimeContext) -> RouteDecision {
        let found = self
            .rules
            .read()
            .find_match(request, context, self.executor.capabilities().patterns.as_ref());
        self.resolve(found, request).await
    }

    /// Route a request and record how the rule was selected.
    ///
    /// # INV: `trace.decision` equals what [`route`](Self::route) returns
    pub async fn route_with_trace(
        &self,
        request: &RequestSnapshot,
        context: &RuntimeContext,
    ) -> RouteTrace {
        let (found, selection) = self.rules.read().explain(
            request,
            context,
            self.executor.capabilities().patterns.as_ref(),
        );
        let decision = self.resolve(found, request).await;
        RouteTrace {
            decision,
            selection,
        }
    }

    /// Trace rule selection without executing any source.
    #[must_use]
    pub fn explain(&self, request: &RequestSnapshot, context: &RuntimeContext) -> MatchTrace {
        self.rules
            .read()
            .explain(
                request,
                context,
                self.executor.capabilities().patterns.as_ref(),
            )
            .1
    }

    /// Wait for background side effects (cache writes, revalidation) to finish.
    ///
    /// Call before tearing the router down.
    pub async fn drain(&self) {
        self.executor.drain().await;
    }

    async fn resolve(
        &self,
        found: Option<(usize, Arc<Rule>)>,
        request: &RequestSnapshot,
    ) -> RouteDecision {
        match found {
            Some((index, rule)) => {
                tracing::debug!(
                    rule = index,
                    steps = rule.source.len(),
                    url = %request.url(),
                    "rule matched"
                );
                RouteDecision::Matched(self.executor.execute(&rule.source, request).await)
            }
            None => {
                tracing::debug!(url = %request.url(), "no rule matched");
                RouteDecision::Unmatched
            }
        }
    }
}

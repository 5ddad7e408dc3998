//! Conformance test fixture runner
//!
//! Loads YAML fixtures and runs them against the router. A fixture declares
//! rules in the serialized rule syntax, scripts the capabilities, and lists
//! cases with the expected decision and, optionally, the cache contents once
//! background work has drained.
//!
//! ```yaml
//! name: stale-while-revalidate
//! description: cached copy is served while the network refreshes it
//! rules:
//!   - condition: { urlPattern: "/**/*.js" }
//!     source:
//!       - { cacheName: A, behavior: continue-discarding-latter }
//!       - { type: network, updatedCacheName: A }
//! network:
//!   "https://a.test/app.js": { status: 200, body: fresh }
//! cache:
//!   A:
//!     "https://a.test/app.js": { status: 200, body: stale }
//! cases:
//!   - name: serves stale
//!     request: { url: "https://a.test/app.js" }
//!     expect: { response: { status: 200, body: stale } }
//!     cache_after:
//!       A:
//!         "https://a.test/app.js": { status: 200, body: fresh }
//! ```

use crate::{Harness, MemoryCacheStorage, ScriptedHandler, ScriptedNetwork};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use swroute::prelude::*;
use swroute::RuleConfig;

/// A complete test fixture
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: Option<RouterConfig>,
    pub rules: Vec<RuleConfig>,
    #[serde(default)]
    pub network: BTreeMap<String, Reply>,
    #[serde(default)]
    pub cache: BTreeMap<String, BTreeMap<String, Reply>>,
    #[serde(default)]
    pub handler: HandlerScript,
    pub cases: Vec<TestCase>,
}

/// A scripted reply: a response, or a network error when `error` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Reply {
    #[serde(default = "ok_status")]
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub delay_ms: u64,
}

fn ok_status() -> u16 {
    200
}

impl Reply {
    fn response(&self) -> Response {
        Response::new(self.status, self.body.clone())
    }
}

/// Fetch handler script. Declines everything not listed.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerScript {
    #[serde(default)]
    pub default: Option<Reply>,
    #[serde(default)]
    pub urls: BTreeMap<String, Reply>,
}

/// The request of a case.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    pub url: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
}

/// The runtime context of a case. Absent fields take their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextSpec {
    #[serde(default)]
    pub rtt_ms: u64,
    #[serde(default)]
    pub now_ms: u64,
    #[serde(default)]
    pub running_status: RunningStatus,
}

/// Expected decision.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Expect {
    /// No rule matched.
    Unmatched,
    /// A rule matched and its chain produced nothing.
    NoResult,
    /// A rule matched and its chain failed on the network.
    NetworkError,
    /// A rule matched and produced this response.
    Response { status: u16, body: String },
}

impl Expect {
    fn of(decision: &RouteDecision) -> Self {
        match decision {
            RouteDecision::Unmatched => Self::Unmatched,
            RouteDecision::Matched(Outcome::NoResult) => Self::NoResult,
            RouteDecision::Matched(Outcome::NetworkError(_)) => Self::NetworkError,
            RouteDecision::Matched(Outcome::Response(r)) => Self::Response {
                status: r.status,
                body: String::from_utf8_lossy(&r.body).into_owned(),
            },
        }
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmatched => f.write_str("unmatched"),
            Self::NoResult => f.write_str("no-result"),
            Self::NetworkError => f.write_str("network-error"),
            Self::Response { status, body } => write!(f, "response({status}, {body:?})"),
        }
    }
}

/// Test case
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    pub name: String,
    pub request: RequestSpec,
    #[serde(default)]
    pub context: ContextSpec,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub expect: Expect,
    /// Cache entries that must hold after background work drains.
    #[serde(default)]
    pub cache_after: BTreeMap<String, BTreeMap<String, Reply>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder: Convert fixture to router inputs
// ═══════════════════════════════════════════════════════════════════════════════

impl Fixture {
    /// Fresh capabilities from the script. Every case gets its own.
    pub fn harness(&self) -> Harness {
        let mut network = ScriptedNetwork::new();
        for (url, reply) in &self.network {
            network = match &reply.error {
                Some(error) => network.fail(url, NetworkError::Failed(error.clone())),
                None => network.respond(url, reply.response()),
            };
            if reply.delay_ms > 0 {
                network = network.delay(url, Duration::from_millis(reply.delay_ms));
            }
        }

        let cache = MemoryCacheStorage::new();
        for (name, entries) in &self.cache {
            for (url, reply) in entries {
                cache.store(name, url, reply.response());
            }
        }

        let mut handler = ScriptedHandler::new();
        if let Some(reply) = &self.handler.default {
            handler = handler.respond_to_all(reply.response());
        }
        for (url, reply) in &self.handler.urls {
            handler = handler.respond(url, reply.response());
        }

        Harness::new()
            .with_network(network)
            .with_cache(cache)
            .with_handler(handler)
    }

    /// Compile the rules.
    ///
    /// # Panics
    ///
    /// Panics if a rule does not compile; a fixture with broken rules is a
    /// broken fixture.
    pub fn rules(&self) -> Vec<Rule> {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                rule.compile()
                    .unwrap_or_else(|e| panic!("fixture '{}' rule {i}: {e}", self.name))
            })
            .collect()
    }
}

impl RequestSpec {
    fn build(&self) -> RequestSnapshot {
        let mut builder = RequestSnapshot::builder(self.url.as_str());
        if let Some(method) = &self.method {
            builder = builder.method(method.as_str());
        }
        if let Some(mode) = &self.mode {
            builder = builder.mode(mode.as_str());
        }
        if let Some(destination) = &self.destination {
            builder = builder.destination(destination.as_str());
        }
        builder
            .build()
            .unwrap_or_else(|e| panic!("bad request url {}: {e}", self.url))
    }
}

impl ContextSpec {
    fn build(&self) -> RuntimeContext {
        RuntimeContext {
            running_status: self.running_status,
            rtt_ms: self.rtt_ms,
            now_ms: self.now_ms,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Runner
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of running a single test case
#[derive(Debug)]
pub struct CaseResult {
    pub case_name: String,
    pub passed: bool,
    pub expected: Expect,
    pub actual: Expect,
    /// Cache entries that did not hold after draining, as `cache/url`.
    pub cache_mismatches: Vec<String>,
}

impl Fixture {
    /// Parse a fixture from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse multiple fixtures from a YAML file with `---` separators
    pub fn from_yaml_multi(yaml: &str) -> Result<Vec<Self>, serde_yaml::Error> {
        let mut fixtures = Vec::new();
        for doc in serde_yaml::Deserializer::from_str(yaml) {
            fixtures.push(Self::deserialize(doc)?);
        }
        Ok(fixtures)
    }

    /// Run all test cases and return results
    pub async fn run(&self) -> Vec<CaseResult> {
        let rules = self.rules();
        let mut results = Vec::with_capacity(self.cases.len());
        for case in &self.cases {
            let harness = self.harness();
            let router = harness.router_with(self.config.clone().unwrap_or_default());
            if let Err(e) = router.add_rules(rules.clone()) {
                panic!("fixture '{}' rules rejected: {e}", self.name);
            }

            let decision = router
                .route(&case.request.build(), &case.context.build())
                .await;
            router.drain().await;

            let actual = Expect::of(&decision);
            let cache_mismatches = case.cache_mismatches(&harness);
            results.push(CaseResult {
                case_name: case.name.clone(),
                passed: actual == case.expect && cache_mismatches.is_empty(),
                expected: case.expect.clone(),
                actual,
                cache_mismatches,
            });
        }
        results
    }

    /// Run all test cases and panic on first failure
    pub async fn run_and_assert(&self) {
        for result in self.run().await {
            assert!(
                result.passed,
                "Fixture '{}' case '{}' failed: expected {}, got {}; cache mismatches: {:?}",
                self.name,
                result.case_name,
                result.expected,
                result.actual,
                result.cache_mismatches
            );
        }
    }
}

impl TestCase {
    fn cache_mismatches(&self, harness: &Harness) -> Vec<String> {
        let mut mismatches = Vec::new();
        for (name, entries) in &self.cache_after {
            for (url, reply) in entries {
                if harness.cache.get(name, url).as_ref() != Some(&reply.response()) {
                    mismatches.push(format!("{name}/{url}"));
                }
            }
        }
        mismatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swroute::HandlerError;

    const SWR: &str = r#"
name: stale-while-revalidate
description: cached copy is served while the network refreshes it
rules:
  - condition: { urlPattern: "/**/*.js" }
    source:
      - { cacheName: A, behavior: continue-discarding-latter }
      - { type: network, updatedCacheName: A }
network:
  "https://a.test/app.js": { status: 200, body: fresh }
cache:
  A:
    "https://a.test/app.js": { status: 200, body: stale }
cases:
  - name: serves stale
    request: { url: "https://a.test/app.js" }
    expect: { response: { status: 200, body: stale } }
    cache_after:
      A:
        "https://a.test/app.js": { status: 200, body: fresh }
  - name: other paths are unmatched
    request: { url: "https://a.test/index.html" }
    expect: unmatched
"#;

    #[test]
    fn test_parse_fixture() {
        let fixture = Fixture::from_yaml(SWR).unwrap();
        assert_eq!(fixture.cases.len(), 2);
        assert_eq!(fixture.rules().len(), 1);
        assert_eq!(fixture.cases[1].expect, Expect::Unmatched);
    }

    #[test]
    fn test_parse_expect_forms() {
        let fixture = Fixture::from_yaml(SWR).unwrap();
        assert_eq!(
            fixture.cases[0].expect,
            Expect::Response {
                status: 200,
                body: "stale".into()
            }
        );

        let yaml = SWR.replace("expect: unmatched", "expect: network_error");
        let fixture = Fixture::from_yaml(&yaml).unwrap();
        assert_eq!(fixture.cases[1].expect, Expect::NetworkError);

        let yaml = SWR.replace("expect: unmatched", "expect: no_result");
        let fixture = Fixture::from_yaml(&yaml).unwrap();
        assert_eq!(fixture.cases[1].expect, Expect::NoResult);
    }

    #[tokio::test]
    async fn test_run_fixture() {
        Fixture::from_yaml(SWR).unwrap().run_and_assert().await;
    }

    #[tokio::test]
    async fn test_failing_case_is_reported() {
        let yaml = SWR.replace("body: stale } }", "body: fresh } }");
        let results = Fixture::from_yaml(&yaml).unwrap().run().await;
        assert!(!results[0].passed);
        assert!(results[1].passed);
    }

    #[test]
    fn test_handler_script_defaults_to_declining() {
        let fixture = Fixture::from_yaml(SWR).unwrap();
        let harness = fixture.harness();
        let req = RequestSnapshot::get("https://a.test/").unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt.block_on(FetchHandler::invoke(harness.handler.as_ref(), &req, None));
        assert_eq!(result, Err(HandlerError::Declined));
    }
}

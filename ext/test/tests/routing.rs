//! End-to-end routing behavior against the in-memory capabilities.

use std::time::Duration;
use swroute::{Behavior, SourceKind};
use swroute_test::prelude::*;

const PAGE: &str = "https://app.test/page";
const APP_JS: &str = "https://app.test/static/app.js";

fn ok(body: &'static str) -> Response {
    Response::new(200, body)
}

fn get(url: &str) -> RequestSnapshot {
    RequestSnapshot::get(url).unwrap()
}

fn body(decision: &RouteDecision) -> Option<String> {
    decision
        .response()
        .map(|r| String::from_utf8_lossy(&r.body).into_owned())
}

#[tokio::test]
async fn rules_are_scanned_in_insertion_order() {
    let harness = Harness::new()
        .with_network(ScriptedNetwork::new().respond(PAGE, ok("network")))
        .with_handler(ScriptedHandler::new().respond_to_all(ok("handler")));
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(Condition::always(), SourceType::FetchEvent)])
        .unwrap();
    router
        .add_rules(vec![Rule::new(Condition::always(), SourceType::Network)])
        .unwrap();

    let decision = router.route(&get(PAGE), &RuntimeContext::default()).await;
    assert_eq!(body(&decision).as_deref(), Some("handler"));
    assert_eq!(harness.network.calls(), 0);
}

#[tokio::test]
async fn static_assets_rule_end_to_end() {
    let harness = Harness::new()
        .with_cache(
            MemoryCacheStorage::new().with_entry("static", "https://app.test/a.css", ok("css")),
        )
        .with_network(ScriptedNetwork::new().respond("https://app.test/b.png", ok("png")));
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(
            Condition::Or(vec![
                Condition::url_pattern("/**/*.png").unwrap(),
                Condition::url_pattern("/**/*.css").unwrap(),
            ]),
            SourceChain::new(vec![SourceStep::cache("static"), SourceStep::network()]),
        )])
        .unwrap();
    let ctx = RuntimeContext::default();

    let css = router.route(&get("https://app.test/a.css"), &ctx).await;
    assert_eq!(body(&css).as_deref(), Some("css"));

    let png = router.route(&get("https://app.test/b.png"), &ctx).await;
    assert_eq!(body(&png).as_deref(), Some("png"));

    let html = router.route(&get("https://app.test/index.html"), &ctx).await;
    assert_eq!(html, RouteDecision::Unmatched);
    assert!(html.should_fall_back());
}

#[tokio::test]
async fn stale_while_revalidate_updates_cache_after_return() {
    let harness = Harness::new()
        .with_cache(MemoryCacheStorage::new().with_entry("A", APP_JS, ok("stale")))
        .with_network(
            ScriptedNetwork::new()
                .respond(APP_JS, ok("fresh"))
                .delay(APP_JS, Duration::from_millis(10)),
        );
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(
            Condition::always(),
            SourceChain::new(vec![
                SourceStep::cache("A").with_behavior(Behavior::ContinueDiscardingLatter),
                SourceStep::network_updating("A"),
            ]),
        )])
        .unwrap();

    let decision = router.route(&get(APP_JS), &RuntimeContext::default()).await;
    assert_eq!(body(&decision).as_deref(), Some("stale"));

    router.drain().await;
    assert_eq!(harness.cache.get("A", APP_JS), Some(ok("fresh")));
    assert_eq!(harness.network.fetched(), vec![APP_JS.to_string()]);

    // the next request sees the refreshed entry
    let decision = router.route(&get(APP_JS), &RuntimeContext::default()).await;
    assert_eq!(body(&decision).as_deref(), Some("fresh"));
    router.drain().await;
}

#[tokio::test(start_paused = true)]
async fn race_network_and_cache_cases() {
    let rule = || Rule::new(Condition::always(), SourceType::RaceNetworkAndCache);
    let ctx = RuntimeContext::default();

    // network 200 arrives after a stored 404
    let harness = Harness::new()
        .with_cache(MemoryCacheStorage::new().with_entry("default", PAGE, Response::new(404, "")))
        .with_network(
            ScriptedNetwork::new()
                .respond(PAGE, ok("network"))
                .delay(PAGE, Duration::from_millis(30)),
        );
    let router = harness.router();
    router.add_rules(vec![rule()]).unwrap();
    assert_eq!(
        body(&router.route(&get(PAGE), &ctx).await).as_deref(),
        Some("network")
    );

    // network fails, cache has a 200
    let harness = Harness::new()
        .with_cache(MemoryCacheStorage::new().with_entry("default", PAGE, ok("cached")))
        .with_network(ScriptedNetwork::new().fail(PAGE, NetworkError::Failed("offline".into())));
    let router = harness.router();
    router.add_rules(vec![rule()]).unwrap();
    assert_eq!(
        body(&router.route(&get(PAGE), &ctx).await).as_deref(),
        Some("cached")
    );

    // both fail
    let harness = Harness::new();
    let router = harness.router();
    router.add_rules(vec![rule()]).unwrap();
    assert!(matches!(
        router.route(&get(PAGE), &ctx).await,
        RouteDecision::Matched(Outcome::NetworkError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn race_loser_does_not_block_outcome() {
    let harness = Harness::new()
        .with_cache(
            MemoryCacheStorage::new()
                .with_entry("default", PAGE, ok("cached"))
                .with_delay(Duration::from_millis(1)),
        )
        .with_network(
            ScriptedNetwork::new()
                .respond(PAGE, ok("network"))
                .delay(PAGE, Duration::from_secs(60)),
        );
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(
            Condition::always(),
            SourceType::RaceNetworkAndCache,
        )])
        .unwrap();

    let started = tokio::time::Instant::now();
    let decision = router.route(&get(PAGE), &RuntimeContext::default()).await;
    assert_eq!(body(&decision).as_deref(), Some("cached"));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn add_rules_is_all_or_nothing() {
    let router = Harness::new().router();
    router
        .add_rules(vec![Rule::new(Condition::always(), SourceType::Network)])
        .unwrap();

    let err = router
        .add_rules(vec![
            Rule::new(Condition::method("GET"), SourceType::Network),
            Rule::new(Condition::always(), SourceChain::new(vec![])),
        ])
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::Rule {
            index: 1,
            source: Box::new(ValidationError::EmptySourceChain),
        }
    );
    assert_eq!(router.len(), 1);
}

#[tokio::test]
async fn network_error_does_not_fall_back() {
    let harness = Harness::new()
        .with_network(ScriptedNetwork::new().fail(PAGE, NetworkError::Failed("offline".into())))
        .with_handler(ScriptedHandler::new().respond_to_all(ok("handler")));
    let router = harness.router();
    router
        .add_rules(vec![
            Rule::new(Condition::always(), SourceType::Network),
            Rule::new(Condition::always(), SourceType::FetchEvent),
        ])
        .unwrap();

    let decision = router.route(&get(PAGE), &RuntimeContext::default()).await;
    assert!(!decision.should_fall_back());
    assert!(harness.handler.invocations().is_empty());
}

#[tokio::test]
async fn callback_id_reaches_handler() {
    let harness =
        Harness::new().with_handler(ScriptedHandler::new().respond_to_all(ok("handler")));
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(
            Condition::always(),
            SourceStep::new(SourceKind::FetchHandler {
                callback_id: Some("router".into()),
            }),
        )])
        .unwrap();

    router.route(&get(PAGE), &RuntimeContext::default()).await;
    assert_eq!(
        harness.handler.invocations(),
        vec![(PAGE.to_string(), Some("router".to_string()))]
    );
}

#[tokio::test]
async fn rejected_cache_write_is_invisible_to_caller() {
    let harness = Harness::new()
        .with_cache(MemoryCacheStorage::new().rejecting_writes())
        .with_network(ScriptedNetwork::new().respond(PAGE, ok("network")));
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(
            Condition::always(),
            SourceStep::network_updating("pages"),
        )])
        .unwrap();

    let decision = router.route(&get(PAGE), &RuntimeContext::default()).await;
    assert_eq!(body(&decision).as_deref(), Some("network"));
    router.drain().await;
    assert_eq!(harness.cache.get("pages", PAGE), None);
}

#[tokio::test]
async fn declined_handler_is_no_result() {
    let harness = Harness::new();
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(Condition::always(), SourceType::FetchEvent)])
        .unwrap();
    let decision = router.route(&get(PAGE), &RuntimeContext::default()).await;
    assert_eq!(decision, RouteDecision::Matched(Outcome::NoResult));
    assert!(decision.should_fall_back());
    assert_eq!(harness.handler.invocations().len(), 1);
}

#[tokio::test]
async fn context_from_probe() {
    let harness = Harness::new().with_handler(ScriptedHandler::new().respond_to_all(ok("handler")));
    let router = harness.router();
    router
        .add_rules(vec![Rule::new(
            Condition::running_status(RunningStatus::Running),
            SourceType::FetchEvent,
        )])
        .unwrap();

    let probe = FixedProbe {
        running_status: RunningStatus::NotRunning,
        ..FixedProbe::default()
    };
    let decision = router
        .route(&get(PAGE), &RuntimeContext::capture(&probe))
        .await;
    assert_eq!(decision, RouteDecision::Unmatched);
}

#[tokio::test]
async fn concurrent_routes_share_the_rule_set() {
    let harness = Harness::new().with_network(
        ScriptedNetwork::new()
            .respond(PAGE, ok("network"))
            .delay(PAGE, Duration::from_millis(5)),
    );
    let router = std::sync::Arc::new(harness.router());
    router
        .add_rules(vec![Rule::new(Condition::always(), SourceType::Network)])
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let router = std::sync::Arc::clone(&router);
            tokio::spawn(async move {
                router
                    .route(&RequestSnapshot::get(PAGE).unwrap(), &RuntimeContext::default())
                    .await
            })
        })
        .collect();
    for task in tasks {
        let decision = task.await.unwrap();
        assert_eq!(body(&decision).as_deref(), Some("network"));
    }
    assert_eq!(harness.network.calls(), 8);
}

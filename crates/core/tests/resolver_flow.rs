//! End-to-end resolution through the async resolver against a scripted catalog.

mod common;

use std::sync::Arc;

use futures::future::join_all;

use metaresolve_core::catalog::TransportResponse;
use metaresolve_core::testing::fixtures;
use metaresolve_core::{MediaType, PerformanceMonitor, Resolution, StrategyKind};

#[tokio::test]
async fn test_confident_first_round_issues_one_search() {
    let (resolver, transport) = common::resolver();
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[
            fixtures::tv_json(1429, "Attack on Titan", "2023-11-05"),
            fixtures::movie_json(597, "Titanic", "1997-11-18"),
        ])),
    );

    let resolution = resolver
        .resolve("Attack on Titan (2023)", Some(2023), Some("en-US"))
        .await
        .unwrap();

    let found = resolution.found().expect("match");
    assert!(!found.needs_selection);
    assert_eq!(found.candidates.len(), 1);
    assert_eq!(found.candidates[0].id, 1429);
    assert!(found.candidates[0].quality_score >= 0.85);
    assert_eq!(found.strategy, Some(StrategyKind::ExactWithYear));
    assert_eq!(transport.call_count(), 1);

    let request = &transport.requests()[0];
    assert_eq!(request.path, "/search/multi");
    assert_eq!(request.param_value("year"), Some("2023"));
    assert_eq!(request.param_value("api_key"), Some(fixtures::API_KEY));
}

#[tokio::test]
async fn test_cleaned_title_round_after_two_misses() {
    let (resolver, transport) = common::resolver();
    // Year disagrees with the hint, so only the cleaned title scores well enough.
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(
            1429,
            "Shingeki no Kyojin",
            "2009-04-07",
        )])),
    );

    let resolution = resolver
        .resolve("[SubsPlease] Shingeki no Kyojin - 05 (1080p)", Some(2013), None)
        .await
        .unwrap();

    let found = resolution.found().expect("match");
    assert_eq!(found.strategy, Some(StrategyKind::CleanedTitle));
    assert!(!found.needs_selection);
    assert_eq!(found.searches, 3);
    assert_eq!(found.candidates[0].fallback_round, 2);
    assert_eq!(transport.call_count(), 3);

    let queries: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.param_value("query").unwrap_or_default().to_string())
        .collect();
    assert_eq!(queries[2], "Shingeki no Kyojin");
    assert_eq!(transport.requests()[1].param_value("year"), None);
}

#[tokio::test]
async fn test_identical_resolves_hit_the_network_once() {
    let (resolver, transport) = common::resolver();
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(
            209867,
            "Frieren: Beyond Journey's End",
            "2023-09-29",
        )])),
    );

    let first = resolver
        .resolve("Frieren: Beyond Journey's End", Some(2023), None)
        .await
        .unwrap();
    let second = resolver
        .resolve("Frieren: Beyond Journey's End", Some(2023), None)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(transport.call_count(), 1);
    let cache = resolver.cache_stats();
    assert_eq!(cache.hits, 1);
    assert_eq!(cache.misses, 1);
}

#[tokio::test]
async fn test_partial_matches_need_selection() {
    let (resolver, transport) = common::resolver();
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[
            fixtures::tv_json(1, "Attack on Titan Junior High", "2015-10-04"),
            fixtures::tv_json(2, "Attack on Titan: Lost Girls", "2017-12-08"),
            fixtures::movie_json(3, "Pacific Rim", "2013-07-11"),
        ])),
    );

    let resolution = resolver.resolve("Attack on Titan", None, None).await.unwrap();

    let found = resolution.found().expect("fallback set");
    assert!(found.needs_selection);
    assert_eq!(found.strategy, None);
    let ids: Vec<u64> = found.candidates.iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&1) && ids.contains(&2));
}

#[tokio::test]
async fn test_nothing_above_floor_is_not_found() {
    let (resolver, transport) = common::resolver();
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::movie_json(
            11,
            "Completely Different",
            "1990-01-01",
        )])),
    );

    let resolution = resolver.resolve("Frieren", Some(2023), None).await.unwrap();

    // The cleaned title equals the exact title, so only two rounds run.
    assert!(matches!(resolution, Resolution::NotFound { searches: 2 }));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_cache_only_mode_serves_cached_and_skips_network() {
    let (resolver, transport) = common::resolver();
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(
            30991,
            "Cowboy Bebop",
            "1998-04-03",
        )])),
    );

    resolver.set_cache_only_mode(true);
    let offline = resolver.resolve("Cowboy Bebop", Some(1998), None).await.unwrap();
    assert!(!offline.is_found());
    assert_eq!(transport.call_count(), 0);

    resolver.set_cache_only_mode(false);
    let online = resolver.resolve("Cowboy Bebop", Some(1998), None).await.unwrap();
    assert!(online.is_found());
    assert_eq!(transport.call_count(), 1);

    resolver.set_cache_only_mode(true);
    let cached = resolver.resolve("Cowboy Bebop", Some(1998), None).await.unwrap();
    assert_eq!(cached, online);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_and_counted() {
    let (resolver, transport) = common::resolver();
    transport.push_response(TransportResponse::status(503));
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(
            30991,
            "Cowboy Bebop",
            "1998-04-03",
        )])),
    );

    let resolution = resolver.resolve("Cowboy Bebop", Some(1998), None).await.unwrap();
    assert!(resolution.is_found());

    let stats = resolver.retry_stats();
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.retried_requests, 1);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 0);
}

#[tokio::test]
async fn test_concurrent_resolves_stay_within_pool_capacity() {
    let mut config = fixtures::config();
    config.pool.initial_size = 1;
    config.pool.max_size = 2;
    let (resolver, transport) = common::resolver_with(config);
    transport.set_latency(std::time::Duration::from_millis(5));
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(
            30991,
            "Cowboy Bebop",
            "1998-04-03",
        )])),
    );
    let resolver = Arc::new(resolver);

    let titles = ["Cowboy Bebop", "Cowboy Bebop 1998", "Cowboy Bebop (1998)", "[G] Cowboy Bebop"];
    let calls = titles.iter().map(|title| {
        let resolver = Arc::clone(&resolver);
        async move { resolver.resolve(title, Some(1998), None).await }
    });
    for result in join_all(calls).await {
        assert!(result.unwrap().is_found());
    }

    let stats = resolver.pool_stats();
    assert!(stats.clients_created <= 2);
    assert_eq!(stats.active_clients, 0);
    assert_eq!(
        stats.idle_clients as u64,
        stats.clients_created - stats.clients_destroyed
    );
    assert!(resolver.health_check().stats.total_requests >= 4);
}

#[tokio::test]
async fn test_monitor_records_operations() {
    let (resolver, transport) = common::resolver();
    transport.respond(
        "/search",
        TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(
            1429,
            "Attack on Titan",
            "2013-04-07",
        )])),
    );
    transport.respond(
        "/tv/",
        TransportResponse::ok(fixtures::details_body(1429, "Attack on Titan", "Titans.")),
    );
    let monitor = Arc::new(PerformanceMonitor::new(16));
    let resolver = resolver.with_monitor(Arc::clone(&monitor));

    resolver.resolve("Attack on Titan", Some(2013), None).await.unwrap();
    let record = resolver
        .fetch_details(1429, MediaType::Tv, None)
        .await
        .unwrap()
        .expect("details");
    assert_eq!(record.translations, vec!["en", "ja"]);
    assert_eq!(record.runtime_minutes, Some(24));

    let names: Vec<String> = monitor.summary().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["fetch_details", "resolve"]);
    // The warm client was reused, nothing new was built.
    assert!(monitor.samples().iter().all(|s| s.clients_created_delta == Some(0)));
}

#[tokio::test]
async fn test_sanitized_config_hides_key() {
    let (resolver, _transport) = common::resolver();
    let rendered = serde_json::to_string(&resolver.sanitized_config()).unwrap();
    assert!(!rendered.contains(fixtures::API_KEY));
    assert!(rendered.contains("012345****cdef"));
}

//! Integration tests for the HTTP probe engine.
//!
//! These verify validation semantics (status allow-lists, content
//! matching), error tagging, redirect handling and the
//! zero-when-skipped contract for phase timings.

mod helpers;

use std::time::Duration;

use helpers::{test_endpoint, with_content_match, with_status_codes};
use vigil::probe::Checker;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn passing_check_populates_timings() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = test_endpoint("e1", &format!("{}/health", server.uri()));
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(result.success, "unexpected failure: {}", result.error);
    assert!(result.error.is_empty());
    assert_eq!(result.status_code, 200);
    assert_eq!(result.bytes_received, 2);
    assert!(result.duration > Duration::ZERO);
    assert!(result.ttfb > Duration::ZERO);
    assert!(result.connect_duration > Duration::ZERO);
    // The mock server is reached by IP literal: no DNS phase. Plain
    // HTTP: no TLS phase.
    assert_eq!(result.dns_duration, Duration::ZERO);
    assert_eq!(result.tls_duration, Duration::ZERO);
    assert!(result.cert_issuer.is_empty());
    assert!(result.cert_not_after.is_none());
}

#[tokio::test]
async fn reused_connection_skips_dial_phases() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = test_endpoint("e1", &server.uri());

    let first = checker.check(&endpoint, Duration::from_secs(5)).await;
    assert!(first.success, "{}", first.error);
    assert!(first.connect_duration > Duration::ZERO);

    let second = checker.check(&endpoint, Duration::from_secs(5)).await;
    assert!(second.success, "{}", second.error);
    assert_eq!(
        second.connect_duration,
        Duration::ZERO,
        "second probe should reuse the pooled connection"
    );
    assert!(second.ttfb > Duration::ZERO);
}

#[tokio::test]
async fn status_allow_list_accepts_teapot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(418))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = with_status_codes(test_endpoint("e1", &server.uri()), &[418]);
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(result.success, "{}", result.error);
    assert_eq!(result.status_code, 418);
}

#[tokio::test]
async fn default_accept_range_rejects_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = test_endpoint("e1", &server.uri());
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(!result.success);
    assert_eq!(result.error, "status code validation failed");
    assert_eq!(result.status_code, 500);
    // Partial timings captured before the failure are retained.
    assert!(result.duration > Duration::ZERO);
    assert!(result.connect_duration > Duration::ZERO);
}

#[tokio::test]
async fn regex_mismatch_is_a_check_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok\n"))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = with_content_match(test_endpoint("e1", &server.uri()), "regex", "^OK$");
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(!result.success);
    assert_eq!(result.error, "content regex match failed");
}

#[tokio::test]
async fn invalid_regex_is_a_check_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body"))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = with_content_match(test_endpoint("e1", &server.uri()), "regex", "[unclosed");
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(!result.success);
    assert!(
        result.error.starts_with("invalid regex"),
        "unexpected error: {}",
        result.error
    );
}

#[tokio::test]
async fn non_regex_match_type_means_substring() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("service is healthy today"))
        .mount(&server)
        .await;

    let checker = Checker::new();

    let hit = with_content_match(test_endpoint("e1", &server.uri()), "exact", "healthy");
    let result = checker.check(&hit, Duration::from_secs(5)).await;
    assert!(result.success, "{}", result.error);

    let miss = with_content_match(test_endpoint("e1", &server.uri()), "", "degraded");
    let result = checker.check(&miss, Duration::from_secs(5)).await;
    assert!(!result.success);
    assert_eq!(result.error, "content string match failed");
}

#[tokio::test]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = test_endpoint("e1", &server.uri());
    let result = checker.check(&endpoint, Duration::from_millis(200)).await;

    assert!(!result.success);
    assert_eq!(result.error, "timeout");
    assert!(result.duration >= Duration::from_millis(200));
}

#[tokio::test]
async fn redirects_are_followed_to_the_final_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("arrived"))
        .mount(&server)
        .await;

    let checker = Checker::new();
    let endpoint = test_endpoint("e1", &format!("{}/old", server.uri()));
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(result.success, "{}", result.error);
    assert_eq!(result.status_code, 200);
    assert_eq!(result.bytes_received, "arrived".len() as u64);
    // The reported URL stays the configured one.
    assert_eq!(result.url, format!("{}/old", server.uri()));
}

#[tokio::test]
async fn redirect_chase_stops_after_ten_hops() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&server)
        .await;

    let checker = Checker::new();
    // Beyond the cap the last response is returned without error, so an
    // allow-list for 302 turns the capped chase into a pass.
    let endpoint = with_status_codes(
        test_endpoint("e1", &format!("{}/loop", server.uri())),
        &[302],
    );
    let result = checker.check(&endpoint, Duration::from_secs(10)).await;

    assert!(result.success, "{}", result.error);
    assert_eq!(result.status_code, 302);
}

#[tokio::test]
async fn connection_refused_is_tagged_connect() {
    let checker = Checker::new();
    // Port 1 is essentially never listening.
    let endpoint = test_endpoint("e1", "http://127.0.0.1:1/");
    let result = checker.check(&endpoint, Duration::from_secs(5)).await;

    assert!(!result.success);
    assert!(
        result.error.contains("connect"),
        "unexpected error: {}",
        result.error
    );
}

#[tokio::test]
async fn every_result_upholds_the_success_error_invariant() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let checker = Checker::new();
    for endpoint in [
        test_endpoint("ok", &server.uri()),
        with_status_codes(test_endpoint("bad-status", &server.uri()), &[200]),
        test_endpoint("refused", "http://127.0.0.1:1/"),
    ] {
        let result = checker.check(&endpoint, Duration::from_secs(5)).await;
        assert_eq!(
            result.success,
            result.error.is_empty(),
            "endpoint {}: success={} error={:?}",
            endpoint.id,
            result.success,
            result.error
        );
    }
}

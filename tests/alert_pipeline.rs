//! Integration tests for alert evaluation and delivery.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use helpers::{manager_from, test_endpoint};
use vigil::alerting::{AlertEvaluator, Provider, SendError, WebhookProvider};
use vigil::config::{AlertChannel, AlertRule, EndpointConfig};
use vigil::probe::ProbeResult;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct CountingProvider {
    sent: AtomicUsize,
}

impl CountingProvider {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: AtomicUsize::new(0),
        })
    }

    fn count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for CountingProvider {
    async fn send(
        &self,
        _channel: &AlertChannel,
        _rule: &AlertRule,
        _endpoint: &EndpointConfig,
        _result: &ProbeResult,
    ) -> Result<(), SendError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const ALERTING_CONFIG: &str = r#"
endpoints: []
alert_channels:
  - name: test-webhook
    type: webhook
    url: http://localhost/hook
alert_rules:
  - name: Production Down
    condition: success == false
    channels: [test-webhook]
    tags:
      env: prod
"#;

fn prod_endpoint() -> EndpointConfig {
    let mut endpoint = test_endpoint("ep1", "http://example.invalid");
    endpoint
        .tags
        .insert("env".to_string(), "prod".to_string());
    endpoint
}

fn result_with(success: bool) -> ProbeResult {
    let mut result = ProbeResult::new(&prod_endpoint());
    result.success = success;
    if !success {
        result.error = "status code validation failed".to_string();
    }
    result
}

async fn settle() {
    // Deliveries run on detached tasks; give them a beat to land.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Fire once, stay silent while firing, resolve, then re-fire exactly
/// once.
#[tokio::test]
async fn fire_resolve_refire_notifies_on_edges_only() {
    let (manager, _file) = manager_from(ALERTING_CONFIG);
    let evaluator = Arc::new(AlertEvaluator::new(manager));
    let provider = CountingProvider::new();
    evaluator.register_provider("webhook", provider.clone());

    let endpoint = prod_endpoint();

    evaluator.evaluate(&endpoint, &result_with(false));
    settle().await;
    assert_eq!(provider.count(), 1, "first failure fires");
    assert!(evaluator.is_firing("ep1", "Production Down"));

    evaluator.evaluate(&endpoint, &result_with(false));
    settle().await;
    assert_eq!(provider.count(), 1, "repeat failure must not re-notify");

    evaluator.evaluate(&endpoint, &result_with(true));
    settle().await;
    assert_eq!(provider.count(), 1, "resolve is not notified");
    assert!(!evaluator.is_firing("ep1", "Production Down"));

    evaluator.evaluate(&endpoint, &result_with(false));
    settle().await;
    assert_eq!(provider.count(), 2, "failure after resolve re-fires once");
}

/// A selector key the endpoint lacks makes evaluation a no-op: no state
/// change and no notification.
#[tokio::test]
async fn tag_mismatch_gates_the_whole_evaluation() {
    let (manager, _file) = manager_from(ALERTING_CONFIG);
    let evaluator = Arc::new(AlertEvaluator::new(manager));
    let provider = CountingProvider::new();
    evaluator.register_provider("webhook", provider.clone());

    let mut dev_endpoint = test_endpoint("ep2", "http://example.invalid");
    dev_endpoint
        .tags
        .insert("env".to_string(), "dev".to_string());

    let mut result = ProbeResult::new(&dev_endpoint);
    result.success = false;
    result.error = "timeout".to_string();

    evaluator.evaluate(&dev_endpoint, &result);
    settle().await;
    assert_eq!(provider.count(), 0);
    assert!(!evaluator.is_firing("ep2", "Production Down"));

    // Untagged endpoint: same story.
    let bare = test_endpoint("ep3", "http://example.invalid");
    evaluator.evaluate(&bare, &result_with(false));
    settle().await;
    assert_eq!(provider.count(), 0);
}

/// Unknown channels and unregistered provider types are skipped without
/// affecting the state transition.
#[tokio::test]
async fn missing_channel_does_not_block_the_transition() {
    let (manager, _file) = manager_from(
        r#"
alert_rules:
  - name: Down
    condition: success == false
    channels: [no-such-channel]
"#,
    );
    let evaluator = Arc::new(AlertEvaluator::new(manager));

    let endpoint = test_endpoint("ep1", "http://example.invalid");
    evaluator.evaluate(&endpoint, &result_with(false));
    settle().await;
    assert!(evaluator.is_firing("ep1", "Down"));
}

#[tokio::test]
async fn webhook_provider_renders_template_and_posts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("content-type", "application/json"))
        .and(header("x-token", "s3cret"))
        .and(body_string_contains("\"endpoint\":\"Checkout\""))
        .and(body_string_contains("\"severity\":\"critical\""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let channel = AlertChannel {
        name: "ops".to_string(),
        channel_type: "webhook".to_string(),
        url: format!("{}/hook", server.uri()),
        headers: [("X-Token".to_string(), "s3cret".to_string())].into(),
        body: r#"{"endpoint":"{{ endpoint.name }}","severity":"{{ rule.severity }}","error":"{{ result.error }}"}"#
            .to_string(),
    };
    let rule = AlertRule {
        name: "Down".to_string(),
        condition: "success == false".to_string(),
        severity: "critical".to_string(),
        channels: vec!["ops".to_string()],
        ..Default::default()
    };
    let mut endpoint = test_endpoint("ep1", "http://example.invalid");
    endpoint.name = "Checkout".to_string();
    let result = result_with(false);

    let provider = WebhookProvider::new();
    provider
        .send(&channel, &rule, &endpoint, &result)
        .await
        .expect("webhook delivery failed");
}

#[tokio::test]
async fn webhook_provider_treats_error_status_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let channel = AlertChannel {
        name: "ops".to_string(),
        channel_type: "webhook".to_string(),
        url: server.uri(),
        body: "{}".to_string(),
        ..Default::default()
    };
    let rule = AlertRule::default();
    let endpoint = test_endpoint("ep1", "http://example.invalid");

    let provider = WebhookProvider::new();
    let err = provider
        .send(&channel, &rule, &endpoint, &result_with(false))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Status(500)));
}

//! Generic webhook provider.
//!
//! Renders the channel's body template with `endpoint`, `rule` and
//! `result` in scope and POSTs it to the channel URL. Any response
//! status of 400 or above counts as a delivery failure.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tera::Tera;

use crate::config::{AlertChannel, AlertRule, EndpointConfig};
use crate::probe::ProbeResult;

use super::provider::{Provider, SendError};

const BODY_TEMPLATE: &str = "body";

pub struct WebhookProvider {
    client: reqwest::Client,
    /// Compiled template per channel, invalidated when the body changes.
    templates: Mutex<HashMap<String, (String, Tera)>>,
}

impl WebhookProvider {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            templates: Mutex::new(HashMap::new()),
        }
    }

    fn render(&self, channel: &AlertChannel, context: &tera::Context) -> Result<String, SendError> {
        let mut templates = self
            .templates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let cached = templates.get(&channel.name);
        if !matches!(cached, Some((body, _)) if *body == channel.body) {
            let mut tera = Tera::default();
            tera.autoescape_on(vec![]);
            tera.add_raw_template(BODY_TEMPLATE, &channel.body)
                .map_err(|e| SendError::Template(e.to_string()))?;
            templates.insert(channel.name.clone(), (channel.body.clone(), tera));
        }

        let (_, tera) = templates
            .get(&channel.name)
            .ok_or_else(|| SendError::Template("template cache miss".to_string()))?;
        tera.render(BODY_TEMPLATE, context)
            .map_err(|e| SendError::Template(e.to_string()))
    }
}

impl Default for WebhookProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for WebhookProvider {
    async fn send(
        &self,
        channel: &AlertChannel,
        rule: &AlertRule,
        endpoint: &EndpointConfig,
        result: &ProbeResult,
    ) -> Result<(), SendError> {
        if channel.url.is_empty() {
            return Err(SendError::InvalidConfig(format!(
                "channel '{}' has no url",
                channel.name
            )));
        }

        let mut context = tera::Context::new();
        context.insert("endpoint", endpoint);
        context.insert("rule", rule);
        context.insert("result", result);
        let body = self.render(channel, &context)?;

        let mut request = self.client.post(&channel.url);
        for (name, value) in &channel.headers {
            request = request.header(name, value);
        }
        if !channel
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            request = request.header(CONTENT_TYPE, "application/json");
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(SendError::Status(status.as_u16()));
        }
        Ok(())
    }
}

//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use vigil::config::{ConfigManager, ContentMatch, EndpointConfig, ValidationConfig};

pub fn test_endpoint(id: &str, url: &str) -> EndpointConfig {
    EndpointConfig {
        id: id.to_string(),
        name: format!("Test {id}"),
        url: url.to_string(),
        method: "GET".to_string(),
        ..Default::default()
    }
}

pub fn with_status_codes(mut endpoint: EndpointConfig, codes: &[u16]) -> EndpointConfig {
    endpoint.validation.status_codes = codes.to_vec();
    endpoint
}

pub fn with_content_match(
    mut endpoint: EndpointConfig,
    match_type: &str,
    pattern: &str,
) -> EndpointConfig {
    endpoint.validation = ValidationConfig {
        status_codes: endpoint.validation.status_codes,
        content_match: ContentMatch {
            match_type: match_type.to_string(),
            pattern: pattern.to_string(),
        },
    };
    endpoint
}

/// Write `contents` to a fresh temp config file and load a manager from
/// it. The file handle must be kept alive for the manager's lifetime.
pub fn manager_from(contents: &str) -> (Arc<ConfigManager>, tempfile::NamedTempFile) {
    let file = tempfile::Builder::new()
        .prefix("vigil-test-")
        .suffix(".yml")
        .tempfile()
        .expect("create temp config");
    std::fs::write(file.path(), contents).expect("write temp config");
    let manager = ConfigManager::load(file.path()).expect("load config");
    (manager, file)
}

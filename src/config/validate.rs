//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Matrix
    if config.matrix.as_access_token.is_empty() {
        errors.push("matrix.as_access_token is required".to_string());
    }
    if !is_http_url(&config.matrix.homeserver_url) {
        errors.push(format!(
            "matrix.homeserver_url must be an http(s) URL (got '{}')",
            config.matrix.homeserver_url
        ));
    }
    if let Some(ref media) = config.matrix.media_base_url {
        if !is_http_url(media) {
            errors.push(format!(
                "matrix.media_base_url must be an http(s) URL (got '{}')",
                media
            ));
        }
    }
    if config.matrix.homeserver_name.is_empty() {
        errors.push("matrix.homeserver_name is required".to_string());
    }

    // Bridge
    if !config.bridge.user_prefix.starts_with('@') {
        errors.push(format!(
            "bridge.user_prefix must start with '@' (got '{}')",
            config.bridge.user_prefix
        ));
    }
    if config.bridge.database.is_empty() {
        errors.push("bridge.database is required".to_string());
    }
    if config.bridge.echo_retention_secs == Some(0) {
        errors.push("bridge.echo_retention_secs must be non-zero".to_string());
    }

    // Slack
    if !is_http_url(&config.slack.api_url) {
        errors.push(format!(
            "slack.api_url must be an http(s) URL (got '{}')",
            config.slack.api_url
        ));
    }

    // Room links must form a bijection
    let mut channels = HashSet::new();
    let mut rooms = HashSet::new();
    for (i, link) in config.links.iter().enumerate() {
        if link.slack.is_empty() {
            errors.push(format!("links[{}].slack is required", i));
        }
        if link.matrix.is_empty() {
            errors.push(format!("links[{}].matrix is required", i));
        }
        if !channels.insert(link.slack.as_str()) {
            errors.push(format!(
                "links[{}].slack '{}' is linked more than once",
                i, link.slack
            ));
        }
        if !rooms.insert(link.matrix.as_str()) {
            errors.push(format!(
                "links[{}].matrix '{}' is linked more than once",
                i, link.matrix
            ));
        }
    }

    for (i, user) in config.users.iter().enumerate() {
        if user.slack_user.is_empty() || user.slack_token.is_empty() {
            errors.push(format!("users[{}] needs slack_user and slack_token", i));
        }
        if user.matrix_user.is_empty() || user.matrix_token.is_empty() {
            errors.push(format!("users[{}] needs matrix_user and matrix_token", i));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

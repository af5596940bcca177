//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `SLACKBRIDGE_MATRIX_AS_TOKEN` - Matrix application service token
//! - `SLACKBRIDGE_HOMESERVER_URL` - Matrix homeserver base URL
//! - `SLACKBRIDGE_DATABASE` - SQLite database path
//! - `SLACKBRIDGE_CONFIG` - Config file path

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "SLACKBRIDGE";

/// Apply environment variable overrides to a config.
///
/// This allows secrets like the application service token to be
/// provided via environment variables instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_MATRIX_AS_TOKEN", ENV_PREFIX)) {
        config.matrix.as_access_token = token;
    }
    if let Ok(url) = env::var(format!("{}_HOMESERVER_URL", ENV_PREFIX)) {
        config.matrix.homeserver_url = url;
    }
    if let Ok(path) = env::var(format!("{}_DATABASE", ENV_PREFIX)) {
        config.bridge.database = path;
    }

    config
}

/// Get the config file path from environment or use default.
///
/// Checks `SLACKBRIDGE_CONFIG` environment variable, otherwise returns "slackbridge.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "slackbridge.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_test_config() -> Config {
        Config {
            bridge: BridgeConfig::default(),
            matrix: MatrixConfig {
                homeserver_url: "https://matrix.example.org".to_string(),
                homeserver_name: "example.org".to_string(),
                as_access_token: "original_token".to_string(),
                media_base_url: None,
            },
            slack: SlackConfig::default(),
            links: Vec::new(),
            users: Vec::new(),
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "SLACKBRIDGE");
    }

    #[test]
    fn test_env_overrides() {
        env::remove_var("SLACKBRIDGE_HOMESERVER_URL");
        env::set_var("SLACKBRIDGE_MATRIX_AS_TOKEN", "from_env");
        env::set_var("SLACKBRIDGE_DATABASE", "/tmp/override.db");

        let result = apply_env_overrides(make_test_config());

        env::remove_var("SLACKBRIDGE_MATRIX_AS_TOKEN");
        env::remove_var("SLACKBRIDGE_DATABASE");

        assert_eq!(result.matrix.as_access_token, "from_env");
        assert_eq!(result.bridge.database, "/tmp/override.db");
        assert_eq!(result.matrix.homeserver_url, "https://matrix.example.org");
    }
}

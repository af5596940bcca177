//! Configuration file parsing (HOCON format).

use std::path::Path;

use hocon::HoconLoader;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Load configuration from a HOCON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    HoconLoader::new()
        .load_file(path)
        .map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

/// Load configuration from a HOCON string.
#[allow(dead_code)]
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?
        .resolve()
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = load_config_str(
            r#"
            matrix {
              homeserver_url = "https://matrix.example.org"
              homeserver_name = "example.org"
              as_access_token = "as_token"
            }
            "#,
        )
        .unwrap();

        assert_eq!(config.bridge.database, "slackbridge.db");
        assert_eq!(config.bridge.user_prefix, "@slack_");
        assert_eq!(config.bridge.echo_retention_secs, None);
        assert_eq!(config.slack.api_url, "https://slack.com/api");
        assert!(config.links.is_empty());
        assert!(config.users.is_empty());
        assert_eq!(config.matrix.media_base_url(), "https://matrix.example.org");
    }

    #[test]
    fn test_full_config() {
        let config = load_config_str(
            r#"
            bridge {
              database = "/var/lib/slackbridge/bridge.db"
              user_prefix = "@prefix_"
              echo_retention_secs = 600
            }
            matrix {
              homeserver_url = "https://my.server"
              homeserver_name = "my.server"
              as_access_token = "abc123"
              media_base_url = "https://media.my.server/"
            }
            links = [
              { slack = "CANTINA", matrix = "!abc123:my.server" }
            ]
            users = [
              { slack_user = "U34", slack_token = "xoxp-1", matrix_user = "@nancy:my.server", matrix_token = "mt" }
            ]
            "#,
        )
        .unwrap();

        assert_eq!(config.bridge.user_prefix, "@prefix_");
        assert_eq!(config.bridge.echo_retention_secs, Some(600));
        assert_eq!(config.matrix.media_base_url(), "https://media.my.server");
        assert_eq!(config.links.len(), 1);
        assert_eq!(config.links[0].slack, "CANTINA");
        assert_eq!(config.users[0].matrix_user, "@nancy:my.server");
    }

    #[test]
    fn test_missing_matrix_section_fails() {
        let result = load_config_str("bridge { user_prefix = \"@x_\" }");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }
}

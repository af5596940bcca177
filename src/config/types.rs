//! Configuration type definitions.

use serde::Deserialize;

/// Default SQLite database file.
pub const DEFAULT_DATABASE: &str = "slackbridge.db";

/// Default ghost user id prefix.
pub const DEFAULT_USER_PREFIX: &str = "@slack_";

/// Default Slack Web API base URL.
pub const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    pub matrix: MatrixConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    /// Administrative room links applied at startup.
    #[serde(default)]
    pub links: Vec<RoomLinkConfig>,
    /// Administrative user links applied at startup.
    #[serde(default)]
    pub users: Vec<UserLinkConfig>,
}

/// Bridge-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user_prefix")]
    pub user_prefix: String,
    /// Forget bridge-originated event ids after this many seconds (unset = never).
    pub echo_retention_secs: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            user_prefix: default_user_prefix(),
            echo_retention_secs: None,
        }
    }
}

/// Matrix homeserver settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MatrixConfig {
    /// Client-server API base URL, e.g. `https://matrix.example.org`.
    pub homeserver_url: String,
    /// Server name used as the domain of ghost user ids.
    pub homeserver_name: String,
    /// Application service token used to act as ghost users.
    pub as_access_token: String,
    /// Base URL for rewriting `mxc://` media into fetchable URLs.
    pub media_base_url: Option<String>,
}

impl MatrixConfig {
    /// Media base URL, falling back to the homeserver URL.
    pub fn media_base_url(&self) -> &str {
        self.media_base_url
            .as_deref()
            .unwrap_or(&self.homeserver_url)
            .trim_end_matches('/')
    }
}

/// Slack settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SlackConfig {
    #[serde(default = "default_slack_api_url")]
    pub api_url: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_url: default_slack_api_url(),
        }
    }
}

/// Links a Slack channel to a Matrix room.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomLinkConfig {
    pub slack: String,
    pub matrix: String,
}

/// Links a real Slack user to a real Matrix user.
#[derive(Debug, Clone, Deserialize)]
pub struct UserLinkConfig {
    pub slack_user: String,
    pub slack_token: String,
    pub matrix_user: String,
    pub matrix_token: String,
}

fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

fn default_user_prefix() -> String {
    DEFAULT_USER_PREFIX.to_string()
}

fn default_slack_api_url() -> String {
    DEFAULT_SLACK_API_URL.to_string()
}

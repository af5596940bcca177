//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Errors raised while mutating or loading durable link state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{side} '{id}' is already linked to '{existing}'")]
    Conflict {
        side: &'static str,
        id: String,
        existing: String,
    },
}

/// Errors returned by the Slack and Matrix protocol clients.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {message}")]
    Url { message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Reasons an identity could not be provisioned for a message.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("no linked member in Slack channel {channel} to borrow a credential from")]
    NoCredential { channel: String },

    #[error("looking up user {user}: {source}")]
    Lookup {
        user: String,
        #[source]
        source: ClientError,
    },

    #[error("joining room {room}: {source}")]
    Join {
        room: String,
        #[source]
        source: ClientError,
    },

    #[error("building client: {0}")]
    Client(#[from] ClientError),

    #[error("storing user link: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for protocol client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

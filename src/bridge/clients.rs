//! Construction of protocol clients for bridged identities.

use std::sync::Arc;

use reqwest::Client;

use crate::common::ClientResult;
use crate::config::Config;
use crate::matrix::{HttpMatrixClient, MatrixClient};
use crate::slack::{HttpSlackClient, SlackClient};

/// Builds the clients the bridge acts through.
pub trait ClientFactory: Send + Sync {
    /// A real Matrix user with its own token.
    fn matrix(&self, access_token: &str, homeserver: &str) -> ClientResult<Arc<dyn MatrixClient>>;

    /// A ghost Matrix user, driven by the application service token.
    fn matrix_ghost(&self, user_id: &str) -> ClientResult<Arc<dyn MatrixClient>>;

    /// The application service itself.
    fn matrix_service(&self) -> ClientResult<Arc<dyn MatrixClient>>;

    /// A real Slack user with its own token.
    fn slack(&self, access_token: &str) -> Arc<dyn SlackClient>;

    /// A Slack puppet posting as `username` with a borrowed token.
    fn slack_puppet(&self, access_token: &str, username: &str) -> Arc<dyn SlackClient>;
}

/// [`ClientFactory`] producing HTTP clients that share one connection pool.
#[derive(Clone)]
pub struct HttpClientFactory {
    http: Client,
    homeserver_url: String,
    as_token: String,
    slack_api_url: String,
}

impl HttpClientFactory {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            homeserver_url: config.matrix.homeserver_url.clone(),
            as_token: config.matrix.as_access_token.clone(),
            slack_api_url: config.slack.api_url.clone(),
        }
    }

    /// Concrete Matrix client, for the receive loops.
    pub fn http_matrix(&self, access_token: &str, homeserver: &str) -> ClientResult<HttpMatrixClient> {
        HttpMatrixClient::new(self.http.clone(), homeserver, access_token)
    }

    /// Concrete Slack client, for the receive loops.
    pub fn http_slack(&self, access_token: &str) -> HttpSlackClient {
        HttpSlackClient::new(self.http.clone(), &self.slack_api_url, access_token)
    }
}

impl ClientFactory for HttpClientFactory {
    fn matrix(&self, access_token: &str, homeserver: &str) -> ClientResult<Arc<dyn MatrixClient>> {
        Ok(Arc::new(self.http_matrix(access_token, homeserver)?))
    }

    fn matrix_ghost(&self, user_id: &str) -> ClientResult<Arc<dyn MatrixClient>> {
        Ok(Arc::new(HttpMatrixClient::as_user(
            self.http.clone(),
            &self.homeserver_url,
            &self.as_token,
            user_id,
        )?))
    }

    fn matrix_service(&self) -> ClientResult<Arc<dyn MatrixClient>> {
        Ok(Arc::new(HttpMatrixClient::new(
            self.http.clone(),
            &self.homeserver_url,
            &self.as_token,
        )?))
    }

    fn slack(&self, access_token: &str) -> Arc<dyn SlackClient> {
        Arc::new(self.http_slack(access_token))
    }

    fn slack_puppet(&self, access_token: &str, username: &str) -> Arc<dyn SlackClient> {
        Arc::new(HttpSlackClient::puppet(
            self.http.clone(),
            &self.slack_api_url,
            access_token,
            username,
        ))
    }
}

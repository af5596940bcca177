//! Slack Web API client.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::common::{ClientError, ClientResult};
use crate::slack::events::event_id;

/// What the bridge needs from a Slack identity.
#[async_trait]
pub trait SlackClient: Send + Sync {
    /// Post a text message; returns the id of the created message.
    async fn send_text(&self, channel: &str, text: &str) -> ClientResult<String>;

    /// Post an image attachment; returns the id of the created message.
    async fn send_image(&self, channel: &str, fallback: &str, image_url: &str) -> ClientResult<String>;

    /// Resolve a user id to the user's name.
    async fn user_name(&self, user_id: &str) -> ClientResult<String>;

    fn access_token(&self) -> &str;
}

/// HTTP implementation of [`SlackClient`].
///
/// A real user posts as itself. A puppet borrows a real user's token and
/// posts under a custom username.
#[derive(Clone)]
pub struct HttpSlackClient {
    http: Client,
    api_url: String,
    token: String,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RtmConnectResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl HttpSlackClient {
    pub fn new(http: Client, api_url: &str, token: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            username: None,
        }
    }

    pub fn puppet(http: Client, api_url: &str, token: &str, username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::new(http, api_url, token)
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url, method)
    }

    /// Ask for a real-time messaging websocket URL.
    pub async fn rtm_connect(&self) -> ClientResult<String> {
        let response = self
            .http
            .get(self.method_url("rtm.connect"))
            .query(&[("token", self.token.as_str())])
            .send()
            .await?;
        let payload: RtmConnectResponse = check_status(response).await?.json().await?;

        if !payload.ok {
            return Err(api_error(payload.error));
        }
        payload.url.ok_or_else(|| ClientError::Api {
            message: "rtm.connect returned no url".to_string(),
        })
    }

    async fn post_message(&self, channel: &str, fields: &[(&str, &str)]) -> ClientResult<String> {
        let mut form = vec![("token", self.token.as_str()), ("channel", channel)];
        match &self.username {
            Some(username) => {
                form.push(("as_user", "false"));
                form.push(("username", username.as_str()));
            }
            None => form.push(("as_user", "true")),
        }
        form.extend_from_slice(fields);

        let response = self
            .http
            .post(self.method_url("chat.postMessage"))
            .form(&form)
            .send()
            .await?;
        let payload: PostMessageResponse = check_status(response).await?.json().await?;

        if !payload.ok {
            return Err(api_error(payload.error));
        }
        let ts = payload.ts.ok_or_else(|| ClientError::Api {
            message: "chat.postMessage returned no ts".to_string(),
        })?;
        let id = event_id(payload.channel.as_deref().unwrap_or(channel), &ts);

        debug!(channel, id = %id, "Posted Slack message");
        Ok(id)
    }
}

#[async_trait]
impl SlackClient for HttpSlackClient {
    async fn send_text(&self, channel: &str, text: &str) -> ClientResult<String> {
        self.post_message(channel, &[("text", text)]).await
    }

    async fn send_image(&self, channel: &str, fallback: &str, image_url: &str) -> ClientResult<String> {
        let attachments = json!([{ "fallback": fallback, "image_url": image_url }]).to_string();
        self.post_message(channel, &[("attachments", attachments.as_str())])
            .await
    }

    async fn user_name(&self, user_id: &str) -> ClientResult<String> {
        let response = self
            .http
            .get(self.method_url("users.info"))
            .query(&[("token", self.token.as_str()), ("user", user_id)])
            .send()
            .await?;
        let payload: UserInfoResponse = check_status(response).await?.json().await?;

        if !payload.ok {
            return Err(api_error(payload.error));
        }
        payload
            .user
            .map(|user| user.name)
            .ok_or_else(|| ClientError::Api {
                message: format!("users.info returned no user for {}", user_id),
            })
    }

    fn access_token(&self) -> &str {
        &self.token
    }
}

async fn check_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

fn api_error(error: Option<String>) -> ClientError {
    ClientError::Api {
        message: error.unwrap_or_else(|| "unknown Slack error".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_text_as_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_string_contains("token=cynicism"))
            .and(body_string_contains("channel=CANTINA"))
            .and(body_string_contains("as_user=true"))
            .and(body_string_contains("text=It%27s+a+grand+gesture"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "channel": "CANTINA", "ts": "1.5" }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSlackClient::new(Client::new(), &server.uri(), "cynicism");
        let id = client
            .send_text("CANTINA", "It's a grand gesture")
            .await
            .unwrap();
        assert_eq!(id, "CANTINA:1.5");
    }

    #[tokio::test]
    async fn test_puppet_posts_under_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_string_contains("as_user=false"))
            .and(body_string_contains("username=%40nancy%3Amy.server"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "channel": "CANTINA", "ts": "2.0" }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSlackClient::puppet(Client::new(), &server.uri(), "borrowed", "@nancy:my.server");
        assert_eq!(client.access_token(), "borrowed");
        client.send_text("CANTINA", "hi").await.unwrap();
    }

    #[tokio::test]
    async fn test_send_image_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(body_string_contains("attachments="))
            .and(body_string_contains("image_url"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "channel": "CANTINA", "ts": "3.0" }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpSlackClient::new(Client::new(), &server.uri(), "cynicism");
        let id = client
            .send_image("CANTINA", "fallback", "https://some.url/image.jpg")
            .await
            .unwrap();
        assert_eq!(id, "CANTINA:3.0");
    }

    #[tokio::test]
    async fn test_not_ok_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "ok": false, "error": "channel_not_found" })),
            )
            .mount(&server)
            .await;

        let client = HttpSlackClient::new(Client::new(), &server.uri(), "cynicism");
        let err = client.send_text("NOWHERE", "hi").await.unwrap_err();
        assert!(matches!(err, ClientError::Api { ref message } if message == "channel_not_found"));
    }

    #[tokio::test]
    async fn test_http_failure_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = HttpSlackClient::new(Client::new(), &server.uri(), "cynicism");
        let err = client.send_text("CANTINA", "hi").await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_user_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.info"))
            .and(query_param("token", "cynicism"))
            .and(query_param("user", "U34"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "user": { "id": "U34", "name": "someoneonslack" } }),
            ))
            .mount(&server)
            .await;

        let client = HttpSlackClient::new(Client::new(), &server.uri(), "cynicism");
        assert_eq!(client.user_name("U34").await.unwrap(), "someoneonslack");
    }

    #[tokio::test]
    async fn test_rtm_connect() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rtm.connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "ok": true, "url": "wss://example.invalid/websocket" }),
            ))
            .mount(&server)
            .await;

        let client = HttpSlackClient::new(Client::new(), &server.uri(), "cynicism");
        assert_eq!(
            client.rtm_connect().await.unwrap(),
            "wss://example.invalid/websocket"
        );
    }
}

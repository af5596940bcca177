//! Matrix client-server API client.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::common::{ClientError, ClientResult};
use crate::matrix::events::{EventsResponse, Image};

const CLIENT_API: [&str; 4] = ["_matrix", "client", "api", "v1"];
const MEDIA_API: [&str; 3] = ["_matrix", "media", "v1"];

/// What the bridge needs from a Matrix identity.
#[async_trait]
pub trait MatrixClient: Send + Sync {
    /// Send an `m.text` message; returns the event id.
    async fn send_text(&self, room: &str, text: &str) -> ClientResult<String>;

    /// Upload `image` and send it as an `m.image` message; returns the event id.
    async fn send_image(&self, room: &str, caption: &str, image: &Image) -> ClientResult<String>;

    /// Send an `m.emote` message; returns the event id.
    async fn send_emote(&self, room: &str, text: &str) -> ClientResult<String>;

    async fn join_room(&self, room: &str) -> ClientResult<()>;

    async fn invite_user(&self, room: &str, user_id: &str) -> ClientResult<()>;

    /// Rooms this identity is currently joined to.
    async fn joined_rooms(&self) -> ClientResult<HashSet<String>>;

    /// Homeserver base URL.
    fn homeserver(&self) -> &str;

    fn access_token(&self) -> &str;
}

/// HTTP implementation of [`MatrixClient`].
///
/// With a `user_id` the client acts as that user through an application
/// service token.
#[derive(Clone)]
pub struct HttpMatrixClient {
    http: Client,
    homeserver: String,
    base: Url,
    access_token: String,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    content_uri: String,
}

#[derive(Debug, Deserialize)]
struct InitialSyncResponse {
    #[serde(default)]
    rooms: Vec<InitialSyncRoom>,
}

#[derive(Debug, Deserialize)]
struct InitialSyncRoom {
    membership: String,
    room_id: String,
}

impl HttpMatrixClient {
    pub fn new(http: Client, homeserver: &str, access_token: &str) -> ClientResult<Self> {
        let homeserver = homeserver.trim_end_matches('/');
        let base = Url::parse(homeserver).map_err(|e| ClientError::Url {
            message: format!("{}: {}", homeserver, e),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Url {
                message: format!("{} cannot be a base URL", homeserver),
            });
        }

        Ok(Self {
            http,
            homeserver: homeserver.to_string(),
            base,
            access_token: access_token.to_string(),
            user_id: None,
        })
    }

    /// A client acting as `user_id` with an application service token.
    pub fn as_user(http: Client, homeserver: &str, as_token: &str, user_id: &str) -> ClientResult<Self> {
        Ok(Self {
            user_id: Some(user_id.to_string()),
            ..Self::new(http, homeserver, as_token)?
        })
    }

    fn url(&self, prefix: &[&str], segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // Checked in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(prefix).extend(segments);
        }
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("access_token", &self.access_token);
            if let Some(user_id) = &self.user_id {
                query.append_pair("user_id", user_id);
            }
        }
        url
    }

    fn client_url(&self, segments: &[&str]) -> Url {
        self.url(&CLIENT_API, segments)
    }

    /// Long-poll the event stream from `from` (or from now).
    pub async fn events(&self, from: Option<&str>, timeout_ms: u64) -> ClientResult<EventsResponse> {
        let mut url = self.client_url(&["events"]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &timeout_ms.to_string());
            if let Some(from) = from {
                query.append_pair("from", from);
            }
        }

        let response = self.http.get(url).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn send_message(&self, room: &str, content: Value) -> ClientResult<String> {
        let url = self.client_url(&["rooms", room, "send", "m.room.message"]);
        let response = self.http.post(url).json(&content).send().await?;
        let sent: SendResponse = check_status(response).await?.json().await?;

        debug!(room, event_id = %sent.event_id, "Sent Matrix event");
        Ok(sent.event_id)
    }

    /// Fetch `image.url` and store it in the homeserver's media repository.
    async fn upload(&self, image: &Image) -> ClientResult<String> {
        let fetched = check_status(self.http.get(&image.url).send().await?).await?;
        let content_type = image
            .info
            .as_ref()
            .and_then(|info| info.mimetype.clone())
            .or_else(|| {
                fetched
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes = fetched.bytes().await?;

        let url = self.url(&MEDIA_API, &["upload"]);
        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let uploaded: UploadResponse = check_status(response).await?.json().await?;
        Ok(uploaded.content_uri)
    }
}

#[async_trait]
impl MatrixClient for HttpMatrixClient {
    async fn send_text(&self, room: &str, text: &str) -> ClientResult<String> {
        self.send_message(room, json!({ "msgtype": "m.text", "body": text }))
            .await
    }

    async fn send_image(&self, room: &str, caption: &str, image: &Image) -> ClientResult<String> {
        let content_uri = self.upload(image).await?;
        let mut content = json!({ "msgtype": "m.image", "body": caption, "url": content_uri });
        if let Some(info) = &image.info {
            content["info"] = serde_json::to_value(info)?;
        }
        self.send_message(room, content).await
    }

    async fn send_emote(&self, room: &str, text: &str) -> ClientResult<String> {
        self.send_message(room, json!({ "msgtype": "m.emote", "body": text }))
            .await
    }

    async fn join_room(&self, room: &str) -> ClientResult<()> {
        let url = self.client_url(&["rooms", room, "join"]);
        let response = self.http.post(url).json(&json!({})).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn invite_user(&self, room: &str, user_id: &str) -> ClientResult<()> {
        let url = self.client_url(&["rooms", room, "invite"]);
        let response = self
            .http
            .post(url)
            .json(&json!({ "user_id": user_id }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn joined_rooms(&self) -> ClientResult<HashSet<String>> {
        let mut url = self.client_url(&["initialSync"]);
        url.query_pairs_mut().append_pair("limit", "1");

        let response = self.http.get(url).send().await?;
        let sync: InitialSyncResponse = check_status(response).await?.json().await?;
        Ok(sync
            .rooms
            .into_iter()
            .filter(|room| room.membership == "join")
            .map(|room| room.room_id)
            .collect())
    }

    fn homeserver(&self) -> &str {
        &self.homeserver
    }

    fn access_token(&self) -> &str {
        &self.access_token
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

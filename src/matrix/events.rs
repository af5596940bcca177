//! Matrix event and message content types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type of room messages.
pub const ROOM_MESSAGE: &str = "m.room.message";

/// A page of the `/events` stream.
#[derive(Debug, Deserialize)]
pub struct EventsResponse {
    #[serde(default)]
    pub chunk: Vec<Value>,
    #[serde(default)]
    pub end: Option<String>,
}

/// An `m.room.message` event. The content is decoded lazily by the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub content: Value,
    #[serde(alias = "sender")]
    pub user_id: String,
    pub room_id: String,
    pub event_id: String,
}

impl RoomMessage {
    pub fn decode_content(&self) -> serde_json::Result<Content> {
        Content::deserialize(&self.content)
    }
}

/// Message content, discriminated by `msgtype`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msgtype")]
pub enum Content {
    #[serde(rename = "m.text")]
    Text { body: String },
    #[serde(rename = "m.notice")]
    Notice { body: String },
    #[serde(rename = "m.emote")]
    Emote { body: String },
    #[serde(rename = "m.image")]
    Image {
        #[serde(default)]
        body: String,
        url: String,
        #[serde(default)]
        info: Option<ImageInfo>,
    },
}

impl Content {
    pub fn body(&self) -> &str {
        match self {
            Content::Text { body }
            | Content::Notice { body }
            | Content::Emote { body }
            | Content::Image { body, .. } => body,
        }
    }
}

/// An image to post into a room. `url` is fetched and re-uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    pub url: String,
    pub info: Option<ImageInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub w: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Rewrite an `mxc://server/id` content URI into a download URL under `media_base`.
pub fn media_download_url(media_base: &str, content_uri: &str) -> Option<String> {
    let rest = content_uri.strip_prefix("mxc://")?;
    if rest.is_empty() {
        return None;
    }
    Some(format!(
        "{}/_matrix/media/v1/download/{}",
        media_base.trim_end_matches('/'),
        rest
    ))
}

//! Slack RTM event payloads.

use serde::Deserialize;

/// Message subtype for `/me` actions.
pub const ME_MESSAGE: &str = "me_message";

/// Message subtype for file uploads.
pub const FILE_SHARE: &str = "file_share";

/// Envelope used to peek at an RTM frame's type.
#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A `message` event from a channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ts: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub file: Option<SharedFile>,
}

impl Message {
    /// Id under which the bridge records this message for echo suppression.
    pub fn event_id(&self) -> String {
        event_id(&self.channel, &self.ts)
    }

    pub fn is_action(&self) -> bool {
        self.subtype.as_deref() == Some(ME_MESSAGE)
    }

    /// Plain messages, actions and file shares are bridged; edits, joins,
    /// bot messages and the like are not.
    pub fn is_relayable(&self) -> bool {
        matches!(self.subtype.as_deref(), None | Some(ME_MESSAGE) | Some(FILE_SHARE))
    }

    /// The shared file, if it is an image.
    pub fn image(&self) -> Option<&SharedFile> {
        self.file.as_ref().filter(|file| file.is_image())
    }
}

/// Slack identifies a message by its channel and timestamp.
pub fn event_id(channel: &str, ts: &str) -> String {
    format!("{}:{}", channel, ts)
}

/// A file attached to a `file_share` message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SharedFile {
    #[serde(default)]
    pub mimetype: String,
    #[serde(alias = "url", default)]
    pub url_private: String,
    #[serde(default)]
    pub original_w: Option<u64>,
    #[serde(default)]
    pub original_h: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub initial_comment: Option<Comment>,
}

impl SharedFile {
    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }

    /// Last path segment of the file URL.
    pub fn name(&self) -> &str {
        let path = self.url_private.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }

    /// The uploader's remark, when it is the file's only comment.
    pub fn sole_comment(&self) -> Option<&str> {
        match (&self.initial_comment, self.comments_count) {
            (Some(comment), 1) => Some(comment.comment.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub comment: String,
}

//! Bridge orchestrator routing messages between Slack and Matrix.
//!
//! Both entry points run inline on the receive loop that delivered the event
//! and may be called concurrently. Failures drop the message and log; nothing
//! is retried.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bridge::provisioner::Provisioner;
use crate::bridge::rooms::RoomLinks;
use crate::bridge::text;
use crate::common::{ClientResult, EchoSuppresser};
use crate::matrix::events::media_download_url;
use crate::matrix::{Content, Image, ImageInfo, MatrixClient, RoomMessage};
use crate::slack::events::SharedFile;
use crate::slack::{Message, SlackUser};

/// The main bridge that routes messages between linked rooms.
pub struct Bridge {
    rooms: Arc<RoomLinks>,
    provisioner: Provisioner,
    echo: Arc<EchoSuppresser>,
    /// Base URL that `mxc://` content URIs are rewritten under.
    media_base_url: String,
}

impl Bridge {
    pub fn new(
        rooms: Arc<RoomLinks>,
        provisioner: Provisioner,
        echo: Arc<EchoSuppresser>,
        media_base_url: &str,
    ) -> Self {
        Self {
            rooms,
            provisioner,
            echo,
            media_base_url: media_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Relay a Slack message into the linked Matrix room.
    pub async fn on_slack_message(&self, msg: &Message) {
        let Some(room) = self.rooms.matrix_for_slack(&msg.channel) else {
            info!(channel = %msg.channel, "No Matrix room linked, dropping Slack message");
            return;
        };

        match self.rooms.should_deliver(&msg.channel, &msg.ts) {
            Ok(true) => {}
            Ok(false) => {
                debug!(channel = %msg.channel, ts = %msg.ts, "Dropping redelivered Slack message");
                return;
            }
            Err(e) => {
                error!(channel = %msg.channel, "Failed to record delivery watermark: {}", e);
                return;
            }
        }

        if msg.user.is_empty() {
            debug!(channel = %msg.channel, "Dropping Slack message without a sender");
            return;
        }
        let user = match self
            .provisioner
            .matrix_user_for(&msg.user, &msg.channel, &room)
            .await
        {
            Ok(user) => user,
            Err(e) => {
                warn!(user = %msg.user, channel = %msg.channel, "Dropping Slack message: {}", e);
                return;
            }
        };
        let client = user.client().as_ref();

        if let Some(file) = msg.image() {
            self.relay_slack_image(client, &room, file).await;
            return;
        }

        let body = text::slack_to_matrix(&msg.text);
        let result = if msg.is_action() {
            self.tracked(client.send_emote(&room, &body)).await
        } else {
            self.tracked(client.send_text(&room, &body)).await
        };
        match result {
            Ok(event_id) => {
                debug!(room = %room, user = user.user_id(), %event_id, "Slack -> Matrix");
            }
            Err(e) => warn!(room = %room, user = user.user_id(), "Failed to send to Matrix: {}", e),
        }
    }

    async fn relay_slack_image(&self, client: &dyn MatrixClient, room: &str, file: &SharedFile) {
        let image = Image {
            url: file.url_private.clone(),
            info: Some(ImageInfo {
                w: file.original_w,
                h: file.original_h,
                mimetype: Some(file.mimetype.clone()),
                size: file.size,
            }),
        };

        match self.tracked(client.send_image(room, file.name(), &image)).await {
            Ok(event_id) => debug!(room, %event_id, "Slack image -> Matrix"),
            Err(e) => warn!(room, "Failed to send image to Matrix: {}", e),
        }

        if let Some(comment) = file.sole_comment() {
            let body = text::slack_to_matrix(comment);
            if let Err(e) = self.tracked(client.send_text(room, &body)).await {
                warn!(room, "Failed to send image comment to Matrix: {}", e);
            }
        }
    }

    /// Relay a Matrix room message into the linked Slack channel.
    pub async fn on_matrix_message(&self, msg: &RoomMessage) {
        let Some(channel) = self.rooms.slack_for_matrix(&msg.room_id) else {
            info!(room = %msg.room_id, "No Slack channel linked, dropping Matrix message");
            return;
        };

        let content = match msg.decode_content() {
            Ok(content) => content,
            Err(e) => {
                warn!(event_id = %msg.event_id, "Dropping undecodable Matrix message: {}", e);
                return;
            }
        };

        let user = match self.provisioner.slack_user_for(&msg.user_id, &channel) {
            Ok(user) => user,
            Err(e) => {
                warn!(user = %msg.user_id, room = %msg.room_id, "Dropping Matrix message: {}", e);
                return;
            }
        };

        let fallback = text::matrix_to_slack(content.body());
        if let Content::Image { url, .. } = &content {
            match self.relay_matrix_image(&user, &channel, &fallback, url).await {
                Ok(event_id) => {
                    debug!(channel = %channel, %event_id, "Matrix image -> Slack");
                    return;
                }
                Err(reason) => {
                    warn!(channel = %channel, "Failed to send image to Slack, sending text: {}", reason);
                }
            }
        }

        match self.tracked(user.client.send_text(&channel, &fallback)).await {
            Ok(event_id) => debug!(channel = %channel, user = %user.id, %event_id, "Matrix -> Slack"),
            Err(e) => warn!(channel = %channel, user = %user.id, "Failed to send to Slack: {}", e),
        }
    }

    async fn relay_matrix_image(
        &self,
        user: &SlackUser,
        channel: &str,
        fallback: &str,
        content_uri: &str,
    ) -> Result<String, String> {
        let url = media_download_url(&self.media_base_url, content_uri)
            .ok_or_else(|| format!("unsupported content URI {:?}", content_uri))?;
        self.tracked(user.client.send_image(channel, fallback, &url))
            .await
            .map_err(|e| e.to_string())
    }

    /// Run a send inside the echo barrier and record the resulting event id.
    async fn tracked<F>(&self, send: F) -> ClientResult<String>
    where
        F: Future<Output = ClientResult<String>>,
    {
        let _sending = self.echo.start_sending();
        let event_id = send.await?;
        self.echo.sent(&event_id);
        Ok(event_id)
    }
}

//! Slack real-time messaging receive loop.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::common::{ClientResult, EchoSuppresser};
use crate::slack::client::HttpSlackClient;
use crate::slack::events::{Event, Message};

/// Receives one Slack user's RTM stream and feeds messages to the bridge.
pub struct SlackListener {
    user_id: String,
    client: HttpSlackClient,
    bridge: Arc<Bridge>,
    echo: Arc<EchoSuppresser>,
}

impl SlackListener {
    pub fn new(
        user_id: impl Into<String>,
        client: HttpSlackClient,
        bridge: Arc<Bridge>,
        echo: Arc<EchoSuppresser>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            client,
            bridge,
            echo,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run until the connection closes, fails, or `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ClientResult<()> {
        let url = self.client.rtm_connect().await?;
        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws.split();
        info!(user = %self.user_id, "Connected to Slack RTM");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(user = %self.user_id, "Closing Slack RTM connection");
                        let _ = write.close().await;
                        return Ok(());
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(msg) = decode_frame(&text) {
                                self.dispatch(msg).await;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(user = %self.user_id, ?frame, "Slack closed the RTM connection");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    async fn dispatch(&self, msg: Message) {
        // A send may be waiting on its ts; let it register before filtering.
        self.echo.wait().await;
        if self.echo.was_sent(&msg.event_id()) {
            debug!(id = %msg.event_id(), "Skipping bridge-originated Slack message");
            return;
        }
        self.bridge.on_slack_message(&msg).await;
    }
}

/// Decode an RTM frame into a bridgeable message.
pub fn decode_frame(text: &str) -> Option<Message> {
    let event: Event = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Failed to parse Slack RTM frame: {}", e);
            return None;
        }
    };

    match event.kind.as_deref() {
        Some("hello") => {
            info!("Slack RTM session ready");
            None
        }
        Some("message") => match serde_json::from_str::<Message>(text) {
            Ok(msg) if msg.is_relayable() => Some(msg),
            Ok(msg) => {
                debug!(subtype = ?msg.subtype, "Ignoring Slack message subtype");
                None
            }
            Err(e) => {
                warn!("Failed to parse Slack message: {}", e);
                None
            }
        },
        other => {
            debug!(kind = ?other, "Ignoring Slack event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message() {
        let msg = decode_frame(
            r#"{"type":"message","channel":"CANTINA","user":"U34","text":"hi","ts":"1.0"}"#,
        )
        .unwrap();
        assert_eq!(msg.channel, "CANTINA");
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_decode_action_and_file_share() {
        assert!(decode_frame(r#"{"type":"message","subtype":"me_message","channel":"C","ts":"1"}"#).is_some());
        assert!(decode_frame(r#"{"type":"message","subtype":"file_share","channel":"C","ts":"1"}"#).is_some());
    }

    #[test]
    fn test_decode_skips_other_frames() {
        assert!(decode_frame(r#"{"type":"hello"}"#).is_none());
        assert!(decode_frame(r#"{"type":"presence_change","user":"U34"}"#).is_none());
        assert!(decode_frame(r#"{"ok":true,"reply_to":1,"ts":"1.0"}"#).is_none());
        assert!(decode_frame(r#"{"type":"message","subtype":"message_changed","channel":"C","ts":"1"}"#).is_none());
        assert!(decode_frame("not json").is_none());
    }
}

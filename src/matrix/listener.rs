//! Matrix event stream receive loop.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bridge::Bridge;
use crate::common::{ClientResult, EchoSuppresser};
use crate::matrix::client::HttpMatrixClient;
use crate::matrix::events::{RoomMessage, ROOM_MESSAGE};

/// Server-side long-poll timeout for `/events`.
pub const POLL_TIMEOUT_MS: u64 = 30_000;

/// Long-polls one Matrix user's event stream and feeds messages to the bridge.
pub struct MatrixListener {
    user_id: String,
    client: HttpMatrixClient,
    bridge: Arc<Bridge>,
    echo: Arc<EchoSuppresser>,
}

impl MatrixListener {
    pub fn new(
        user_id: impl Into<String>,
        client: HttpMatrixClient,
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

    /// Poll until a request fails or `shutdown` flips to true.
    ///
    /// Shutdown drops the pending request.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> ClientResult<()> {
        let mut from: Option<String> = None;
        info!(user = %self.user_id, "Polling Matrix events");

        loop {
            let page = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(user = %self.user_id, "Stopped polling Matrix events");
                        return Ok(());
                    }
                    continue;
                }
                page = self.client.events(from.as_deref(), POLL_TIMEOUT_MS) => page?,
            };

            // Sends started before this page arrived must register first.
            self.echo.wait().await;
            for msg in room_messages(&page.chunk, &self.echo) {
                self.bridge.on_matrix_message(&msg).await;
            }

            if let Some(end) = page.end {
                from = Some(end);
            }
        }
    }
}

/// Extract the room messages in `chunk` that the bridge did not send itself.
pub fn room_messages(chunk: &[Value], echo: &EchoSuppresser) -> Vec<RoomMessage> {
    let mut messages = Vec::new();

    for raw in chunk {
        let kind = raw.get("type").and_then(Value::as_str);
        if kind != Some(ROOM_MESSAGE) {
            debug!(kind = ?kind, "Ignoring Matrix event");
            continue;
        }

        let msg: RoomMessage = match serde_json::from_value(raw.clone()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to parse Matrix room message: {}", e);
                continue;
            }
        };

        if echo.was_sent(&msg.event_id) {
            debug!(event_id = %msg.event_id, "Skipping bridge-originated Matrix event");
            continue;
        }
        messages.push(msg);
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(id: &str) -> Value {
        json!({
            "type": "m.room.message",
            "event_id": id,
            "room_id": "!abc:my.server",
            "user_id": "@nancy:my.server",
            "content": { "msgtype": "m.text", "body": "hi" }
        })
    }

    #[test]
    fn test_bridge_originated_events_are_filtered() {
        let echo = EchoSuppresser::new();
        echo.sent("$mine");

        let chunk = vec![event("$mine"), event("$theirs")];
        let messages = room_messages(&chunk, &echo);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event_id, "$theirs");
    }

    #[test]
    fn test_other_events_are_ignored() {
        let echo = EchoSuppresser::new();
        let chunk = vec![
            json!({ "type": "m.presence", "content": {} }),
            json!({ "type": "m.room.member", "event_id": "$m", "room_id": "!abc:my.server" }),
            json!({ "type": "m.room.message", "event_id": "$broken" }),
        ];
        assert!(room_messages(&chunk, &echo).is_empty());
    }
}

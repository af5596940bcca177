//! Slack channel <-> Matrix room links with a per-link delivery watermark.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::common::{StoreError, StoreResult};
use crate::db::{Database, RoomRow};

/// Persisted bidirectional room mapping.
pub struct RoomLinks {
    db: Arc<Database>,
    inner: RwLock<RoomMaps>,
}

#[derive(Debug, Default)]
struct RoomMaps {
    slack_to_matrix: HashMap<String, String>,
    matrix_to_slack: HashMap<String, String>,
    /// Last accepted Slack timestamp per channel.
    watermarks: HashMap<String, f64>,
}

impl RoomMaps {
    fn insert(&mut self, row: &RoomRow) {
        self.slack_to_matrix
            .insert(row.slack_channel_id.clone(), row.matrix_room_id.clone());
        self.matrix_to_slack
            .insert(row.matrix_room_id.clone(), row.slack_channel_id.clone());
        match row.last_slack_timestamp.as_deref().map(parse_ts) {
            Some(Some(ts)) => {
                self.watermarks.insert(row.slack_channel_id.clone(), ts);
            }
            Some(None) => {
                warn!(
                    channel = %row.slack_channel_id,
                    "Ignoring unparseable stored timestamp {:?}", row.last_slack_timestamp
                );
                self.watermarks.remove(&row.slack_channel_id);
            }
            None => {
                self.watermarks.remove(&row.slack_channel_id);
            }
        }
    }

    fn conflict(&self, slack_channel: &str, matrix_room: &str) -> Option<StoreError> {
        if let Some(existing) = self.slack_to_matrix.get(slack_channel) {
            if existing != matrix_room {
                return Some(StoreError::Conflict {
                    side: "Slack channel",
                    id: slack_channel.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        if let Some(existing) = self.matrix_to_slack.get(matrix_room) {
            if existing != slack_channel {
                return Some(StoreError::Conflict {
                    side: "Matrix room",
                    id: matrix_room.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        None
    }
}

impl RoomLinks {
    /// Hydrate every stored room link.
    pub fn load(db: Arc<Database>) -> StoreResult<Self> {
        let mut maps = RoomMaps::default();
        for row in db.rooms()? {
            if let Some(e) = maps.conflict(&row.slack_channel_id, &row.matrix_room_id) {
                warn!("Skipping stored room link: {}", e);
                continue;
            }
            maps.insert(&row);
        }
        info!(links = maps.slack_to_matrix.len(), "Loaded room links");

        Ok(Self {
            db,
            inner: RwLock::new(maps),
        })
    }

    /// Link `slack_channel` and `matrix_room`.
    ///
    /// Re-linking an existing pair reloads its watermark from storage instead
    /// of adding a row. Linking either side to something else is a conflict.
    pub fn link(&self, slack_channel: &str, matrix_room: &str) -> StoreResult<()> {
        let mut maps = self.inner.write();
        if let Some(e) = maps.conflict(slack_channel, matrix_room) {
            return Err(e);
        }

        let row = match self.db.find_room(slack_channel, matrix_room)? {
            Some(row) => row,
            None => {
                let id = self.db.insert_room(slack_channel, matrix_room)?;
                info!(channel = slack_channel, room = matrix_room, "Linked rooms");
                RoomRow {
                    id,
                    slack_channel_id: slack_channel.to_string(),
                    matrix_room_id: matrix_room.to_string(),
                    last_slack_timestamp: None,
                }
            }
        };
        debug!(id = row.id, channel = slack_channel, "Room link ready");
        maps.insert(&row);
        Ok(())
    }

    pub fn matrix_for_slack(&self, slack_channel: &str) -> Option<String> {
        self.inner.read().slack_to_matrix.get(slack_channel).cloned()
    }

    pub fn slack_for_matrix(&self, matrix_room: &str) -> Option<String> {
        self.inner.read().matrix_to_slack.get(matrix_room).cloned()
    }

    /// Every linked Slack channel.
    pub fn slack_channels(&self) -> Vec<String> {
        self.inner.read().slack_to_matrix.keys().cloned().collect()
    }

    /// Redelivery gate for Slack messages.
    ///
    /// Accepts `ts` only if the channel is linked and `ts` is strictly newer
    /// than the last accepted timestamp, then persists it as the new
    /// watermark. Assumes Slack mostly delivers a channel in timestamp order.
    pub fn should_deliver(&self, slack_channel: &str, ts: &str) -> StoreResult<bool> {
        let mut maps = self.inner.write();
        if !maps.slack_to_matrix.contains_key(slack_channel) {
            return Ok(false);
        }

        let Some(value) = parse_ts(ts) else {
            warn!(channel = slack_channel, ts, "Unparseable Slack timestamp");
            return Ok(false);
        };
        if let Some(&last) = maps.watermarks.get(slack_channel) {
            if value <= last {
                debug!(channel = slack_channel, ts, last, "Suppressing redelivered message");
                return Ok(false);
            }
        }

        self.db.update_slack_timestamp(slack_channel, ts)?;
        maps.watermarks.insert(slack_channel.to_string(), value);
        Ok(true)
    }
}

fn parse_ts(ts: &str) -> Option<f64> {
    ts.trim().parse::<f64>().ok().filter(|value| value.is_finite())
}

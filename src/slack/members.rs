//! Slack identities known to the bridge and the channels they are in.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::slack::client::SlackClient;

/// A Slack identity the bridge can post as.
pub struct SlackUser {
    pub id: String,
    pub client: Arc<dyn SlackClient>,
    /// Posts under a borrowed token on behalf of a Matrix user.
    pub puppet: bool,
}

impl SlackUser {
    pub fn new(id: impl Into<String>, client: Arc<dyn SlackClient>) -> Self {
        Self {
            id: id.into(),
            client,
            puppet: false,
        }
    }

    pub fn puppet(id: impl Into<String>, client: Arc<dyn SlackClient>) -> Self {
        Self {
            puppet: true,
            ..Self::new(id, client)
        }
    }
}

impl std::fmt::Debug for SlackUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackUser")
            .field("id", &self.id)
            .field("puppet", &self.puppet)
            .finish()
    }
}

/// Slack channel -> identities whose credentials can act in it.
#[derive(Debug, Default)]
pub struct ChannelMembers {
    members: RwLock<HashMap<String, Vec<Arc<SlackUser>>>>,
}

impl ChannelMembers {
    pub fn new() -> Self {
        Self::default()
    }

    /// First known member of `channel`.
    pub fn any(&self, channel: &str) -> Option<Arc<SlackUser>> {
        self.members
            .read()
            .get(channel)
            .and_then(|users| users.first())
            .cloned()
    }

    pub fn add(&self, channel: &str, user: Arc<SlackUser>) {
        let mut members = self.members.write();
        let users = members.entry(channel.to_string()).or_default();
        if !users.iter().any(|known| known.id == user.id) {
            users.push(user);
        }
    }

    pub fn len(&self, channel: &str) -> usize {
        self.members.read().get(channel).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testing::MockSlackClient;

    fn user(id: &str) -> Arc<SlackUser> {
        Arc::new(SlackUser::new(id, Arc::new(MockSlackClient::new("token"))))
    }

    #[test]
    fn test_any_on_unknown_channel() {
        let members = ChannelMembers::new();
        assert!(members.any("CANTINA").is_none());
    }

    #[test]
    fn test_any_returns_first_member() {
        let members = ChannelMembers::new();
        members.add("CANTINA", user("U1"));
        members.add("CANTINA", user("U2"));

        assert_eq!(members.any("CANTINA").unwrap().id, "U1");
        assert!(members.any("OTHER").is_none());
    }

    #[test]
    fn test_add_ignores_duplicates() {
        let members = ChannelMembers::new();
        members.add("CANTINA", user("U1"));
        members.add("CANTINA", user("U1"));
        assert_eq!(members.len("CANTINA"), 1);
    }
}

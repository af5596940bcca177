//! Recording mock clients for bridge tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bridge::clients::ClientFactory;
use crate::common::{ClientError, ClientResult};
use crate::matrix::{Image, MatrixClient};
use crate::slack::SlackClient;

static NEXT_EVENT: AtomicU64 = AtomicU64::new(1);

fn next_event() -> u64 {
    NEXT_EVENT.fetch_add(1, Ordering::Relaxed)
}

fn refused(what: &str) -> ClientError {
    ClientError::Status {
        status: 403,
        body: format!("{} refused", what),
    }
}

/// A call made on a [`MockMatrixClient`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MatrixCall {
    Text { room: String, body: String },
    Emote { room: String, body: String },
    Image { room: String, caption: String, image: Image },
    Join(String),
    Invite { room: String, user: String },
    JoinedRooms,
}

#[derive(Default)]
struct MatrixState {
    calls: Vec<MatrixCall>,
    joined: HashSet<String>,
    fail_joins: usize,
    fail_images: bool,
    fail_sends: bool,
    last_event: Option<String>,
}

pub struct MockMatrixClient {
    user_id: String,
    token: String,
    homeserver: String,
    state: Mutex<MatrixState>,
}

impl MockMatrixClient {
    pub fn new(user_id: &str) -> Self {
        Self::with_credentials(user_id, &format!("token-{}", user_id), "https://my.server")
    }

    pub fn with_credentials(user_id: &str, token: &str, homeserver: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            token: token.to_string(),
            homeserver: homeserver.to_string(),
            state: Mutex::new(MatrixState::default()),
        }
    }

    pub fn set_joined(&self, rooms: &[&str]) {
        self.state.lock().joined = rooms.iter().map(|room| room.to_string()).collect();
    }

    /// Refuse the next `count` joins.
    pub fn fail_joins(&self, count: usize) {
        self.state.lock().fail_joins = count;
    }

    pub fn fail_images(&self) {
        self.state.lock().fail_images = true;
    }

    pub fn fail_sends(&self) {
        self.state.lock().fail_sends = true;
    }

    pub fn calls(&self) -> Vec<MatrixCall> {
        self.state.lock().calls.clone()
    }

    /// Text, emote and image sends.
    pub fn sent(&self) -> Vec<MatrixCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                matches!(
                    call,
                    MatrixCall::Text { .. } | MatrixCall::Emote { .. } | MatrixCall::Image { .. }
                )
            })
            .collect()
    }

    /// Every join attempt, including refused ones.
    pub fn joins(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MatrixCall::Join(room) => Some(room),
                _ => None,
            })
            .collect()
    }

    pub fn invites(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                MatrixCall::Invite { room, user } => Some((room, user)),
                _ => None,
            })
            .collect()
    }

    pub fn joined_rooms_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == MatrixCall::JoinedRooms)
            .count()
    }

    pub fn last_event(&self) -> Option<String> {
        self.state.lock().last_event.clone()
    }

    fn record_send(&self, call: MatrixCall) -> ClientResult<String> {
        let mut state = self.state.lock();
        let is_image = matches!(call, MatrixCall::Image { .. });
        state.calls.push(call);
        if state.fail_sends || (is_image && state.fail_images) {
            return Err(refused("send"));
        }
        let event_id = format!("${}:{}", next_event(), self.user_id);
        state.last_event = Some(event_id.clone());
        Ok(event_id)
    }
}

#[async_trait]
impl MatrixClient for MockMatrixClient {
    async fn send_text(&self, room: &str, text: &str) -> ClientResult<String> {
        tokio::task::yield_now().await;
        self.record_send(MatrixCall::Text {
            room: room.to_string(),
            body: text.to_string(),
        })
    }

    async fn send_image(&self, room: &str, caption: &str, image: &Image) -> ClientResult<String> {
        tokio::task::yield_now().await;
        self.record_send(MatrixCall::Image {
            room: room.to_string(),
            caption: caption.to_string(),
            image: image.clone(),
        })
    }

    async fn send_emote(&self, room: &str, text: &str) -> ClientResult<String> {
        tokio::task::yield_now().await;
        self.record_send(MatrixCall::Emote {
            room: room.to_string(),
            body: text.to_string(),
        })
    }

    async fn join_room(&self, room: &str) -> ClientResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.calls.push(MatrixCall::Join(room.to_string()));
        if state.fail_joins > 0 {
            state.fail_joins -= 1;
            return Err(refused("join"));
        }
        state.joined.insert(room.to_string());
        Ok(())
    }

    async fn invite_user(&self, room: &str, user_id: &str) -> ClientResult<()> {
        tokio::task::yield_now().await;
        self.state.lock().calls.push(MatrixCall::Invite {
            room: room.to_string(),
            user: user_id.to_string(),
        });
        Ok(())
    }

    async fn joined_rooms(&self) -> ClientResult<HashSet<String>> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.calls.push(MatrixCall::JoinedRooms);
        Ok(state.joined.clone())
    }

    fn homeserver(&self) -> &str {
        &self.homeserver
    }

    fn access_token(&self) -> &str {
        &self.token
    }
}

/// A call made on a [`MockSlackClient`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SlackCall {
    Text { channel: String, text: String },
    Image { channel: String, fallback: String, url: String },
    UserName(String),
}

#[derive(Default)]
struct SlackState {
    calls: Vec<SlackCall>,
    names: HashMap<String, String>,
    fail_images: bool,
    last_event: Option<String>,
}

pub struct MockSlackClient {
    token: String,
    username: Option<String>,
    state: Mutex<SlackState>,
}

impl MockSlackClient {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            username: None,
            state: Mutex::new(SlackState::default()),
        }
    }

    pub fn puppet(token: &str, username: &str) -> Self {
        Self {
            username: Some(username.to_string()),
            ..Self::new(token)
        }
    }

    pub fn with_user(self, user_id: &str, name: &str) -> Self {
        self.state
            .lock()
            .names
            .insert(user_id.to_string(), name.to_string());
        self
    }

    pub fn fail_images(&self) {
        self.state.lock().fail_images = true;
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn calls(&self) -> Vec<SlackCall> {
        self.state.lock().calls.clone()
    }

    pub fn sent(&self) -> Vec<SlackCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, SlackCall::UserName(_)))
            .collect()
    }

    pub fn last_event(&self) -> Option<String> {
        self.state.lock().last_event.clone()
    }

    fn record_send(&self, channel: &str, call: SlackCall) -> ClientResult<String> {
        let mut state = self.state.lock();
        let is_image = matches!(call, SlackCall::Image { .. });
        state.calls.push(call);
        if is_image && state.fail_images {
            return Err(ClientError::Api {
                message: "invalid_attachments".to_string(),
            });
        }
        let event_id = format!("{}:{}.000100", channel, next_event());
        state.last_event = Some(event_id.clone());
        Ok(event_id)
    }
}

#[async_trait]
impl SlackClient for MockSlackClient {
    async fn send_text(&self, channel: &str, text: &str) -> ClientResult<String> {
        tokio::task::yield_now().await;
        self.record_send(
            channel,
            SlackCall::Text {
                channel: channel.to_string(),
                text: text.to_string(),
            },
        )
    }

    async fn send_image(&self, channel: &str, fallback: &str, image_url: &str) -> ClientResult<String> {
        tokio::task::yield_now().await;
        self.record_send(
            channel,
            SlackCall::Image {
                channel: channel.to_string(),
                fallback: fallback.to_string(),
                url: image_url.to_string(),
            },
        )
    }

    async fn user_name(&self, user_id: &str) -> ClientResult<String> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock();
        state.calls.push(SlackCall::UserName(user_id.to_string()));
        state
            .names
            .get(user_id)
            .cloned()
            .ok_or_else(|| ClientError::Api {
                message: "user_not_found".to_string(),
            })
    }

    fn access_token(&self) -> &str {
        &self.token
    }
}

/// Factory handing out mocks and remembering the ones it built.
pub struct MockClientFactory {
    service: Arc<MockMatrixClient>,
    ghosts: Mutex<Vec<Arc<MockMatrixClient>>>,
    puppets: Mutex<Vec<Arc<MockSlackClient>>>,
}

impl MockClientFactory {
    pub fn new() -> Self {
        Self {
            service: Arc::new(MockMatrixClient::with_credentials(
                "@bridge:my.server",
                "as_token",
                "https://my.server",
            )),
            ghosts: Mutex::new(Vec::new()),
            puppets: Mutex::new(Vec::new()),
        }
    }

    pub fn service(&self) -> Arc<MockMatrixClient> {
        Arc::clone(&self.service)
    }

    /// Ghost clients in creation order.
    pub fn ghosts(&self) -> Vec<Arc<MockMatrixClient>> {
        self.ghosts.lock().clone()
    }

    /// Puppet clients in creation order.
    pub fn puppets(&self) -> Vec<Arc<MockSlackClient>> {
        self.puppets.lock().clone()
    }
}

impl ClientFactory for MockClientFactory {
    fn matrix(&self, access_token: &str, homeserver: &str) -> ClientResult<Arc<dyn MatrixClient>> {
        if !homeserver.starts_with("http") {
            return Err(ClientError::Url {
                message: homeserver.to_string(),
            });
        }
        Ok(Arc::new(MockMatrixClient::with_credentials(
            "@restored:my.server",
            access_token,
            homeserver,
        )))
    }

    fn matrix_ghost(&self, user_id: &str) -> ClientResult<Arc<dyn MatrixClient>> {
        let ghost = Arc::new(MockMatrixClient::with_credentials(
            user_id,
            "as_token",
            "https://my.server",
        ));
        self.ghosts.lock().push(Arc::clone(&ghost));
        Ok(ghost)
    }

    fn matrix_service(&self) -> ClientResult<Arc<dyn MatrixClient>> {
        Ok(self.service())
    }

    fn slack(&self, access_token: &str) -> Arc<dyn SlackClient> {
        Arc::new(MockSlackClient::new(access_token))
    }

    fn slack_puppet(&self, access_token: &str, username: &str) -> Arc<dyn SlackClient> {
        let puppet = Arc::new(MockSlackClient::puppet(access_token, username));
        self.puppets.lock().push(Arc::clone(&puppet));
        puppet
    }
}

//! Matrix identities the bridge can act as.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::common::ProvisionError;
use crate::matrix::client::MatrixClient;

/// A real or ghost Matrix user with a client and its room memberships.
pub struct MatrixUser {
    user_id: String,
    client: Arc<dyn MatrixClient>,
    ghost: bool,
    /// Joined rooms, fetched from the homeserver on first use.
    rooms: AsyncMutex<Option<HashSet<String>>>,
}

impl MatrixUser {
    pub fn new(user_id: impl Into<String>, client: Arc<dyn MatrixClient>) -> Self {
        Self {
            user_id: user_id.into(),
            client,
            ghost: false,
            rooms: AsyncMutex::new(None),
        }
    }

    pub fn ghost(user_id: impl Into<String>, client: Arc<dyn MatrixClient>) -> Self {
        Self {
            ghost: true,
            ..Self::new(user_id, client)
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn client(&self) -> &Arc<dyn MatrixClient> {
        &self.client
    }

    pub fn is_ghost(&self) -> bool {
        self.ghost
    }

    /// Make sure the user is a member of `room`, joining it if needed.
    ///
    /// If the join is refused, `inviter` invites the user and the join is
    /// retried once. Concurrent callers for the same user are serialised so
    /// a room is joined at most once.
    pub async fn ensure_joined(&self, room: &str, inviter: &dyn MatrixClient) -> Result<(), ProvisionError> {
        let mut guard = self.rooms.lock().await;
        if guard.is_none() {
            let joined = match self.client.joined_rooms().await {
                Ok(joined) => joined,
                Err(e) => {
                    warn!(user = %self.user_id, "Failed to list joined rooms: {}", e);
                    HashSet::new()
                }
            };
            *guard = Some(joined);
        }
        let rooms = guard.get_or_insert_with(HashSet::new);
        if rooms.contains(room) {
            return Ok(());
        }

        if let Err(e) = self.client.join_room(room).await {
            debug!(user = %self.user_id, room, "Join refused ({}), inviting", e);
            inviter
                .invite_user(room, &self.user_id)
                .await
                .map_err(|source| ProvisionError::Join {
                    room: room.to_string(),
                    source,
                })?;
            self.client
                .join_room(room)
                .await
                .map_err(|source| ProvisionError::Join {
                    room: room.to_string(),
                    source,
                })?;
        }

        info!(user = %self.user_id, room, "Joined Matrix room");
        rooms.insert(room.to_string());
        Ok(())
    }
}

impl std::fmt::Debug for MatrixUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixUser")
            .field("user_id", &self.user_id)
            .field("ghost", &self.ghost)
            .finish()
    }
}

/// Process-wide table of ghost users, keyed by Matrix user id.
#[derive(Debug, Default)]
pub struct MatrixUsers {
    users: Mutex<HashMap<String, Arc<MatrixUser>>>,
}

impl MatrixUsers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user for `user_id`, calling `create` if there is none.
    ///
    /// `create` runs inside the table lock, so it runs at most once per id
    /// and must not block on I/O. A failed `create` leaves the table unchanged.
    pub fn get_or_create<F, E>(&self, user_id: &str, create: F) -> Result<Arc<MatrixUser>, E>
    where
        F: FnOnce() -> Result<Arc<MatrixUser>, E>,
    {
        let mut users = self.users.lock();
        if let Some(user) = users.get(user_id) {
            return Ok(Arc::clone(user));
        }
        let user = create()?;
        users.insert(user_id.to_string(), Arc::clone(&user));
        Ok(user)
    }

    /// Register an existing user, e.g. a ghost restored from storage.
    pub fn insert(&self, user: Arc<MatrixUser>) {
        self.users.lock().insert(user.user_id().to_string(), user);
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }
}

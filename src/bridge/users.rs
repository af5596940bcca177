//! Slack user <-> Matrix user links.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::bridge::clients::ClientFactory;
use crate::common::{StoreError, StoreResult};
use crate::db::{Database, NewUserRow, UserRow};
use crate::matrix::MatrixUser;
use crate::slack::SlackUser;

/// Persisted identity mapping between the two sides.
///
/// Real users are linked in both directions. Matrix ghosts are only reachable
/// from their Slack user, and Slack puppets only from their Matrix user.
pub struct UserLinks {
    db: Arc<Database>,
    inner: RwLock<UserMaps>,
}

#[derive(Default)]
struct UserMaps {
    slack_to_matrix: HashMap<String, Arc<MatrixUser>>,
    matrix_to_slack: HashMap<String, Arc<SlackUser>>,
}

impl UserMaps {
    fn conflict(&self, slack_user: &str, matrix_user: &str) -> Option<StoreError> {
        if let Some(existing) = self.slack_to_matrix.get(slack_user) {
            if existing.user_id() != matrix_user {
                return Some(StoreError::Conflict {
                    side: "Slack user",
                    id: slack_user.to_string(),
                    existing: existing.user_id().to_string(),
                });
            }
        }
        if let Some(existing) = self.matrix_to_slack.get(matrix_user) {
            if existing.id != slack_user {
                return Some(StoreError::Conflict {
                    side: "Matrix user",
                    id: matrix_user.to_string(),
                    existing: existing.id.clone(),
                });
            }
        }
        None
    }
}

/// Matrix credentials of a stored row, if present.
fn matrix_credentials(row: &UserRow) -> Option<(&str, &str)> {
    Some((
        row.matrix_access_token.as_deref()?,
        row.matrix_homeserver.as_deref()?,
    ))
}

impl UserLinks {
    /// Hydrate every stored link that carries Matrix credentials.
    ///
    /// Rows with a Slack token are real user pairs. Rows without one are
    /// ghost links and come back as ghosts driven by the service token,
    /// reachable from their Slack user only. Rows missing Matrix credentials
    /// are skipped.
    pub fn load(db: Arc<Database>, factory: &dyn ClientFactory) -> StoreResult<Self> {
        let mut maps = UserMaps::default();
        let mut ghosts: HashMap<String, Arc<MatrixUser>> = HashMap::new();

        for row in db.users()? {
            let Some((matrix_token, homeserver)) = matrix_credentials(&row) else {
                info!(id = row.id, user = %row.slack_user_id, "Skipping user link without credentials");
                continue;
            };

            let Some(slack_token) = row.slack_access_token.as_deref() else {
                if let Some(existing) = maps.slack_to_matrix.get(&row.slack_user_id) {
                    warn!(id = row.id, user = %row.slack_user_id, existing = existing.user_id(), "Skipping stored ghost link");
                    continue;
                }
                let ghost = match ghosts.get(&row.matrix_user_id) {
                    Some(ghost) => Arc::clone(ghost),
                    None => match factory.matrix_ghost(&row.matrix_user_id) {
                        Ok(client) => {
                            let ghost = Arc::new(MatrixUser::ghost(&row.matrix_user_id, client));
                            ghosts.insert(row.matrix_user_id.clone(), Arc::clone(&ghost));
                            ghost
                        }
                        Err(e) => {
                            warn!(id = row.id, user = %row.matrix_user_id, "Skipping ghost link: {}", e);
                            continue;
                        }
                    },
                };
                maps.slack_to_matrix.insert(row.slack_user_id.clone(), ghost);
                continue;
            };

            if let Some(e) = maps.conflict(&row.slack_user_id, &row.matrix_user_id) {
                warn!(id = row.id, "Skipping stored user link: {}", e);
                continue;
            }
            let matrix_client = match factory.matrix(matrix_token, homeserver) {
                Ok(client) => client,
                Err(e) => {
                    warn!(id = row.id, user = %row.matrix_user_id, "Skipping user link: {}", e);
                    continue;
                }
            };

            let matrix = Arc::new(MatrixUser::new(&row.matrix_user_id, matrix_client));
            let slack = Arc::new(SlackUser::new(&row.slack_user_id, factory.slack(slack_token)));
            maps.slack_to_matrix.insert(row.slack_user_id.clone(), matrix);
            maps.matrix_to_slack.insert(row.matrix_user_id.clone(), slack);
        }
        info!(links = maps.matrix_to_slack.len(), ghosts = ghosts.len(), "Loaded user links");

        Ok(Self {
            db,
            inner: RwLock::new(maps),
        })
    }

    /// Link a real Slack user to a real Matrix user.
    pub fn link(&self, slack: Arc<SlackUser>, matrix: Arc<MatrixUser>) -> StoreResult<()> {
        let mut maps = self.inner.write();
        if let Some(e) = maps.conflict(&slack.id, matrix.user_id()) {
            return Err(e);
        }

        if self.db.count_user_links(&slack.id, matrix.user_id())? == 0 {
            self.db.insert_user(&NewUserRow {
                slack_user_id: &slack.id,
                slack_access_token: Some(slack.client.access_token()),
                matrix_user_id: matrix.user_id(),
                matrix_access_token: matrix.client().access_token(),
                matrix_homeserver: matrix.client().homeserver(),
            })?;
            info!(slack = %slack.id, matrix = matrix.user_id(), "Linked users");
        }

        maps.matrix_to_slack
            .insert(matrix.user_id().to_string(), Arc::clone(&slack));
        maps.slack_to_matrix.insert(slack.id.clone(), matrix);
        Ok(())
    }

    /// Record a provisioned ghost for `slack_user`.
    ///
    /// The row is stored without a Slack token; `load` restores it as a ghost.
    pub fn link_ghost(&self, slack_user: &str, ghost: Arc<MatrixUser>) -> StoreResult<()> {
        let mut maps = self.inner.write();
        if let Some(existing) = maps.slack_to_matrix.get(slack_user) {
            if existing.user_id() != ghost.user_id() {
                return Err(StoreError::Conflict {
                    side: "Slack user",
                    id: slack_user.to_string(),
                    existing: existing.user_id().to_string(),
                });
            }
        }

        if self.db.count_user_links(slack_user, ghost.user_id())? == 0 {
            self.db.insert_user(&NewUserRow {
                slack_user_id: slack_user,
                slack_access_token: None,
                matrix_user_id: ghost.user_id(),
                matrix_access_token: ghost.client().access_token(),
                matrix_homeserver: ghost.client().homeserver(),
            })?;
        }

        maps.slack_to_matrix.insert(slack_user.to_string(), ghost);
        Ok(())
    }

    /// Return the Slack identity for `matrix_user`, inserting the one built by
    /// `create` if there is none. Puppets borrow credentials and are not stored.
    pub fn get_or_insert_puppet<F>(&self, matrix_user: &str, create: F) -> Arc<SlackUser>
    where
        F: FnOnce() -> Arc<SlackUser>,
    {
        if let Some(user) = self.slack_for_matrix(matrix_user) {
            return user;
        }
        let mut maps = self.inner.write();
        Arc::clone(
            maps.matrix_to_slack
                .entry(matrix_user.to_string())
                .or_insert_with(create),
        )
    }

    pub fn matrix_for_slack(&self, slack_user: &str) -> Option<Arc<MatrixUser>> {
        self.inner.read().slack_to_matrix.get(slack_user).cloned()
    }

    pub fn slack_for_matrix(&self, matrix_user: &str) -> Option<Arc<SlackUser>> {
        self.inner.read().matrix_to_slack.get(matrix_user).cloned()
    }

    /// Real (non-ghost) Matrix users, one receive loop each.
    pub fn real_matrix_users(&self) -> Vec<Arc<MatrixUser>> {
        self.inner
            .read()
            .slack_to_matrix
            .values()
            .filter(|user| !user.is_ghost())
            .cloned()
            .collect()
    }

    /// Distinct ghost users, for seeding the provisioner's registry.
    pub fn ghosts(&self) -> Vec<Arc<MatrixUser>> {
        let maps = self.inner.read();
        let mut ghosts: Vec<Arc<MatrixUser>> = Vec::new();
        for user in maps.slack_to_matrix.values().filter(|user| user.is_ghost()) {
            if !ghosts.iter().any(|ghost| Arc::ptr_eq(ghost, user)) {
                ghosts.push(Arc::clone(user));
            }
        }
        ghosts
    }

    /// Real (non-puppet) Slack users, one receive loop each.
    pub fn real_slack_users(&self) -> Vec<Arc<SlackUser>> {
        self.inner
            .read()
            .matrix_to_slack
            .values()
            .filter(|user| !user.puppet)
            .cloned()
            .collect()
    }
}

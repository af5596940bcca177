//! On-demand identity provisioning for unlinked senders.

use std::sync::Arc;

use tracing::info;

use crate::bridge::clients::ClientFactory;
use crate::bridge::users::UserLinks;
use crate::common::ProvisionError;
use crate::matrix::{MatrixClient, MatrixUser, MatrixUsers};
use crate::slack::{ChannelMembers, SlackUser};

/// Resolves the identity a message should be posted as, creating Matrix
/// ghosts and Slack puppets for senders without a link.
pub struct Provisioner {
    users: Arc<UserLinks>,
    members: Arc<ChannelMembers>,
    ghosts: MatrixUsers,
    factory: Arc<dyn ClientFactory>,
    service: Arc<dyn MatrixClient>,
    user_prefix: String,
    homeserver_name: String,
}

impl Provisioner {
    pub fn new(
        users: Arc<UserLinks>,
        members: Arc<ChannelMembers>,
        factory: Arc<dyn ClientFactory>,
        service: Arc<dyn MatrixClient>,
        user_prefix: &str,
        homeserver_name: &str,
    ) -> Self {
        let ghosts = MatrixUsers::new();
        for ghost in users.ghosts() {
            ghosts.insert(ghost);
        }
        Self {
            users,
            members,
            ghosts,
            factory,
            service,
            user_prefix: user_prefix.to_string(),
            homeserver_name: homeserver_name.to_string(),
        }
    }

    /// The Matrix identity for Slack user `slack_user`, ready to post in `room`.
    ///
    /// Unlinked users get a ghost named after their Slack name. Ghosts are
    /// created at most once and join `room` before this returns.
    pub async fn matrix_user_for(
        &self,
        slack_user: &str,
        slack_channel: &str,
        room: &str,
    ) -> Result<Arc<MatrixUser>, ProvisionError> {
        let user = match self.users.matrix_for_slack(slack_user) {
            Some(user) => user,
            None => self.provision_ghost(slack_user, slack_channel).await?,
        };

        if user.is_ghost() {
            user.ensure_joined(room, self.service.as_ref()).await?;
        }
        Ok(user)
    }

    async fn provision_ghost(
        &self,
        slack_user: &str,
        slack_channel: &str,
    ) -> Result<Arc<MatrixUser>, ProvisionError> {
        let lender = self
            .members
            .any(slack_channel)
            .ok_or_else(|| ProvisionError::NoCredential {
                channel: slack_channel.to_string(),
            })?;
        let name = lender
            .client
            .user_name(slack_user)
            .await
            .map_err(|source| ProvisionError::Lookup {
                user: slack_user.to_string(),
                source,
            })?;
        let ghost_id = ghost_user_id(&self.user_prefix, &name, &self.homeserver_name);

        let mut created = false;
        let ghost = self.ghosts.get_or_create(&ghost_id, || {
            let client = self.factory.matrix_ghost(&ghost_id)?;
            let ghost = Arc::new(MatrixUser::ghost(&ghost_id, client));
            self.users.link_ghost(slack_user, Arc::clone(&ghost))?;
            created = true;
            Ok::<_, ProvisionError>(ghost)
        })?;

        if created {
            info!(slack = slack_user, ghost = %ghost_id, ghosts = self.ghosts.len(), "Created Matrix ghost");
        } else if self.users.matrix_for_slack(slack_user).is_none() {
            // Another Slack user with the same name already owns this ghost.
            self.users.link_ghost(slack_user, Arc::clone(&ghost))?;
        }
        Ok(ghost)
    }

    /// The Slack identity for Matrix user `matrix_user`, able to post in `slack_channel`.
    ///
    /// Unlinked users get a puppet that borrows the token of a known member
    /// of the channel and posts under the Matrix user id.
    pub fn slack_user_for(
        &self,
        matrix_user: &str,
        slack_channel: &str,
    ) -> Result<Arc<SlackUser>, ProvisionError> {
        if let Some(user) = self.users.slack_for_matrix(matrix_user) {
            return Ok(user);
        }

        let lender = self
            .members
            .any(slack_channel)
            .ok_or_else(|| ProvisionError::NoCredential {
                channel: slack_channel.to_string(),
            })?;
        // One puppet per Matrix user, keeping the first lender's token. Every
        // seeded member belongs to the same team, so it can post anywhere.
        let puppet = self.users.get_or_insert_puppet(matrix_user, || {
            info!(matrix = matrix_user, channel = slack_channel, "Created Slack puppet");
            let client = self
                .factory
                .slack_puppet(lender.client.access_token(), matrix_user);
            Arc::new(SlackUser::puppet(matrix_user, client))
        });
        self.members.add(slack_channel, Arc::clone(&puppet));
        Ok(puppet)
    }
}

/// Ghost user id for a Slack user called `name`.
///
/// The name is lowercased and every character Matrix does not allow in a
/// user id localpart is replaced with `_`.
pub fn ghost_user_id(prefix: &str, name: &str, homeserver_name: &str) -> String {
    let localpart: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '_' | '=' | '-' | '/' => c,
            _ => '_',
        })
        .collect();
    format!("{}{}:{}", prefix, localpart, homeserver_name)
}

use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::group_repo::GroupRepository;
use crate::domain::conversation::{ConversationSummary, Group, sort_by_activity};
use crate::domain::event::{Channel, ChatEvent, Envelope};
use crate::error::{AppError, Result};
use crate::services::broadcast::Broadcaster;
use std::sync::Arc;
use uuid::Uuid;

const MAX_GROUP_NAME_CHARS: usize = 255;

#[derive(Clone, Debug)]
pub struct ConversationService {
    pool: DbPool,
    conversations: ConversationRepository,
    groups: GroupRepository,
    broadcaster: Arc<dyn Broadcaster>,
}

impl ConversationService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        conversations: ConversationRepository,
        groups: GroupRepository,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self { pool, conversations, groups, broadcaster }
    }

    /// The actor's direct conversations and groups, most recent activity first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if a query fails.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id))]
    pub async fn list(&self, actor_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let mut conn = self.pool.acquire().await?;
        let mut summaries = self.conversations.summaries_for_user(&mut conn, actor_id).await?;
        summaries.extend(self.groups.summaries_for_user(&mut conn, actor_id).await?);
        sort_by_activity(&mut summaries);
        Ok(summaries)
    }

    /// Creates a group owned by the actor.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the name is empty or too long.
    /// Returns `AppError::NotFound` if a member does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self, member_ids), fields(actor_id = %actor_id))]
    pub async fn create_group(&self, actor_id: Uuid, name: &str, member_ids: &[Uuid]) -> Result<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Group name is required".into()));
        }
        if name.chars().count() > MAX_GROUP_NAME_CHARS {
            return Err(AppError::BadRequest(format!("Group name may not exceed {MAX_GROUP_NAME_CHARS} characters")));
        }

        let mut tx = self.pool.begin().await?;
        let group = self.groups.create(&mut tx, name, actor_id, member_ids).await?;
        tx.commit().await?;

        tracing::info!(group_id = %group.id, "Group created");
        Ok(group)
    }

    /// Deletes a group and everything posted in it, then tells its members on
    /// the group's deletion channel.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the group does not exist.
    /// Returns `AppError::Forbidden` if the actor does not own the group.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id, group_id = %group_id))]
    pub async fn delete_group(&self, actor_id: Uuid, group_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let group = self.groups.lock(&mut tx, group_id).await?.ok_or(AppError::NotFound)?;
        if group.owner_id != actor_id {
            return Err(AppError::Forbidden);
        }
        self.groups.delete(&mut tx, group_id).await?;
        tx.commit().await?;

        tracing::info!("Group deleted");
        self.broadcaster
            .publish(Envelope::new(
                Channel::group_deleted(group_id),
                ChatEvent::GroupDeleted { id: group.id, name: group.name },
            ))
            .await;
        Ok(())
    }
}

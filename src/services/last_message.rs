use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::group_repo::GroupRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::domain::conversation::{Conversation, Group};
use crate::domain::message::{ConversationKey, Message};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

/// The row holding a conversation's last-message pointer, locked for the
/// lifetime of the surrounding transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PointerOwner {
    Direct(Conversation),
    Group(Group),
}

impl PointerOwner {
    pub(crate) const fn last_message_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct(c) => c.last_message_id,
            Self::Group(g) => g.last_message_id,
        }
    }
}

/// Maintains `last_message_id` on conversations and groups.
///
/// Every mutation first locks the owning row, so sends and deletes within one
/// conversation are serialized and the pointer never regresses.
#[derive(Clone, Debug, Default)]
pub struct LastMessageTracker {
    conversations: ConversationRepository,
    groups: GroupRepository,
    messages: MessageRepository,
}

impl LastMessageTracker {
    #[must_use]
    pub const fn new(conversations: ConversationRepository, groups: GroupRepository, messages: MessageRepository) -> Self {
        Self { conversations, groups, messages }
    }

    /// Locks the owner ahead of a send. Direct conversations are created on first contact.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the group or the other user does not exist.
    pub(crate) async fn lock_for_send(&self, conn: &mut PgConnection, key: ConversationKey) -> Result<PointerOwner> {
        match key {
            ConversationKey::Direct { low, high } => {
                self.conversations.lock_or_create(conn, low, high).await.map(PointerOwner::Direct)
            }
            ConversationKey::Group(id) => {
                self.groups.lock(conn, id).await?.map(PointerOwner::Group).ok_or(AppError::NotFound)
            }
        }
    }

    /// Locks the owner ahead of a delete. Returns `None` for a direct pair with no conversation row.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the lock query fails.
    pub(crate) async fn lock_for_delete(
        &self,
        conn: &mut PgConnection,
        key: ConversationKey,
    ) -> Result<Option<PointerOwner>> {
        match key {
            ConversationKey::Direct { low, high } => {
                Ok(self.conversations.lock(conn, low, high).await?.map(PointerOwner::Direct))
            }
            ConversationKey::Group(id) => Ok(self.groups.lock(conn, id).await?.map(PointerOwner::Group)),
        }
    }

    /// A new message is always the newest one.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, owner))]
    pub(crate) async fn on_message_created(
        &self,
        conn: &mut PgConnection,
        owner: &PointerOwner,
        message_id: Uuid,
    ) -> Result<()> {
        match owner {
            PointerOwner::Direct(c) => self.conversations.set_last_message(conn, c.id, message_id).await,
            PointerOwner::Group(g) => self.groups.set_last_message(conn, g.id, message_id).await,
        }
    }

    /// Runs after `deleted` has been removed in the same transaction. If it was
    /// the pointer target the pointer moves to the newest remaining message.
    /// Returns the pointer value after the call.
    ///
    /// # Errors
    /// Returns `AppError::Database` if a query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, owner, deleted), fields(message_id = %deleted.id))]
    pub(crate) async fn on_message_deleted(
        &self,
        conn: &mut PgConnection,
        owner: Option<&PointerOwner>,
        deleted: &Message,
    ) -> Result<Option<Uuid>> {
        let key = deleted.conversation_key();
        let Some(owner) = owner else {
            return self.messages.most_recent_id(conn, key).await;
        };

        let current = owner.last_message_id();
        if current.is_some() && current != Some(deleted.id) {
            return Ok(current);
        }

        let replacement = self.messages.most_recent_id(conn, key).await?;
        let updated = match owner {
            PointerOwner::Direct(c) => self.conversations.replace_last_message(conn, c.id, deleted.id, replacement).await?,
            PointerOwner::Group(g) => self.groups.replace_last_message(conn, g.id, deleted.id, replacement).await?,
        };
        if updated == 0 {
            tracing::warn!(?replacement, "Last message pointer changed under the row lock");
        } else {
            tracing::debug!(?replacement, "Recomputed last message pointer");
        }

        Ok(replacement)
    }
}

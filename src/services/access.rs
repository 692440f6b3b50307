use crate::adapters::database::group_repo::GroupRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::domain::event::{Channel, ChannelKind};
use crate::domain::message::{ConversationKey, Message};
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

/// Read access to conversations and the channels derived from them.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    groups: GroupRepository,
    messages: MessageRepository,
}

impl AccessPolicy {
    #[must_use]
    pub const fn new(groups: GroupRepository, messages: MessageRepository) -> Self {
        Self { groups, messages }
    }

    /// A direct conversation is visible to its two participants, a group to its members.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the membership lookup fails.
    pub(crate) async fn can_access(&self, conn: &mut PgConnection, user_id: Uuid, key: ConversationKey) -> Result<bool> {
        match key {
            ConversationKey::Direct { .. } => Ok(key.involves(user_id)),
            ConversationKey::Group(group_id) => self.groups.is_member(conn, group_id, user_id).await,
        }
    }

    /// # Errors
    /// Returns `AppError::Database` if the membership lookup fails.
    pub(crate) async fn can_view(&self, conn: &mut PgConnection, user_id: Uuid, message: &Message) -> Result<bool> {
        self.can_access(conn, user_id, message.conversation_key()).await
    }

    /// Decides whether `user_id` may listen on `channel`. Unknown channel names are refused.
    ///
    /// # Errors
    /// Returns `AppError::Database` if a lookup fails.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(channel = %channel))]
    pub(crate) async fn can_subscribe(&self, conn: &mut PgConnection, user_id: Uuid, channel: &Channel) -> Result<bool> {
        match channel.kind() {
            Some(ChannelKind::Online) => Ok(true),
            Some(ChannelKind::Conversation(key)) => self.can_access(conn, user_id, key).await,
            Some(ChannelKind::GroupDeleted(group_id)) => self.groups.is_member(conn, group_id, user_id).await,
            Some(ChannelKind::Message(message_id)) => match self.messages.find_by_id(conn, message_id).await? {
                Some(message) => self.can_view(conn, user_id, &message).await,
                None => Ok(false),
            },
            None => Ok(false),
        }
    }
}

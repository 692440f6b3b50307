use crate::domain::message::{Message, MessageTarget};
use crate::domain::reaction::GroupedReactions;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) receiver_id: Option<Uuid>,
    pub(crate) group_id: Option<Uuid>,
    pub(crate) message: Option<String>,
    pub(crate) reply_to_id: Option<Uuid>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let target = MessageTarget::from_parts(record.receiver_id, record.group_id).map_err(|_| {
            tracing::error!(message_id = %record.id, "Stored message has an invalid target");
            AppError::Internal
        })?;

        Ok(Self {
            id: record.id,
            sender_id: record.sender_id,
            target,
            body: record.message,
            reply_to_id: record.reply_to_id,
            created_at: record.created_at,
            attachments: Vec::new(),
            reactions: GroupedReactions::new(),
        })
    }
}

use crate::domain::conversation::{Conversation, ConversationKind, ConversationSummary, Group};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) user_id1: Uuid,
    pub(crate) user_id2: Uuid,
    pub(crate) last_message_id: Option<Uuid>,
}

impl From<ConversationRecord> for Conversation {
    fn from(record: ConversationRecord) -> Self {
        Self {
            id: record.id,
            user_id1: record.user_id1,
            user_id2: record.user_id2,
            last_message_id: record.last_message_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct GroupRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) owner_id: Uuid,
    pub(crate) last_message_id: Option<Uuid>,
}

impl From<GroupRecord> for Group {
    fn from(record: GroupRecord) -> Self {
        Self { id: record.id, name: record.name, owner_id: record.owner_id, last_message_id: record.last_message_id }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct SummaryRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) last_message: Option<String>,
    pub(crate) last_message_date: Option<OffsetDateTime>,
}

impl SummaryRecord {
    pub(crate) fn into_summary(self, kind: ConversationKind) -> ConversationSummary {
        ConversationSummary {
            kind,
            id: self.id,
            name: self.name,
            last_message: self.last_message,
            last_message_date: self.last_message_date,
        }
    }
}

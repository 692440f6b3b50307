use crate::domain::reaction::{Reaction, ReactionEntry};
use crate::domain::user::UserSummary;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ReactionRecord {
    pub(crate) id: Uuid,
    pub(crate) message_id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) emoji: String,
    pub(crate) created_at: OffsetDateTime,
}

impl From<ReactionRecord> for Reaction {
    fn from(record: ReactionRecord) -> Self {
        Self {
            id: record.id,
            message_id: record.message_id,
            user_id: record.user_id,
            emoji: record.emoji,
            created_at: record.created_at,
        }
    }
}

/// Result of an idempotent insert: the stored row and whether this call created it.
#[derive(Debug, sqlx::FromRow)]
pub struct UpsertedReactionRecord {
    #[sqlx(flatten)]
    pub(crate) reaction: ReactionRecord,
    pub(crate) created: bool,
}

/// A reaction left-joined with its user; the user columns are null when the
/// user no longer exists.
#[derive(Debug, sqlx::FromRow)]
pub struct ReactionEntryRecord {
    pub(crate) message_id: Uuid,
    pub(crate) emoji: String,
    pub(crate) user_id: Option<Uuid>,
    pub(crate) user_name: Option<String>,
}

impl From<ReactionEntryRecord> for ReactionEntry {
    fn from(record: ReactionEntryRecord) -> Self {
        let user = match (record.user_id, record.user_name) {
            (Some(id), Some(name)) => Some(UserSummary { id, name }),
            _ => None,
        };
        Self { message_id: record.message_id, emoji: record.emoji, user }
    }
}

use crate::domain::message::ConversationKey;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use time::OffsetDateTime;
use uuid::Uuid;

/// A direct conversation. `user_id1 < user_id2` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id1: Uuid,
    pub user_id2: Uuid,
    pub last_message_id: Option<Uuid>,
}

impl Conversation {
    #[must_use]
    pub fn key(&self) -> ConversationKey {
        ConversationKey::direct(self.user_id1, self.user_id2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub last_message_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    User,
    Group,
}

/// One row of the caller's conversation list. For direct conversations `id`
/// is the other participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub kind: ConversationKind,
    pub id: Uuid,
    pub name: String,
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_date: Option<OffsetDateTime>,
}

impl ConversationSummary {
    /// Key of this entry as seen by `viewer`.
    #[must_use]
    pub fn key_for(&self, viewer: Uuid) -> ConversationKey {
        match self.kind {
            ConversationKind::User => ConversationKey::direct(viewer, self.id),
            ConversationKind::Group => ConversationKey::Group(self.id),
        }
    }
}

/// Newest last message first; conversations without messages go last, then by name.
pub fn sort_by_activity(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| {
        (a.last_message_date.is_none(), Reverse(a.last_message_date), &a.name).cmp(&(
            b.last_message_date.is_none(),
            Reverse(b.last_message_date),
            &b.name,
        ))
    });
}

use crate::domain::user::UserSummary;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use uuid::Uuid;

/// Emoji to the users who reacted with it.
pub type GroupedReactions = BTreeMap<String, Vec<UserSummary>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub emoji: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A stored reaction joined with its user. `user` is `None` when the user
/// row no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEntry {
    pub message_id: Uuid,
    pub emoji: String,
    pub user: Option<UserSummary>,
}

/// Groups reactions by emoji, keeping input order within each emoji.
/// Entries without a resolvable user are skipped.
#[must_use]
pub fn group_reactions<I>(entries: I) -> GroupedReactions
where
    I: IntoIterator<Item = ReactionEntry>,
{
    let mut grouped = GroupedReactions::new();
    for entry in entries {
        let Some(user) = entry.user else {
            tracing::debug!(message_id = %entry.message_id, emoji = %entry.emoji, "Skipping reaction without user");
            continue;
        };
        grouped.entry(entry.emoji).or_default().push(user);
    }
    grouped
}

/// Same as [`group_reactions`] but for a page of messages at once.
#[must_use]
pub fn group_reactions_by_message<I>(entries: I) -> HashMap<Uuid, GroupedReactions>
where
    I: IntoIterator<Item = ReactionEntry>,
{
    let mut per_message: HashMap<Uuid, Vec<ReactionEntry>> = HashMap::new();
    for entry in entries {
        per_message.entry(entry.message_id).or_default().push(entry);
    }
    per_message
        .into_iter()
        .map(|(message_id, entries)| (message_id, group_reactions(entries)))
        .filter(|(_, grouped)| !grouped.is_empty())
        .collect()
}

/// Validates an emoji and returns it trimmed.
///
/// # Errors
/// Returns `AppError::BadRequest` if the emoji is empty or longer than `max_chars`.
pub fn validate_emoji(emoji: &str, max_chars: usize) -> Result<&str> {
    let emoji = emoji.trim();
    if emoji.is_empty() {
        return Err(AppError::BadRequest("emoji is required".into()));
    }
    if emoji.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!("emoji may not exceed {max_chars} characters")));
    }
    Ok(emoji)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionAction {
    Add,
    Remove,
}

/// Payload pushed on a message's channel when a reaction changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionChange {
    pub message_id: Uuid,
    pub user: UserSummary,
    pub emoji: String,
    pub action: ReactionAction,
}

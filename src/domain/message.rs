use crate::domain::reaction::GroupedReactions;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Where a message is delivered. A message belongs either to a direct
/// conversation or to a group, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "TargetFields", into = "TargetFields")]
pub enum MessageTarget {
    Direct(Uuid),
    Group(Uuid),
}

/// Wire shape of [`MessageTarget`]: two nullable ids, exactly one set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetFields {
    #[serde(default)]
    receiver_id: Option<Uuid>,
    #[serde(default)]
    group_id: Option<Uuid>,
}

impl MessageTarget {
    /// Builds a target from the nullable column pair.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` unless exactly one id is present.
    pub fn from_parts(receiver_id: Option<Uuid>, group_id: Option<Uuid>) -> Result<Self> {
        match (receiver_id, group_id) {
            (Some(receiver), None) => Ok(Self::Direct(receiver)),
            (None, Some(group)) => Ok(Self::Group(group)),
            (Some(_), Some(_)) => Err(AppError::BadRequest("Specify either receiverId or groupId, not both".into())),
            (None, None) => Err(AppError::BadRequest("Either receiverId or groupId is required".into())),
        }
    }

    #[must_use]
    pub const fn receiver_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct(id) => Some(*id),
            Self::Group(_) => None,
        }
    }

    #[must_use]
    pub const fn group_id(&self) -> Option<Uuid> {
        match self {
            Self::Direct(_) => None,
            Self::Group(id) => Some(*id),
        }
    }
}

impl TryFrom<TargetFields> for MessageTarget {
    type Error = String;

    fn try_from(fields: TargetFields) -> std::result::Result<Self, Self::Error> {
        Self::from_parts(fields.receiver_id, fields.group_id).map_err(|e| e.to_string())
    }
}

impl From<MessageTarget> for TargetFields {
    fn from(target: MessageTarget) -> Self {
        Self { receiver_id: target.receiver_id(), group_id: target.group_id() }
    }
}

/// Identifies a conversation independent of who sent a given message.
/// Direct pairs are stored low id first so both participants map to the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConversationKey {
    Direct { low: Uuid, high: Uuid },
    Group(Uuid),
}

impl ConversationKey {
    #[must_use]
    pub fn direct(a: Uuid, b: Uuid) -> Self {
        if a <= b { Self::Direct { low: a, high: b } } else { Self::Direct { low: b, high: a } }
    }

    #[must_use]
    pub fn of(sender_id: Uuid, target: MessageTarget) -> Self {
        match target {
            MessageTarget::Direct(receiver) => Self::direct(sender_id, receiver),
            MessageTarget::Group(group) => Self::Group(group),
        }
    }

    #[must_use]
    pub fn involves(&self, user_id: Uuid) -> bool {
        match self {
            Self::Direct { low, high } => *low == user_id || *high == user_id,
            Self::Group(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: i64,
    pub path: String,
}

/// Metadata of a file that has already been written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub name: String,
    pub mime: String,
    pub size: i64,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    #[serde(flatten)]
    pub target: MessageTarget,
    #[serde(rename = "message")]
    pub body: Option<String>,
    pub reply_to_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reactions: GroupedReactions,
}

impl Message {
    #[must_use]
    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::of(self.sender_id, self.target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub target: MessageTarget,
    pub body: Option<String>,
    pub reply_to_id: Option<Uuid>,
    pub attachments: Vec<NewAttachment>,
}

impl NewMessage {
    /// Normalizes the body and enforces size limits.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the message is empty or over a limit.
    pub fn validate(mut self, max_body_chars: usize, max_attachments: usize) -> Result<Self> {
        self.body = self.body.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());

        if self.body.is_none() && self.attachments.is_empty() {
            return Err(AppError::BadRequest("Message must have text or attachments".into()));
        }
        if let Some(body) = &self.body
            && body.chars().count() > max_body_chars
        {
            return Err(AppError::BadRequest(format!("Message exceeds {max_body_chars} characters")));
        }
        if self.attachments.len() > max_attachments {
            return Err(AppError::BadRequest(format!("At most {max_attachments} attachments are allowed")));
        }
        if self.attachments.iter().any(|a| a.name.is_empty() || a.path.is_empty() || a.size < 0) {
            return Err(AppError::BadRequest("Invalid attachment metadata".into()));
        }

        Ok(self)
    }
}

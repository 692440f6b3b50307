use crate::domain::message::{ConversationKey, Message};
use crate::domain::reaction::ReactionChange;
use crate::domain::user::UserSummary;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

const USER_PAIR_PREFIX: &str = "message.user.";
const GROUP_PREFIX: &str = "message.group.";
const MESSAGE_PREFIX: &str = "chat.message.";
const GROUP_DELETED_PREFIX: &str = "group.deleted.";
const ONLINE: &str = "online";

/// A named broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Channel(String);

/// The entity a channel is about, used for subscription checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Conversation(ConversationKey),
    Message(Uuid),
    GroupDeleted(Uuid),
    Online,
}

impl Channel {
    #[must_use]
    pub fn conversation(key: ConversationKey) -> Self {
        match key {
            ConversationKey::Direct { low, high } => Self(format!("{USER_PAIR_PREFIX}{low}-{high}")),
            ConversationKey::Group(id) => Self(format!("{GROUP_PREFIX}{id}")),
        }
    }

    #[must_use]
    pub fn message(message_id: Uuid) -> Self {
        Self(format!("{MESSAGE_PREFIX}{message_id}"))
    }

    /// Where members of a group hear that it was deleted.
    #[must_use]
    pub fn group_deleted(group_id: Uuid) -> Self {
        Self(format!("{GROUP_DELETED_PREFIX}{group_id}"))
    }

    #[must_use]
    pub fn online() -> Self {
        Self(ONLINE.to_string())
    }

    /// Parses a client-supplied channel name. Unknown or malformed names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::kind_of(name).map(|kind| match kind {
            ChannelKind::Conversation(key) => Self::conversation(key),
            ChannelKind::Message(id) => Self::message(id),
            ChannelKind::GroupDeleted(id) => Self::group_deleted(id),
            ChannelKind::Online => Self::online(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> Option<ChannelKind> {
        Self::kind_of(&self.0)
    }

    fn kind_of(name: &str) -> Option<ChannelKind> {
        if name == ONLINE {
            return Some(ChannelKind::Online);
        }
        if let Some(pair) = name.strip_prefix(USER_PAIR_PREFIX) {
            // Both halves are hyphenated UUIDs, so split on the fixed width instead of '-'.
            let (a, rest) = pair.split_at_checked(36)?;
            let b = rest.strip_prefix('-')?;
            let a = Uuid::parse_str(a).ok()?;
            let b = Uuid::parse_str(b).ok()?;
            return Some(ChannelKind::Conversation(ConversationKey::direct(a, b)));
        }
        if let Some(id) = name.strip_prefix(GROUP_PREFIX) {
            return Uuid::parse_str(id).ok().map(|id| ChannelKind::Conversation(ConversationKey::Group(id)));
        }
        if let Some(id) = name.strip_prefix(MESSAGE_PREFIX) {
            return Uuid::parse_str(id).ok().map(ChannelKind::Message);
        }
        if let Some(id) = name.strip_prefix(GROUP_DELETED_PREFIX) {
            return Uuid::parse_str(id).ok().map(ChannelKind::GroupDeleted);
        }
        None
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    #[serde(rename = "message.created")]
    MessageCreated { message: Message },
    #[serde(rename = "message.deleted")]
    MessageDeleted {
        message: Message,
        #[serde(rename = "prevMessage")]
        prev_message: Option<Message>,
    },
    #[serde(rename = "message.reacted")]
    MessageReacted { reaction: ReactionChange },
    #[serde(rename = "presence.here")]
    PresenceHere { users: Vec<UserSummary> },
    #[serde(rename = "presence.joining")]
    PresenceJoining { user: UserSummary },
    #[serde(rename = "presence.leaving")]
    PresenceLeaving { user: UserSummary },
    #[serde(rename = "group.deleted")]
    GroupDeleted { id: Uuid, name: String },
}

/// An event bound to the channel it was published on. This is both the
/// pubsub payload and the gateway frame sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub channel: Channel,
    pub event: ChatEvent,
    /// User whose action produced the event; their own sessions skip it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
}

impl Envelope {
    #[must_use]
    pub const fn new(channel: Channel, event: ChatEvent) -> Self {
        Self { channel, event, actor_id: None }
    }

    #[must_use]
    pub const fn from_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::reaction::ReactionAction;
    use serde_json::json;

    #[test]
    fn test_pair_channel_is_symmetric_and_parses() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let channel = Channel::conversation(ConversationKey::direct(a, b));

        assert_eq!(channel, Channel::conversation(ConversationKey::direct(b, a)));
        assert_eq!(channel.kind(), Some(ChannelKind::Conversation(ConversationKey::direct(a, b))));
        assert_eq!(Channel::parse(channel.as_str()), Some(channel));
    }

    #[test]
    fn test_parse_normalizes_reversed_pair() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (low, high) = if a < b { (a, b) } else { (b, a) };

        let parsed = Channel::parse(&format!("message.user.{high}-{low}")).unwrap();
        assert_eq!(parsed.as_str(), format!("message.user.{low}-{high}"));
    }

    #[test]
    fn test_parse_other_channels() {
        let id = Uuid::new_v4();
        assert_eq!(Channel::parse(&format!("message.group.{id}")).unwrap().kind(), Some(ChannelKind::Conversation(ConversationKey::Group(id))));
        assert_eq!(Channel::parse(&format!("chat.message.{id}")).unwrap().kind(), Some(ChannelKind::Message(id)));
        assert_eq!(Channel::parse(&format!("group.deleted.{id}")).unwrap().kind(), Some(ChannelKind::GroupDeleted(id)));
        assert_eq!(Channel::parse("online").unwrap().kind(), Some(ChannelKind::Online));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Channel::parse("message.group.not-a-uuid").is_none());
        assert!(Channel::parse("group.deleted.").is_none());
        assert!(Channel::parse("message.user.short").is_none());
        assert!(Channel::parse("private-anything").is_none());
        assert!(Channel::parse("").is_none());
    }

    #[test]
    fn test_event_wire_format() {
        let user = UserSummary { id: Uuid::new_v4(), name: "bob".into() };
        let message_id = Uuid::new_v4();
        let envelope = Envelope::new(
            Channel::message(message_id),
            ChatEvent::MessageReacted {
                reaction: ReactionChange { message_id, user: user.clone(), emoji: "👍".into(), action: ReactionAction::Add },
            },
        )
        .from_actor(user.id);

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["channel"], json!(format!("chat.message.{message_id}")));
        assert_eq!(value["event"]["type"], json!("message.reacted"));
        assert_eq!(value["event"]["reaction"]["action"], json!("add"));
        assert_eq!(value["actorId"], json!(user.id));

        let back: Envelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_group_deleted_wire_format() {
        let id = Uuid::new_v4();
        let envelope = Envelope::new(Channel::group_deleted(id), ChatEvent::GroupDeleted { id, name: "team".into() });

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["channel"], json!(format!("group.deleted.{id}")));
        assert_eq!(value["event"], json!({ "type": "group.deleted", "id": id, "name": "team" }));
        assert!(value.get("actorId").is_none());
    }
}

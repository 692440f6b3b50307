use crate::domain::conversation::{ConversationKind, ConversationSummary, sort_by_activity};
use crate::domain::event::ChatEvent;
use crate::domain::message::{ConversationKey, Message};
use uuid::Uuid;

/// The viewer's conversation list with last-message previews, most recent
/// activity first.
#[derive(Debug)]
pub struct Sidebar {
    viewer: Uuid,
    entries: Vec<ConversationSummary>,
}

impl Sidebar {
    /// Builds the sidebar from the `GET /conversations` response.
    #[must_use]
    pub fn new(viewer: Uuid, mut entries: Vec<ConversationSummary>) -> Self {
        sort_by_activity(&mut entries);
        Self { viewer, entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[ConversationSummary] {
        &self.entries
    }

    /// Adds an entry for a conversation the list did not know about yet.
    pub fn insert(&mut self, entry: ConversationSummary) {
        let key = entry.key_for(self.viewer);
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key_for(self.viewer) == key) {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        sort_by_activity(&mut self.entries);
    }

    /// Updates the preview of the affected conversation. Returns whether an
    /// entry changed.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        let changed = match event {
            ChatEvent::MessageCreated { message } => self.show(message.conversation_key(), Some(message)),
            ChatEvent::MessageDeleted { message, prev_message } => {
                self.show(message.conversation_key(), prev_message.as_ref())
            }
            ChatEvent::GroupDeleted { id, .. } => self.drop_group(*id),
            ChatEvent::MessageReacted { .. }
            | ChatEvent::PresenceHere { .. }
            | ChatEvent::PresenceJoining { .. }
            | ChatEvent::PresenceLeaving { .. } => false,
        };
        if changed {
            sort_by_activity(&mut self.entries);
        }
        changed
    }

    fn drop_group(&mut self, group_id: Uuid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| !(e.kind == ConversationKind::Group && e.id == group_id));
        self.entries.len() != before
    }

    fn show(&mut self, key: ConversationKey, message: Option<&Message>) -> bool {
        let viewer = self.viewer;
        let Some(entry) = self.entries.iter_mut().find(|e| e.key_for(viewer) == key) else {
            return false;
        };
        entry.last_message = message.and_then(|m| m.body.clone());
        entry.last_message_date = message.map(|m| m.created_at);
        true
    }
}

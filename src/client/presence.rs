use crate::domain::event::ChatEvent;
use crate::domain::user::UserSummary;
use std::collections::HashMap;
use uuid::Uuid;

/// Users with an open session, as announced on the `online` channel.
#[derive(Debug, Default)]
pub struct PresenceTracker {
    members: HashMap<Uuid, UserSummary>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the membership with a full snapshot.
    pub fn here(&mut self, users: &[UserSummary]) {
        self.members = users.iter().map(|u| (u.id, u.clone())).collect();
    }

    pub fn joining(&mut self, user: &UserSummary) {
        self.members.insert(user.id, user.clone());
    }

    pub fn leaving(&mut self, user_id: Uuid) {
        self.members.remove(&user_id);
    }

    /// Applies a presence event. Returns `false` for any other event.
    pub fn apply(&mut self, event: &ChatEvent) -> bool {
        match event {
            ChatEvent::PresenceHere { users } => self.here(users),
            ChatEvent::PresenceJoining { user } => self.joining(user),
            ChatEvent::PresenceLeaving { user } => self.leaving(user.id),
            ChatEvent::MessageCreated { .. }
            | ChatEvent::MessageDeleted { .. }
            | ChatEvent::MessageReacted { .. }
            | ChatEvent::GroupDeleted { .. } => return false,
        }
        true
    }

    #[must_use]
    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.members.contains_key(&user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members ordered by name.
    #[must_use]
    pub fn members(&self) -> Vec<&UserSummary> {
        let mut members: Vec<_> = self.members.values().collect();
        members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        members
    }
}

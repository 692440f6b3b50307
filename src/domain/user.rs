use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_advisor: bool,
    pub advisor_id: Option<Uuid>,
}

impl User {
    /// Admins and advisors may open any direct conversation; plain users only
    /// the one with their assigned advisor.
    #[must_use]
    pub fn may_open_conversation_with(&self, other: Uuid) -> bool {
        self.is_admin || self.is_advisor || self.advisor_id == Some(other)
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary { id: self.id, name: self.name.clone() }
    }
}

/// The public face of a user as shown next to reactions and in presence lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool, is_advisor: bool, advisor_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Jane".into(),
            email: "jane@example.com".into(),
            is_admin,
            is_advisor,
            advisor_id,
        }
    }

    #[test]
    fn test_plain_user_only_reaches_assigned_advisor() {
        let advisor = Uuid::new_v4();
        let plain = user(false, false, Some(advisor));

        assert!(plain.may_open_conversation_with(advisor));
        assert!(!plain.may_open_conversation_with(Uuid::new_v4()));
    }

    #[test]
    fn test_staff_reaches_everyone() {
        let someone = Uuid::new_v4();
        assert!(user(true, false, None).may_open_conversation_with(someone));
        assert!(user(false, true, None).may_open_conversation_with(someone));
    }
}

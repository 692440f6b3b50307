use crate::domain::user::User;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct UserRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) is_admin: bool,
    pub(crate) is_advisor: bool,
    pub(crate) advisor_id: Option<Uuid>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            email: record.email,
            is_admin: record.is_admin,
            is_advisor: record.is_advisor,
            advisor_id: record.advisor_id,
        }
    }
}

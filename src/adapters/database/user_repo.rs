use crate::adapters::database::records::UserRecord;
use crate::domain::user::User;
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct UserRepository {}

impl UserRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Finds a user by id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, name, email, is_admin, is_advisor, advisor_id FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }
}

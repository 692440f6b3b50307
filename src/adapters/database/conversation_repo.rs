use crate::adapters::database::is_foreign_key_violation;
use crate::adapters::database::records::{ConversationRecord, SummaryRecord};
use crate::domain::conversation::{Conversation, ConversationKind, ConversationSummary};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ConversationRepository {}

impl ConversationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Creates the conversation row for an ordered pair if missing and locks it
    /// for the rest of the transaction.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if either user does not exist.
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock_or_create(&self, conn: &mut PgConnection, low: Uuid, high: Uuid) -> Result<Conversation> {
        // DO UPDATE (rather than DO NOTHING) so the existing row is returned and row-locked.
        let result = sqlx::query_as::<_, ConversationRecord>(
            r"
            INSERT INTO conversations (id, user_id1, user_id2)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id1, user_id2) DO UPDATE SET updated_at = NOW()
            RETURNING id, user_id1, user_id2, last_message_id
            ",
        )
        .bind(Uuid::now_v7())
        .bind(low)
        .bind(high)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Ok(record.into()),
            Err(e) if is_foreign_key_violation(&e) => Err(AppError::NotFound),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Locks an existing conversation row.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock(&self, conn: &mut PgConnection, low: Uuid, high: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r"
            SELECT id, user_id1, user_id2, last_message_id
            FROM conversations
            WHERE user_id1 = $1 AND user_id2 = $2
            FOR UPDATE
            ",
        )
        .bind(low)
        .bind(high)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Points the conversation at `message_id` unconditionally.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn set_last_message(&self, conn: &mut PgConnection, id: Uuid, message_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE conversations SET last_message_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(message_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Replaces the pointer only if it still references `expected` (or was
    /// already cleared by the cascading delete). Returns the affected row count.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn replace_last_message(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        expected: Uuid,
        replacement: Option<Uuid>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE conversations
            SET last_message_id = $3, updated_at = NOW()
            WHERE id = $1 AND (last_message_id IS NULL OR last_message_id = $2)
            ",
        )
        .bind(id)
        .bind(expected)
        .bind(replacement)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    /// Lists the direct conversations of a user with their last message preview.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn summaries_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let records = sqlx::query_as::<_, SummaryRecord>(
            r"
            SELECT u.id, u.name, m.message AS last_message, m.created_at AS last_message_date
            FROM conversations c
            JOIN users u ON u.id = CASE WHEN c.user_id1 = $1 THEN c.user_id2 ELSE c.user_id1 END
            LEFT JOIN messages m ON m.id = c.last_message_id
            WHERE c.user_id1 = $1 OR c.user_id2 = $1
            ",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(|r| r.into_summary(ConversationKind::User)).collect())
    }
}

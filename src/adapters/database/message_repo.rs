use crate::adapters::database::is_foreign_key_violation;
use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{ConversationKey, Message, MessageTarget};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

const COLUMNS: &str = "id, sender_id, receiver_id, group_id, message, reply_to_id, created_at";

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records a new message.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the receiver, group or replied-to message does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, body))]
    pub(crate) async fn create(
        &self,
        conn: &mut PgConnection,
        sender_id: Uuid,
        target: MessageTarget,
        body: Option<&str>,
        reply_to_id: Option<Uuid>,
    ) -> Result<Message> {
        let result = sqlx::query_as::<_, MessageRecord>(&format!(
            r"
            INSERT INTO messages (id, sender_id, receiver_id, group_id, message, reply_to_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "
        ))
        .bind(Uuid::now_v7())
        .bind(sender_id)
        .bind(target.receiver_id())
        .bind(target.group_id())
        .bind(body)
        .bind(reply_to_id)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => Message::try_from(record),
            Err(e) if is_foreign_key_violation(&e) => Err(AppError::NotFound),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Finds a message by id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!("SELECT {COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(conn)
            .await?;

        record.map(Message::try_from).transpose()
    }

    /// Fetches up to `limit` messages of a conversation, newest first. When
    /// `before` is set only messages created strictly earlier are returned.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn fetch_page(
        &self,
        conn: &mut PgConnection,
        key: ConversationKey,
        before: Option<OffsetDateTime>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let records = match key {
            ConversationKey::Direct { low, high } => {
                sqlx::query_as::<_, MessageRecord>(&format!(
                    r"
                    SELECT {COLUMNS}
                    FROM messages
                    WHERE ((sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1))
                      AND ($3::timestamptz IS NULL OR created_at < $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "
                ))
                .bind(low)
                .bind(high)
                .bind(before)
                .bind(limit)
                .fetch_all(conn)
                .await?
            }
            ConversationKey::Group(group_id) => {
                sqlx::query_as::<_, MessageRecord>(&format!(
                    r"
                    SELECT {COLUMNS}
                    FROM messages
                    WHERE group_id = $1
                      AND ($2::timestamptz IS NULL OR created_at < $2)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $3
                    "
                ))
                .bind(group_id)
                .bind(before)
                .bind(limit)
                .fetch_all(conn)
                .await?
            }
        };

        records.into_iter().map(Message::try_from).collect()
    }

    /// Returns the id of the newest message in a conversation, ties broken by id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn most_recent_id(&self, conn: &mut PgConnection, key: ConversationKey) -> Result<Option<Uuid>> {
        let page = self.fetch_page(conn, key, None, 1).await?;
        Ok(page.first().map(|m| m.id))
    }

    /// Deletes a message; attachments and reactions cascade.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1").bind(id).execute(conn).await?;
        Ok(result.rows_affected())
    }
}

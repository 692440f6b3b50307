use crate::adapters::database::records::AttachmentRecord;
use crate::domain::message::{Attachment, NewAttachment};
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct AttachmentRepository {}

impl AttachmentRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records attachment metadata for a message.
    ///
    /// # Errors
    /// Returns `AppError::Database` if an insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, attachments), fields(count = attachments.len()))]
    pub(crate) async fn create_many(
        &self,
        conn: &mut PgConnection,
        message_id: Uuid,
        attachments: &[NewAttachment],
    ) -> Result<Vec<Attachment>> {
        let mut created = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            let record = sqlx::query_as::<_, AttachmentRecord>(
                r"
                INSERT INTO message_attachments (id, message_id, name, mime, size, path)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, message_id, name, mime, size, path
                ",
            )
            .bind(Uuid::now_v7())
            .bind(message_id)
            .bind(&attachment.name)
            .bind(&attachment.mime)
            .bind(attachment.size)
            .bind(&attachment.path)
            .fetch_one(&mut *conn)
            .await?;
            created.push(record.into());
        }
        Ok(created)
    }

    /// Loads the attachments of several messages, in upload order.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(count = message_ids.len()))]
    pub(crate) async fn for_messages(&self, conn: &mut PgConnection, message_ids: &[Uuid]) -> Result<Vec<Attachment>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, AttachmentRecord>(
            r"
            SELECT id, message_id, name, mime, size, path
            FROM message_attachments
            WHERE message_id = ANY($1)
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(message_ids)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}

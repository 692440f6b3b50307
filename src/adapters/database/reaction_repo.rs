use crate::adapters::database::is_foreign_key_violation;
use crate::adapters::database::records::{ReactionEntryRecord, ReactionRecord, UpsertedReactionRecord};
use crate::domain::reaction::{Reaction, ReactionEntry};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct ReactionRepository {}

impl ReactionRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Stores the (message, user, emoji) triple unless it already exists and
    /// returns the stored row either way, flagged with whether it was created.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message or user does not exist.
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn add(
        &self,
        conn: &mut PgConnection,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<(Reaction, bool)> {
        let upserted = sqlx::query_as::<_, UpsertedReactionRecord>(
            r"
            WITH inserted AS (
                INSERT INTO message_reactions (id, message_id, user_id, emoji)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (message_id, user_id, emoji) DO NOTHING
                RETURNING id, message_id, user_id, emoji, created_at
            )
            SELECT id, message_id, user_id, emoji, created_at, TRUE AS created FROM inserted
            UNION ALL
            SELECT id, message_id, user_id, emoji, created_at, FALSE AS created
            FROM message_reactions
            WHERE message_id = $2 AND user_id = $3 AND emoji = $4
            LIMIT 1
            ",
        )
        .bind(Uuid::now_v7())
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .fetch_optional(&mut *conn)
        .await;

        match upserted {
            Ok(Some(record)) => Ok((record.reaction.into(), record.created)),
            // The conflicting row was committed after this statement's snapshot was taken.
            Ok(None) => {
                let existing = self.find(conn, message_id, user_id, emoji).await?.ok_or(AppError::NotFound)?;
                Ok((existing, false))
            }
            Err(e) if is_foreign_key_violation(&e) => Err(AppError::NotFound),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Deletes the triple if present. Returns whether a row was removed.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn remove(&self, conn: &mut PgConnection, message_id: Uuid, user_id: Uuid, emoji: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3")
            .bind(message_id)
            .bind(user_id)
            .bind(emoji)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finds a single reaction triple.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find(
        &self,
        conn: &mut PgConnection,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
    ) -> Result<Option<Reaction>> {
        let record = sqlx::query_as::<_, ReactionRecord>(
            r"
            SELECT id, message_id, user_id, emoji, created_at
            FROM message_reactions
            WHERE message_id = $1 AND user_id = $2 AND emoji = $3
            ",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// Loads the reactions of several messages joined with their users, oldest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn), fields(count = message_ids.len()))]
    pub(crate) async fn entries_for_messages(
        &self,
        conn: &mut PgConnection,
        message_ids: &[Uuid],
    ) -> Result<Vec<ReactionEntry>> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, ReactionEntryRecord>(
            r"
            SELECT r.message_id, r.emoji, u.id AS user_id, u.name AS user_name
            FROM message_reactions r
            LEFT JOIN users u ON u.id = r.user_id
            WHERE r.message_id = ANY($1)
            ORDER BY r.created_at ASC, r.id ASC
            ",
        )
        .bind(message_ids)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}

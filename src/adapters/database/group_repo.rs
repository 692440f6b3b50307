use crate::adapters::database::is_foreign_key_violation;
use crate::adapters::database::records::{GroupRecord, SummaryRecord};
use crate::domain::conversation::{ConversationKind, ConversationSummary, Group};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct GroupRepository {}

impl GroupRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Creates a group and its member rows. The owner is always a member.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the owner or a member does not exist.
    /// Returns `AppError::Database` if an insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, member_ids), fields(members = member_ids.len()))]
    pub(crate) async fn create(
        &self,
        conn: &mut PgConnection,
        name: &str,
        owner_id: Uuid,
        member_ids: &[Uuid],
    ) -> Result<Group> {
        let group = sqlx::query_as::<_, GroupRecord>(
            r"
            INSERT INTO groups (id, name, owner_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, owner_id, last_message_id
            ",
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(owner_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| if is_foreign_key_violation(&e) { AppError::NotFound } else { AppError::Database(e) })?;

        let mut members: Vec<Uuid> = member_ids.to_vec();
        members.push(owner_id);
        members.sort_unstable();
        members.dedup();

        sqlx::query(
            r"
            INSERT INTO group_users (group_id, user_id)
            SELECT $1, member FROM UNNEST($2::uuid[]) AS member
            ",
        )
        .bind(group.id)
        .bind(members.as_slice())
        .execute(conn)
        .await
        .map_err(|e| if is_foreign_key_violation(&e) { AppError::NotFound } else { AppError::Database(e) })?;

        Ok(group.into())
    }

    /// Finds a group by id.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Group>> {
        let record = sqlx::query_as::<_, GroupRecord>("SELECT id, name, owner_id, last_message_id FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;

        Ok(record.map(Into::into))
    }

    /// Locks a group row for the rest of the transaction.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Group>> {
        let record = sqlx::query_as::<_, GroupRecord>(
            "SELECT id, name, owner_id, last_message_id FROM groups WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(record.map(Into::into))
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn is_member(&self, conn: &mut PgConnection, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM group_users WHERE group_id = $1 AND user_id = $2)")
                .bind(group_id)
                .bind(user_id)
                .fetch_one(conn)
                .await?;
        Ok(exists)
    }

    /// Points the group at `message_id` unconditionally.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn set_last_message(&self, conn: &mut PgConnection, id: Uuid, message_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE groups SET last_message_id = $2, updated_at = NOW() WHERE id = $1")
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
            UPDATE groups
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

    /// Deletes a group with its messages and memberships.
    ///
    /// # Errors
    /// Returns `AppError::Database` if a delete fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> Result<()> {
        // Messages go first so the pointer is cleared before the group row disappears.
        sqlx::query("DELETE FROM messages WHERE group_id = $1").bind(id).execute(&mut *conn).await?;
        sqlx::query("DELETE FROM groups WHERE id = $1").bind(id).execute(conn).await?;
        Ok(())
    }

    /// Lists the groups a user belongs to with their last message preview.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn summaries_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<ConversationSummary>> {
        let records = sqlx::query_as::<_, SummaryRecord>(
            r"
            SELECT g.id, g.name, m.message AS last_message, m.created_at AS last_message_date
            FROM groups g
            JOIN group_users gu ON gu.group_id = g.id AND gu.user_id = $1
            LEFT JOIN messages m ON m.id = g.last_message_id
            ",
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(|r| r.into_summary(ConversationKind::Group)).collect())
    }
}

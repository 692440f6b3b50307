use crate::adapters::database::DbPool;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::reaction_repo::ReactionRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::config::MessagingConfig;
use crate::domain::event::{Channel, ChatEvent, Envelope};
use crate::domain::reaction::{Reaction, ReactionAction, ReactionChange, validate_emoji};
use crate::error::{AppError, Result};
use crate::services::access::AccessPolicy;
use crate::services::broadcast::Broadcaster;
use opentelemetry::{KeyValue, global, metrics::Counter};
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) changes_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            changes_total: meter
                .u64_counter("parley_reaction_changes_total")
                .with_description("Reaction requests, by action and whether state changed")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReactionService {
    pool: DbPool,
    reactions: ReactionRepository,
    messages: MessageRepository,
    users: UserRepository,
    access: AccessPolicy,
    broadcaster: Arc<dyn Broadcaster>,
    max_emoji_chars: usize,
    metrics: Metrics,
}

impl ReactionService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        reactions: ReactionRepository,
        messages: MessageRepository,
        users: UserRepository,
        access: AccessPolicy,
        broadcaster: Arc<dyn Broadcaster>,
        config: &MessagingConfig,
    ) -> Self {
        Self {
            pool,
            reactions,
            messages,
            users,
            access,
            broadcaster,
            max_emoji_chars: config.max_emoji_chars,
            metrics: Metrics::new(),
        }
    }

    /// Adds a reaction. Repeating an existing reaction succeeds without a second row or event.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the emoji is empty or too long.
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the actor cannot see the message.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id, message_id = %message_id))]
    pub async fn add(&self, actor_id: Uuid, message_id: Uuid, emoji: &str) -> Result<Reaction> {
        let emoji = validate_emoji(emoji, self.max_emoji_chars)?;
        let mut conn = self.pool.acquire().await?;
        self.authorize(&mut conn, actor_id, message_id).await?;

        let (reaction, created) = self.reactions.add(&mut conn, message_id, actor_id, emoji).await?;
        self.record(ReactionAction::Add, created);
        if created {
            self.announce(&mut conn, actor_id, message_id, emoji, ReactionAction::Add).await?;
        }

        Ok(reaction)
    }

    /// Removes a reaction. Removing one that does not exist is a no-op.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the emoji is empty or too long.
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the actor cannot see the message.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id, message_id = %message_id))]
    pub async fn remove(&self, actor_id: Uuid, message_id: Uuid, emoji: &str) -> Result<()> {
        let emoji = validate_emoji(emoji, self.max_emoji_chars)?;
        let mut conn = self.pool.acquire().await?;
        self.authorize(&mut conn, actor_id, message_id).await?;

        let removed = self.reactions.remove(&mut conn, message_id, actor_id, emoji).await?;
        self.record(ReactionAction::Remove, removed);
        if removed {
            self.announce(&mut conn, actor_id, message_id, emoji, ReactionAction::Remove).await?;
        } else {
            tracing::debug!("No reaction to remove");
        }

        Ok(())
    }

    async fn authorize(&self, conn: &mut PgConnection, actor_id: Uuid, message_id: Uuid) -> Result<()> {
        let message = self.messages.find_by_id(conn, message_id).await?.ok_or(AppError::NotFound)?;
        if self.access.can_view(conn, actor_id, &message).await? { Ok(()) } else { Err(AppError::Forbidden) }
    }

    async fn announce(
        &self,
        conn: &mut PgConnection,
        actor_id: Uuid,
        message_id: Uuid,
        emoji: &str,
        action: ReactionAction,
    ) -> Result<()> {
        let Some(user) = self.users.find_by_id(conn, actor_id).await? else {
            tracing::warn!("Reacting user has no profile, skipping broadcast");
            return Ok(());
        };

        let change = ReactionChange { message_id, user: user.summary(), emoji: emoji.to_string(), action };
        self.broadcaster
            .publish(
                Envelope::new(Channel::message(message_id), ChatEvent::MessageReacted { reaction: change })
                    .from_actor(actor_id),
            )
            .await;
        Ok(())
    }

    fn record(&self, action: ReactionAction, changed: bool) {
        let action = match action {
            ReactionAction::Add => "add",
            ReactionAction::Remove => "remove",
        };
        self.metrics
            .changes_total
            .add(1, &[KeyValue::new("action", action), KeyValue::new("changed", changed)]);
    }
}

use crate::adapters::database::DbPool;
use crate::adapters::database::attachment_repo::AttachmentRepository;
use crate::adapters::database::group_repo::GroupRepository;
use crate::adapters::database::message_repo::MessageRepository;
use crate::adapters::database::reaction_repo::ReactionRepository;
use crate::adapters::database::user_repo::UserRepository;
use crate::config::MessagingConfig;
use crate::domain::event::{Channel, ChatEvent, Envelope};
use crate::domain::message::{ConversationKey, Message, MessageTarget, NewMessage};
use crate::domain::reaction::group_reactions_by_message;
use crate::error::{AppError, Result};
use crate::services::access::AccessPolicy;
use crate::services::broadcast::Broadcaster;
use crate::services::last_message::LastMessageTracker;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use sqlx::PgConnection;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
    pub(crate) deleted_total: Counter<u64>,
    pub(crate) page_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            sent_total: meter
                .u64_counter("parley_messages_sent_total")
                .with_description("Total messages sent, by status")
                .build(),
            deleted_total: meter
                .u64_counter("parley_messages_deleted_total")
                .with_description("Total messages deleted")
                .build(),
            page_size: meter
                .u64_histogram("parley_message_page_size")
                .with_description("Number of messages returned in a single page")
                .build(),
        }
    }
}

/// Repositories the message service reads and writes.
#[derive(Clone, Debug, Default)]
pub struct MessageRepositories {
    pub messages: MessageRepository,
    pub attachments: AttachmentRepository,
    pub reactions: ReactionRepository,
    pub groups: GroupRepository,
    pub users: UserRepository,
}

#[derive(Clone, Debug)]
pub struct MessageService {
    pool: DbPool,
    repos: MessageRepositories,
    tracker: LastMessageTracker,
    access: AccessPolicy,
    broadcaster: Arc<dyn Broadcaster>,
    config: MessagingConfig,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(
        pool: DbPool,
        repos: MessageRepositories,
        tracker: LastMessageTracker,
        access: AccessPolicy,
        broadcaster: Arc<dyn Broadcaster>,
        config: MessagingConfig,
    ) -> Self {
        Self { pool, repos, tracker, access, broadcaster, config, metrics: Metrics::new() }
    }

    /// Stores a message with its attachments, moves the conversation's
    /// last-message pointer to it and publishes `message.created`.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the message is invalid or addressed to the sender.
    /// Returns `AppError::Forbidden` if the sender is not a member of the target group.
    /// Returns `AppError::NotFound` if the receiver, group or replied-to message does not exist.
    #[tracing::instrument(err(level = "warn"), skip(self, new_message), fields(sender_id = %sender_id))]
    pub async fn send(&self, sender_id: Uuid, new_message: NewMessage) -> Result<Message> {
        let new_message = new_message.validate(self.config.max_body_chars, self.config.max_attachments)?;
        if new_message.target == MessageTarget::Direct(sender_id) {
            return Err(AppError::BadRequest("Cannot send a message to yourself".into()));
        }
        let key = ConversationKey::of(sender_id, new_message.target);

        let result = self.store(sender_id, key, &new_message).await;
        let status = if result.is_ok() { "success" } else { "failure" };
        self.metrics.sent_total.add(1, &[KeyValue::new("status", status)]);
        let message = result?;

        tracing::debug!(message_id = %message.id, "Message stored");
        self.broadcaster
            .publish(Envelope::new(Channel::conversation(key), ChatEvent::MessageCreated { message: message.clone() }))
            .await;

        Ok(message)
    }

    async fn store(&self, sender_id: Uuid, key: ConversationKey, new_message: &NewMessage) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        if let ConversationKey::Group(group_id) = key
            && !self.repos.groups.is_member(&mut tx, group_id, sender_id).await?
        {
            // Distinguish a missing group from one the sender is not part of.
            return Err(match self.repos.groups.find(&mut tx, group_id).await? {
                Some(_) => AppError::Forbidden,
                None => AppError::NotFound,
            });
        }

        if let Some(reply_to_id) = new_message.reply_to_id {
            let parent = self.repos.messages.find_by_id(&mut tx, reply_to_id).await?.ok_or(AppError::NotFound)?;
            if parent.conversation_key() != key {
                return Err(AppError::BadRequest("Replies must stay in the same conversation".into()));
            }
        }

        let owner = self.tracker.lock_for_send(&mut tx, key).await?;
        let mut message = self
            .repos
            .messages
            .create(&mut tx, sender_id, new_message.target, new_message.body.as_deref(), new_message.reply_to_id)
            .await?;
        message.attachments = self.repos.attachments.create_many(&mut tx, message.id, &new_message.attachments).await?;
        self.tracker.on_message_created(&mut tx, &owner, message.id).await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Deletes one of the actor's own messages and returns the conversation's
    /// last message afterwards, or `None` if nothing remains.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the message does not exist.
    /// Returns `AppError::Forbidden` if the actor is not the sender.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id, message_id = %message_id))]
    pub async fn delete(&self, actor_id: Uuid, message_id: Uuid) -> Result<Option<Message>> {
        let mut tx = self.pool.begin().await?;

        let message = self.repos.messages.find_by_id(&mut tx, message_id).await?.ok_or(AppError::NotFound)?;
        if message.sender_id != actor_id {
            return Err(AppError::Forbidden);
        }

        let owner = self.tracker.lock_for_delete(&mut tx, message.conversation_key()).await?;
        if self.repos.messages.delete(&mut tx, message.id).await? == 0 {
            // Lost a race with another delete of the same message.
            return Err(AppError::NotFound);
        }
        let current_id = self.tracker.on_message_deleted(&mut tx, owner.as_ref(), &message).await?;
        tx.commit().await?;
        self.metrics.deleted_total.add(1, &[]);

        let mut conn = self.pool.acquire().await?;
        let current = match current_id {
            Some(id) => match self.repos.messages.find_by_id(&mut conn, id).await? {
                Some(m) => self.hydrate(&mut conn, vec![m]).await?.pop(),
                None => None,
            },
            None => None,
        };

        self.broadcaster
            .publish(Envelope::new(
                Channel::conversation(message.conversation_key()),
                ChatEvent::MessageDeleted { message, prev_message: current.clone() },
            ))
            .await;

        Ok(current)
    }

    /// Returns the page of messages strictly older than `reference_id` in the
    /// same conversation, newest first.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the reference message does not exist.
    /// Returns `AppError::Forbidden` if the actor cannot see the conversation.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id))]
    pub async fn load_older(&self, actor_id: Uuid, reference_id: Uuid) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;

        let reference = self.repos.messages.find_by_id(&mut conn, reference_id).await?.ok_or(AppError::NotFound)?;
        if !self.access.can_view(&mut conn, actor_id, &reference).await? {
            return Err(AppError::Forbidden);
        }

        self.page(&mut conn, reference.conversation_key(), Some(reference)).await
    }

    /// Latest page of the actor's direct conversation with `other_id`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if either user does not exist.
    /// Returns `AppError::Forbidden` if the actor may not open this conversation.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id))]
    pub async fn latest_direct(&self, actor_id: Uuid, other_id: Uuid) -> Result<Vec<Message>> {
        if actor_id == other_id {
            return Err(AppError::BadRequest("Cannot open a conversation with yourself".into()));
        }
        let mut conn = self.pool.acquire().await?;

        let actor = self.repos.users.find_by_id(&mut conn, actor_id).await?.ok_or(AppError::NotFound)?;
        if self.repos.users.find_by_id(&mut conn, other_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        if !actor.may_open_conversation_with(other_id) {
            return Err(AppError::Forbidden);
        }

        self.page(&mut conn, ConversationKey::direct(actor_id, other_id), None).await
    }

    /// Latest page of a group the actor belongs to.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the group does not exist.
    /// Returns `AppError::Forbidden` if the actor is not a member.
    #[tracing::instrument(err(level = "warn"), skip(self), fields(actor_id = %actor_id))]
    pub async fn latest_group(&self, actor_id: Uuid, group_id: Uuid) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;

        if self.repos.groups.find(&mut conn, group_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        let key = ConversationKey::Group(group_id);
        if !self.access.can_access(&mut conn, actor_id, key).await? {
            return Err(AppError::Forbidden);
        }

        self.page(&mut conn, key, None).await
    }

    async fn page(&self, conn: &mut PgConnection, key: ConversationKey, before: Option<Message>) -> Result<Vec<Message>> {
        let messages =
            self.repos.messages.fetch_page(conn, key, before.map(|m| m.created_at), self.config.page_size).await?;
        self.metrics.page_size.record(messages.len() as u64, &[]);
        self.hydrate(conn, messages).await
    }

    /// Attaches attachment metadata and grouped reactions to a batch of messages.
    async fn hydrate(&self, conn: &mut PgConnection, mut messages: Vec<Message>) -> Result<Vec<Message>> {
        if messages.is_empty() {
            return Ok(messages);
        }
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();

        let mut attachments: HashMap<Uuid, Vec<_>> = HashMap::new();
        for attachment in self.repos.attachments.for_messages(conn, &ids).await? {
            attachments.entry(attachment.message_id).or_default().push(attachment);
        }
        let mut reactions = group_reactions_by_message(self.repos.reactions.entries_for_messages(conn, &ids).await?);

        for message in &mut messages {
            message.attachments = attachments.remove(&message.id).unwrap_or_default();
            message.reactions = reactions.remove(&message.id).unwrap_or_default();
        }
        Ok(messages)
    }
}

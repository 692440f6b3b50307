use crate::domain::event::ChatEvent;
use crate::domain::message::{ConversationKey, Message};
use crate::domain::reaction::{ReactionAction, ReactionChange};
use uuid::Uuid;

/// Scroll metrics of the message list, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollPosition {
    pub top: u32,
    pub height: u32,
}

impl ScrollPosition {
    const fn distance_from_bottom(self) -> u32 {
        self.height.saturating_sub(self.top)
    }
}

/// A pending "load older" request. Hand it back to
/// [`MessageFeed::finish_load_older`] together with the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OlderRequest {
    generation: u64,
    /// Fetch messages strictly older than this one.
    pub before: Uuid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OlderOutcome {
    /// Messages were added to the head of the list.
    Prepended(usize),
    /// The server has nothing older. No further requests are issued for this view.
    Exhausted,
    /// The page belongs to a view that is no longer open.
    Discarded,
}

/// What applying an event did to the open view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedUpdate {
    Appended,
    Removed {
        /// The view's new last message when the deletion carried one for it.
        last_message: Option<Message>,
    },
    ReactionsChanged,
    /// The open group was deleted and the view is now closed.
    Closed,
    Ignored,
}

/// Loaded messages of the open conversation, oldest first.
#[derive(Debug, Default)]
pub struct MessageFeed {
    view: Option<ConversationKey>,
    messages: Vec<Message>,
    no_more: bool,
    generation: u64,
    pending_older: Option<u64>,
    scroll_anchor: Option<u32>,
}

impl MessageFeed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to `view` and seeds it with the latest page, which the server
    /// returns newest first.
    pub fn open(&mut self, view: ConversationKey, latest: Vec<Message>) {
        self.generation += 1;
        self.view = Some(view);
        self.messages = latest.into_iter().rev().filter(|m| m.conversation_key() == view).collect();
        self.no_more = false;
        self.pending_older = None;
        self.scroll_anchor = None;
    }

    pub fn close(&mut self) {
        self.generation += 1;
        self.view = None;
        self.messages.clear();
        self.no_more = false;
        self.pending_older = None;
        self.scroll_anchor = None;
    }

    #[must_use]
    pub const fn view(&self) -> Option<ConversationKey> {
        self.view
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// True once a "load older" request came back empty.
    #[must_use]
    pub const fn no_more(&self) -> bool {
        self.no_more
    }

    pub fn apply(&mut self, event: &ChatEvent) -> FeedUpdate {
        match event {
            ChatEvent::MessageCreated { message } => self.append(message),
            ChatEvent::MessageDeleted { message, prev_message } => self.remove(message, prev_message.as_ref()),
            ChatEvent::MessageReacted { reaction } => self.react(reaction),
            ChatEvent::GroupDeleted { id, .. } => {
                if self.view != Some(ConversationKey::Group(*id)) {
                    return FeedUpdate::Ignored;
                }
                self.close();
                FeedUpdate::Closed
            }
            ChatEvent::PresenceHere { .. } | ChatEvent::PresenceJoining { .. } | ChatEvent::PresenceLeaving { .. } => {
                FeedUpdate::Ignored
            }
        }
    }

    fn append(&mut self, message: &Message) -> FeedUpdate {
        if self.view != Some(message.conversation_key()) || self.position(message.id).is_some() {
            return FeedUpdate::Ignored;
        }
        self.messages.push(message.clone());
        FeedUpdate::Appended
    }

    fn remove(&mut self, message: &Message, prev_message: Option<&Message>) -> FeedUpdate {
        if self.view != Some(message.conversation_key()) {
            return FeedUpdate::Ignored;
        }
        if let Some(index) = self.position(message.id) {
            self.messages.remove(index);
        }

        let last_message = prev_message.filter(|prev| self.view == Some(prev.conversation_key())).cloned();
        FeedUpdate::Removed { last_message }
    }

    fn react(&mut self, change: &ReactionChange) -> FeedUpdate {
        let Some(index) = self.position(change.message_id) else {
            return FeedUpdate::Ignored;
        };
        let reactions = &mut self.messages[index].reactions;

        match change.action {
            ReactionAction::Add => {
                let users = reactions.entry(change.emoji.clone()).or_default();
                if users.iter().any(|u| u.id == change.user.id) {
                    return FeedUpdate::Ignored;
                }
                users.push(change.user.clone());
            }
            ReactionAction::Remove => {
                let Some(users) = reactions.get_mut(&change.emoji) else {
                    return FeedUpdate::Ignored;
                };
                let before = users.len();
                users.retain(|u| u.id != change.user.id);
                if users.len() == before {
                    return FeedUpdate::Ignored;
                }
                if users.is_empty() {
                    reactions.remove(&change.emoji);
                }
            }
        }
        FeedUpdate::ReactionsChanged
    }

    /// Starts loading the page before the oldest loaded message and records
    /// the scroll offset to restore once it is prepended.
    ///
    /// Returns `None` when nothing should be requested: no open view, an
    /// empty list, a request already in flight, or the history is exhausted.
    pub fn begin_load_older(&mut self, scroll: ScrollPosition) -> Option<OlderRequest> {
        if self.view.is_none() || self.no_more || self.pending_older.is_some() {
            return None;
        }
        let oldest = self.messages.first()?;

        self.pending_older = Some(self.generation);
        self.scroll_anchor = Some(scroll.distance_from_bottom());
        Some(OlderRequest { generation: self.generation, before: oldest.id })
    }

    /// Applies an older page, newest first as the server returns it.
    pub fn finish_load_older(&mut self, request: OlderRequest, page: Vec<Message>) -> OlderOutcome {
        if request.generation != self.generation {
            return OlderOutcome::Discarded;
        }
        self.pending_older = None;

        if page.is_empty() {
            self.no_more = true;
            self.scroll_anchor = None;
            return OlderOutcome::Exhausted;
        }

        let view = self.view;
        let mut older: Vec<Message> = page
            .into_iter()
            .rev()
            .filter(|m| view == Some(m.conversation_key()) && self.position(m.id).is_none())
            .collect();
        let added = older.len();
        older.append(&mut self.messages);
        self.messages = older;
        OlderOutcome::Prepended(added)
    }

    /// Releases an in-flight request that failed so a later one can be issued.
    pub fn fail_load_older(&mut self, request: OlderRequest) {
        if request.generation == self.generation {
            self.pending_older = None;
            self.scroll_anchor = None;
        }
    }

    /// Scroll offset that keeps the same content in view after the list grew
    /// to `new_height`. Consumes the anchor captured by `begin_load_older`.
    pub fn restore_scroll(&mut self, new_height: u32) -> Option<u32> {
        self.scroll_anchor.take().map(|distance| new_height.saturating_sub(distance))
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.messages.iter().position(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageTarget;
    use crate::domain::reaction::GroupedReactions;
    use crate::domain::user::UserSummary;
    use time::{Duration, OffsetDateTime};

    struct Chat {
        alice: Uuid,
        bob: Uuid,
        clock: OffsetDateTime,
    }

    impl Chat {
        fn new() -> Self {
            Self { alice: Uuid::new_v4(), bob: Uuid::new_v4(), clock: OffsetDateTime::UNIX_EPOCH }
        }

        fn key(&self) -> ConversationKey {
            ConversationKey::direct(self.alice, self.bob)
        }

        fn say(&mut self, body: &str) -> Message {
            self.clock += Duration::seconds(1);
            Message {
                id: Uuid::now_v7(),
                sender_id: self.alice,
                target: MessageTarget::Direct(self.bob),
                body: Some(body.into()),
                reply_to_id: None,
                created_at: self.clock,
                attachments: vec![],
                reactions: GroupedReactions::new(),
            }
        }
    }

    fn bodies(feed: &MessageFeed) -> Vec<&str> {
        feed.messages().iter().filter_map(|m| m.body.as_deref()).collect()
    }

    fn newest_first(mut messages: Vec<Message>) -> Vec<Message> {
        messages.reverse();
        messages
    }

    #[test]
    fn test_open_orders_oldest_first() {
        let mut chat = Chat::new();
        let page = newest_first(vec![chat.say("one"), chat.say("two")]);

        let mut feed = MessageFeed::new();
        feed.open(chat.key(), page);

        assert_eq!(bodies(&feed), ["one", "two"]);
        assert!(!feed.no_more());
    }

    #[test]
    fn test_created_appends_once_and_only_for_open_view() {
        let mut chat = Chat::new();
        let mut other = Chat::new();
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![]);

        let hi = chat.say("hi");
        let event = ChatEvent::MessageCreated { message: hi };
        assert_eq!(feed.apply(&event), FeedUpdate::Appended);
        assert_eq!(feed.apply(&event), FeedUpdate::Ignored);

        let elsewhere = ChatEvent::MessageCreated { message: other.say("elsewhere") };
        assert_eq!(feed.apply(&elsewhere), FeedUpdate::Ignored);

        assert_eq!(bodies(&feed), ["hi"]);
    }

    #[test]
    fn test_deleted_removes_and_reports_previous() {
        let mut chat = Chat::new();
        let first = chat.say("first");
        let second = chat.say("second");
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), newest_first(vec![first.clone(), second.clone()]));

        let update = feed.apply(&ChatEvent::MessageDeleted { message: second.clone(), prev_message: Some(first.clone()) });

        assert_eq!(update, FeedUpdate::Removed { last_message: Some(first) });
        assert_eq!(bodies(&feed), ["first"]);
        assert_eq!(
            feed.apply(&ChatEvent::MessageDeleted { message: second, prev_message: None }),
            FeedUpdate::Removed { last_message: None }
        );
        assert_eq!(bodies(&feed), ["first"]);
    }

    #[test]
    fn test_deleted_unloaded_message_still_reports_previous() {
        let mut chat = Chat::new();
        let unloaded = chat.say("scrolled away");
        let latest = chat.say("latest");
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![latest.clone()]);

        let update = feed.apply(&ChatEvent::MessageDeleted { message: unloaded, prev_message: Some(latest.clone()) });

        assert_eq!(update, FeedUpdate::Removed { last_message: Some(latest) });
        assert_eq!(bodies(&feed), ["latest"]);
    }

    #[test]
    fn test_deleted_in_other_view_is_ignored() {
        let mut chat = Chat::new();
        let mut other = Chat::new();
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![chat.say("mine")]);

        let gone = other.say("gone");
        let prev = other.say("prev");
        assert_eq!(feed.apply(&ChatEvent::MessageDeleted { message: gone, prev_message: Some(prev) }), FeedUpdate::Ignored);
    }

    #[test]
    fn test_reaction_events_update_loaded_message() {
        let mut chat = Chat::new();
        let hi = chat.say("hi");
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![hi.clone()]);

        let bob = UserSummary { id: chat.bob, name: "bob".into() };
        let add = ChatEvent::MessageReacted {
            reaction: ReactionChange { message_id: hi.id, user: bob.clone(), emoji: "👍".into(), action: ReactionAction::Add },
        };
        assert_eq!(feed.apply(&add), FeedUpdate::ReactionsChanged);
        assert_eq!(feed.apply(&add), FeedUpdate::Ignored);
        assert_eq!(feed.messages()[0].reactions["👍"], vec![bob.clone()]);

        let remove = ChatEvent::MessageReacted {
            reaction: ReactionChange { message_id: hi.id, user: bob, emoji: "👍".into(), action: ReactionAction::Remove },
        };
        assert_eq!(feed.apply(&remove), FeedUpdate::ReactionsChanged);
        assert!(feed.messages()[0].reactions.is_empty());
    }

    #[test]
    fn test_load_older_prepends_and_restores_scroll() {
        let mut chat = Chat::new();
        let old_a = chat.say("a");
        let old_b = chat.say("b");
        let latest = chat.say("c");
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![latest.clone()]);

        let request = feed.begin_load_older(ScrollPosition { top: 100, height: 400 }).unwrap();
        assert_eq!(request.before, latest.id);
        assert!(feed.begin_load_older(ScrollPosition::default()).is_none(), "one request at a time");

        let outcome = feed.finish_load_older(request, newest_first(vec![old_a, old_b]));

        assert_eq!(outcome, OlderOutcome::Prepended(2));
        assert_eq!(bodies(&feed), ["a", "b", "c"]);
        assert_eq!(feed.restore_scroll(700), Some(400));
        assert_eq!(feed.restore_scroll(700), None);
    }

    #[test]
    fn test_empty_older_page_stops_further_requests() {
        let mut chat = Chat::new();
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![chat.say("only")]);

        let request = feed.begin_load_older(ScrollPosition::default()).unwrap();
        assert_eq!(feed.finish_load_older(request, vec![]), OlderOutcome::Exhausted);

        assert!(feed.no_more());
        assert!(feed.begin_load_older(ScrollPosition::default()).is_none());

        feed.open(chat.key(), vec![chat.say("again")]);
        assert!(!feed.no_more());
        assert!(feed.begin_load_older(ScrollPosition::default()).is_some());
    }

    #[test]
    fn test_page_for_previous_view_is_discarded() {
        let mut chat = Chat::new();
        let mut other = Chat::new();
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![chat.say("latest")]);

        let request = feed.begin_load_older(ScrollPosition::default()).unwrap();
        feed.open(other.key(), vec![other.say("other")]);

        assert_eq!(feed.finish_load_older(request, vec![chat.say("stale")]), OlderOutcome::Discarded);
        assert_eq!(bodies(&feed), ["other"]);
        assert!(!feed.no_more());
    }

    #[test]
    fn test_failed_request_can_be_retried() {
        let mut chat = Chat::new();
        let mut feed = MessageFeed::new();
        feed.open(chat.key(), vec![chat.say("latest")]);

        let request = feed.begin_load_older(ScrollPosition::default()).unwrap();
        feed.fail_load_older(request);

        assert!(feed.begin_load_older(ScrollPosition::default()).is_some());
    }

    #[test]
    fn test_deleting_open_group_closes_view() {
        let group = Uuid::new_v4();
        let mut feed = MessageFeed::new();
        feed.open(ConversationKey::Group(group), vec![]);

        let other = ChatEvent::GroupDeleted { id: Uuid::new_v4(), name: "other".into() };
        assert_eq!(feed.apply(&other), FeedUpdate::Ignored);
        assert_eq!(feed.view(), Some(ConversationKey::Group(group)));

        let deleted = ChatEvent::GroupDeleted { id: group, name: "team".into() };
        assert_eq!(feed.apply(&deleted), FeedUpdate::Closed);
        assert_eq!(feed.view(), None);
        assert!(feed.messages().is_empty());
    }
}

use crate::domain::event::{Channel, ChatEvent, Envelope};
use crate::domain::user::UserSummary;
use crate::services::broadcast::Broadcaster;
use dashmap::DashMap;
use opentelemetry::{global, metrics::UpDownCounter};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    online_users: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            online_users: meter
                .i64_up_down_counter("parley_presence_local_users")
                .with_description("Users with at least one gateway session on this node")
                .build(),
        }
    }
}

/// Tracks who is online. Sessions are counted per node; the member map is
/// fed from the `online` channel so it also covers other nodes.
#[derive(Clone, Debug)]
pub struct PresenceService {
    local_sessions: Arc<DashMap<Uuid, (UserSummary, usize)>>,
    members: Arc<DashMap<Uuid, UserSummary>>,
    broadcaster: Arc<dyn Broadcaster>,
    metrics: Metrics,
}

impl PresenceService {
    /// Creates the registry and starts applying `online` channel events to it.
    pub async fn new(broadcaster: Arc<dyn Broadcaster>, shutdown: watch::Receiver<bool>) -> Self {
        let service = Self {
            local_sessions: Arc::new(DashMap::new()),
            members: Arc::new(DashMap::new()),
            broadcaster,
            metrics: Metrics::new(),
        };

        let rx = service.broadcaster.subscribe(&Channel::online()).await;
        tokio::spawn(service.clone().follow(rx, shutdown).instrument(tracing::info_span!("presence_listener")));

        service
    }

    /// Registers a gateway session. The user's first session announces them.
    pub async fn join(&self, user: UserSummary) {
        let first = {
            let mut entry = self.local_sessions.entry(user.id).or_insert_with(|| (user.clone(), 0));
            entry.1 += 1;
            entry.1 == 1
        };
        self.members.insert(user.id, user.clone());

        if first {
            self.metrics.online_users.add(1, &[]);
            tracing::debug!(user_id = %user.id, "User came online");
            self.broadcaster.publish(Envelope::new(Channel::online(), ChatEvent::PresenceJoining { user })).await;
        }
    }

    /// Ends a gateway session. Closing the user's last session announces their departure.
    pub async fn leave(&self, user_id: Uuid) {
        let removed = self.local_sessions.remove_if_mut(&user_id, |_, (_, count)| {
            *count = count.saturating_sub(1);
            *count == 0
        });

        if let Some((_, (user, _))) = removed {
            self.members.remove(&user_id);
            self.metrics.online_users.add(-1, &[]);
            tracing::debug!(user_id = %user_id, "User went offline");
            self.broadcaster.publish(Envelope::new(Channel::online(), ChatEvent::PresenceLeaving { user })).await;
        }
    }

    /// Everyone currently online, ordered by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<UserSummary> {
        let mut users: Vec<UserSummary> = self.members.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        users
    }

    async fn follow(self, mut rx: broadcast::Receiver<Arc<Envelope>>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                received = rx.recv() => match received {
                    Ok(envelope) => self.apply(&envelope.event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Presence listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    async fn apply(&self, event: &ChatEvent) {
        match event {
            ChatEvent::PresenceJoining { user } => {
                self.members.insert(user.id, user.clone());
            }
            ChatEvent::PresenceLeaving { user } => {
                let still_here = self.local_sessions.get(&user.id).map(|e| e.value().0.clone());
                if let Some(local) = still_here {
                    // Another node saw the user's last session there close; this node still holds one.
                    self.broadcaster
                        .publish(Envelope::new(Channel::online(), ChatEvent::PresenceJoining { user: local }))
                        .await;
                } else {
                    self.members.remove(&user.id);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BroadcastConfig;
    use crate::services::broadcast::InMemoryBroadcaster;
    use std::time::Duration;

    async fn service() -> (PresenceService, Arc<dyn Broadcaster>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let broadcaster: Arc<dyn Broadcaster> = Arc::new(InMemoryBroadcaster::new(
            &BroadcastConfig { channel_capacity: 16, gc_interval_secs: 60 },
            rx.clone(),
        ));
        (PresenceService::new(Arc::clone(&broadcaster), rx).await, broadcaster, tx)
    }

    fn user(name: &str) -> UserSummary {
        UserSummary { id: Uuid::new_v4(), name: name.into() }
    }

    #[tokio::test]
    async fn test_only_first_and_last_session_are_announced() {
        let (presence, broadcaster, _tx) = service().await;
        let mut events = broadcaster.subscribe(&Channel::online()).await;
        let alice = user("alice");

        presence.join(alice.clone()).await;
        presence.join(alice.clone()).await;
        presence.leave(alice.id).await;
        assert_eq!(presence.snapshot(), vec![alice.clone()]);
        presence.leave(alice.id).await;

        let first = events.recv().await.unwrap();
        assert_eq!(first.event, ChatEvent::PresenceJoining { user: alice.clone() });
        let second = events.recv().await.unwrap();
        assert_eq!(second.event, ChatEvent::PresenceLeaving { user: alice });
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_includes_remote_joins_and_is_sorted() {
        let (presence, broadcaster, _tx) = service().await;
        let bob = user("bob");
        let alice = user("alice");

        presence.join(bob.clone()).await;
        broadcaster
            .publish(Envelope::new(Channel::online(), ChatEvent::PresenceJoining { user: alice.clone() }))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(presence.snapshot(), vec![alice.clone(), bob]);

        broadcaster.publish(Envelope::new(Channel::online(), ChatEvent::PresenceLeaving { user: alice })).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(presence.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn test_remote_leave_does_not_evict_a_locally_connected_user() {
        let (presence, broadcaster, _tx) = service().await;
        let carol = user("carol");
        presence.join(carol.clone()).await;

        broadcaster
            .publish(Envelope::new(Channel::online(), ChatEvent::PresenceLeaving { user: carol.clone() }))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(presence.snapshot(), vec![carol]);
    }

    #[tokio::test]
    async fn test_leave_without_session_is_ignored() {
        let (presence, _broadcaster, _tx) = service().await;
        presence.leave(Uuid::new_v4()).await;
        assert!(presence.snapshot().is_empty());
    }
}

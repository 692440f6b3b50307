use crate::domain::event::Channel;
use std::collections::BTreeSet;

/// Channels to subscribe to and unsubscribe from, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDiff {
    pub join: Vec<Channel>,
    pub leave: Vec<Channel>,
}

impl ChannelDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.join.is_empty() && self.leave.is_empty()
    }
}

/// The channels a client is currently subscribed to.
#[derive(Debug, Default)]
pub struct ChannelSet {
    joined: BTreeSet<Channel>,
}

impl ChannelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `desired` the subscribed set and returns what changed.
    pub fn sync<I>(&mut self, desired: I) -> ChannelDiff
    where
        I: IntoIterator<Item = Channel>,
    {
        let desired: BTreeSet<Channel> = desired.into_iter().collect();
        let diff = ChannelDiff {
            join: desired.difference(&self.joined).cloned().collect(),
            leave: self.joined.difference(&desired).cloned().collect(),
        };
        self.joined = desired;
        diff
    }

    /// Leaves everything, e.g. when the view unmounts.
    pub fn clear(&mut self) -> Vec<Channel> {
        std::mem::take(&mut self.joined).into_iter().collect()
    }

    #[must_use]
    pub fn contains(&self, channel: &Channel) -> bool {
        self.joined.contains(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_sync_joins_new_and_leaves_stale() {
        let first = Channel::message(Uuid::new_v4());
        let second = Channel::message(Uuid::new_v4());
        let mut set = ChannelSet::new();

        let diff = set.sync([Channel::online(), first.clone()]);
        assert_eq!(diff.join.len(), 2);
        assert!(diff.leave.is_empty());

        let diff = set.sync([Channel::online(), second.clone()]);
        assert_eq!(diff, ChannelDiff { join: vec![second.clone()], leave: vec![first.clone()] });
        assert!(set.contains(&second));
        assert!(!set.contains(&first));
    }

    #[test]
    fn test_sync_with_same_set_is_empty() {
        let mut set = ChannelSet::new();
        set.sync([Channel::online()]);

        assert!(set.sync([Channel::online(), Channel::online()]).is_empty());
    }

    #[test]
    fn test_clear_returns_everything_joined() {
        let mut set = ChannelSet::new();
        set.sync([Channel::online()]);

        assert_eq!(set.clear(), vec![Channel::online()]);
        assert!(set.sync([]).is_empty());
    }
}

//! Client-side state kept in sync with the gateway's event stream.
//!
//! These types hold no I/O. A client feeds them server responses and
//! [`ChatEvent`](crate::domain::event::ChatEvent)s and renders from their state.

pub mod channels;
pub mod feed;
pub mod presence;
pub mod sidebar;

pub use channels::{ChannelDiff, ChannelSet};
pub use feed::{FeedUpdate, MessageFeed, OlderOutcome, OlderRequest, ScrollPosition};
pub use presence::PresenceTracker;
pub use sidebar::Sidebar;

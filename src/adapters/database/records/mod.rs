pub mod attachment;
pub mod conversation;
pub mod message;
pub mod reaction;
pub mod user;

pub use attachment::AttachmentRecord;
pub use conversation::{ConversationRecord, GroupRecord, SummaryRecord};
pub use message::MessageRecord;
pub use reaction::{ReactionEntryRecord, ReactionRecord, UpsertedReactionRecord};
pub use user::UserRecord;

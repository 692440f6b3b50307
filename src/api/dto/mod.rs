pub mod groups;
pub mod health;
pub mod messages;
pub mod reactions;

pub mod auth;
pub mod conversation;
pub mod event;
pub mod message;
pub mod reaction;
pub mod user;

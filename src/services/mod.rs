pub mod access;
pub mod broadcast;
pub mod conversation_service;
pub mod gateway;
pub mod health_service;
pub mod last_message;
pub mod message_service;
pub mod presence_service;
pub mod rate_limit_service;
pub mod reaction_service;

use crate::domain::reaction::Reaction;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Reaction>,
}

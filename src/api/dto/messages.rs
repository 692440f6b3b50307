use crate::domain::message::{Message, MessageTarget, NewAttachment, NewMessage};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub receiver_id: Option<Uuid>,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
    #[serde(default)]
    pub attachments: Vec<NewAttachment>,
}

impl TryFrom<SendMessageRequest> for NewMessage {
    type Error = crate::error::AppError;

    fn try_from(req: SendMessageRequest) -> Result<Self> {
        Ok(Self {
            target: MessageTarget::from_parts(req.receiver_id, req.group_id)?,
            body: req.message,
            reply_to_id: req.reply_to_id,
            attachments: req.attachments,
        })
    }
}

/// The conversation's last message after a delete, `null` when none remain.
#[derive(Debug, Serialize)]
pub struct DeleteMessageResponse {
    pub message: Option<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;

    #[test]
    fn test_request_requires_exactly_one_target() {
        let both: SendMessageRequest = serde_json::from_value(json!({
            "receiverId": Uuid::new_v4(),
            "groupId": Uuid::new_v4(),
            "message": "hi"
        }))
        .unwrap();
        assert!(matches!(NewMessage::try_from(both), Err(AppError::BadRequest(_))));

        let neither: SendMessageRequest = serde_json::from_value(json!({"message": "hi"})).unwrap();
        assert!(matches!(NewMessage::try_from(neither), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_request_maps_to_new_message() {
        let group = Uuid::new_v4();
        let req: SendMessageRequest = serde_json::from_value(json!({
            "groupId": group,
            "message": "hello",
            "attachments": [{"name": "a.pdf", "mime": "application/pdf", "size": 12, "path": "files/a.pdf"}]
        }))
        .unwrap();

        let new_message = NewMessage::try_from(req).unwrap();
        assert_eq!(new_message.target, MessageTarget::Group(group));
        assert_eq!(new_message.body.as_deref(), Some("hello"));
        assert_eq!(new_message.attachments.len(), 1);
    }
}

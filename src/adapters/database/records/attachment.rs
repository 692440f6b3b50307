use crate::domain::message::Attachment;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct AttachmentRecord {
    pub(crate) id: Uuid,
    pub(crate) message_id: Uuid,
    pub(crate) name: String,
    pub(crate) mime: String,
    pub(crate) size: i64,
    pub(crate) path: String,
}

impl From<AttachmentRecord> for Attachment {
    fn from(record: AttachmentRecord) -> Self {
        Self {
            id: record.id,
            message_id: record.message_id,
            name: record.name,
            mime: record.mime,
            size: record.size,
            path: record.path,
        }
    }
}

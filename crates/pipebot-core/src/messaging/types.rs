use crate::domain::{MessageId, NormalizedMessage, RawPayload, SenderId};

/// The message a reply quotes.
#[derive(Clone, Debug)]
pub struct QuotedMessage {
    pub message_id: MessageId,
    pub sender_id: SenderId,
    pub raw: RawPayload,
}

impl From<&NormalizedMessage> for QuotedMessage {
    fn from(m: &NormalizedMessage) -> Self {
        Self {
            message_id: m.message_id.clone(),
            sender_id: m.sender_id.clone(),
            raw: m.raw.clone(),
        }
    }
}

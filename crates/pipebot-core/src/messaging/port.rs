use async_trait::async_trait;

use crate::{domain::ChatId, messaging::types::QuotedMessage, Result};

/// Outbound send capability of the transport.
///
/// Failures are returned to the caller, which logs them; nothing here retries
/// beyond what the transport adapter itself does for flood control.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<()>;

    async fn send_reply(&self, chat_id: &ChatId, quoted: &QuotedMessage, text: &str)
        -> Result<()>;
}

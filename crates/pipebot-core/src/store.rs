use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, SenderId},
    errors::Error,
    Result,
};

/// One row of the message log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageLogEntry {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender_name: String,
    pub media_description: Option<String>,
    pub text: Option<String>,
}

/// Durable storage port.
///
/// Operations are domain-scoped and individually atomic. Implementations
/// perform no retries and report connectivity/constraint failures as
/// [`Error::Store`]; blank required fields are rejected with
/// [`Error::InvalidArgument`] before any I/O.
#[async_trait]
pub trait Store: Send + Sync {
    // Aliases
    async fn set_alias(&self, chat: &ChatId, sender: &SenderId, alias: &str) -> Result<()>;
    async fn get_alias(&self, chat: &ChatId, sender: &SenderId) -> Result<Option<String>>;

    // Group allow-list
    async fn add_group_allowed(&self, chat: &ChatId) -> Result<()>;
    async fn remove_group_allowed(&self, chat: &ChatId) -> Result<()>;
    async fn is_group_allowed(&self, chat: &ChatId) -> Result<bool>;

    // User allow-list
    async fn add_user_allowed(&self, sender: &SenderId) -> Result<()>;
    async fn remove_user_allowed(&self, sender: &SenderId) -> Result<()>;
    async fn is_user_allowed(&self, sender: &SenderId) -> Result<bool>;

    // Media descriptions
    async fn set_media_description(&self, hash: &str, description: &str) -> Result<()>;
    async fn get_media_description(&self, hash: &str) -> Result<Option<String>>;
    async fn remove_media_description(&self, hash: &str) -> Result<()>;

    // Message log
    async fn upsert_message_log(&self, entry: &MessageLogEntry) -> Result<()>;
    async fn patch_message_log_description(&self, id: &MessageId, description: &str)
        -> Result<()>;
    async fn patch_message_log_text(&self, id: &MessageId, text: &str) -> Result<()>;
    async fn get_message_log(&self, id: &MessageId) -> Result<Option<MessageLogEntry>>;
}

/// Trim and reject blank required fields. Shared by store implementations.
pub fn require<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let v = value.trim();
    if v.is_empty() {
        return Err(Error::invalid(format!("{what} is required")));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_trims_and_rejects_blank() {
        assert_eq!(require("  abc ", "x").unwrap(), "abc");
        assert!(matches!(
            require("   ", "chat id"),
            Err(Error::InvalidArgument(m)) if m == "chat id is required"
        ));
    }
}

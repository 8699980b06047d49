//! Telegram adapter (teloxide).
//!
//! Implements the core `MessagingPort` over the Telegram Bot API and turns
//! incoming updates into core events.

use async_trait::async_trait;
use teloxide::prelude::*;
use tokio::time::sleep;

pub mod convert;
pub mod router;

use pipebot_core::{
    domain::ChatId,
    errors::Error,
    messaging::{port::MessagingPort, types::QuotedMessage},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: &ChatId) -> Result<teloxide::types::ChatId> {
        chat_id
            .as_str()
            .trim()
            .parse::<i64>()
            .map(teloxide::types::ChatId)
            .map_err(|_| Error::invalid(format!("not a telegram chat id: {chat_id}")))
    }

    fn tg_msg_id(quoted: &QuotedMessage) -> Result<teloxide::types::MessageId> {
        convert::parse_message_key(quoted.message_id.as_str())
            .map(|(_, id)| teloxide::types::MessageId(id))
            .ok_or_else(|| {
                Error::invalid(format!("not a telegram message id: {}", quoted.message_id))
            })
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: &ChatId, text: &str) -> Result<()> {
        let chat = Self::tg_chat(chat_id)?;
        self.with_retry(|| self.bot.send_message(chat, text.to_string()))
            .await?;
        Ok(())
    }

    async fn send_reply(
        &self,
        chat_id: &ChatId,
        quoted: &QuotedMessage,
        text: &str,
    ) -> Result<()> {
        let chat = Self::tg_chat(chat_id)?;
        let reply_to = Self::tg_msg_id(quoted)?;
        self.with_retry(|| {
            self.bot
                .send_message(chat, text.to_string())
                .reply_to_message_id(reply_to)
        })
        .await?;
        Ok(())
    }
}

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{context::AppContext, domain::NormalizedMessage, store::MessageLogEntry};

use super::{is_live, log_name, send_text};

/// Log the text, then answer a mention of the bot if the message is live.
pub(super) async fn handle_text(ctx: &Arc<AppContext>, msg: &NormalizedMessage) {
    let entry = MessageLogEntry {
        message_id: msg.message_id.clone(),
        chat_id: msg.chat_id.clone(),
        sender_name: log_name(ctx, msg).await,
        media_description: None,
        text: Some(msg.text.clone()),
    };
    if let Err(e) = ctx.store.upsert_message_log(&entry).await {
        warn!(message_id = %msg.message_id, "failed to log text message: {e}");
    }

    if !is_live(ctx, msg) || !msg.mentions_identity(&ctx.self_id) {
        return;
    }

    debug!(chat = %msg.chat_id, "bot mentioned");
    let reply = ctx.config.current().prompts.mention_reply.clone();
    send_text(ctx, msg, &reply).await;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::{
        dispatch::dispatch,
        testing::{message, Harness, BOT_ID},
    };

    #[tokio::test]
    async fn live_mention_gets_a_reply() {
        let h = Harness::new();
        let mut msg = message("m1", "hey bot");
        msg.mentions = vec![BOT_ID.to_string()];

        dispatch(&h.ctx, msg).await;

        assert_eq!(h.messenger.texts(), vec!["👋".to_string()]);
        let row = h.log_row("m1").await.unwrap();
        assert_eq!(row.text.as_deref(), Some("hey bot"));
        assert_eq!(row.media_description, None);
    }

    #[tokio::test]
    async fn mention_of_someone_else_is_only_logged() {
        let h = Harness::new();
        let mut msg = message("m1", "hey carol");
        msg.mentions = vec!["carol".to_string()];

        dispatch(&h.ctx, msg).await;

        assert!(h.messenger.sent().is_empty());
        assert!(h.log_row("m1").await.is_some());
    }

    #[tokio::test]
    async fn historic_mention_is_logged_without_reply() {
        let h = Harness::new();
        let mut msg = message("m1", "old news");
        msg.mentions = vec![BOT_ID.to_string()];
        msg.timestamp = h.ctx.started_at - Duration::seconds(30);

        dispatch(&h.ctx, msg).await;

        assert!(h.messenger.sent().is_empty());
        let row = h.log_row("m1").await.unwrap();
        assert_eq!(row.text.as_deref(), Some("old news"));
    }

    #[tokio::test]
    async fn store_failure_is_not_reported_to_chat() {
        let h = Harness::new();
        h.store.fail_writes(true);

        dispatch(&h.ctx, message("m1", "hello")).await;

        assert!(h.messenger.sent().is_empty());
    }
}

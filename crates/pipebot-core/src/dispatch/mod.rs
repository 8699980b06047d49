//! Routes each classified message to exactly one handling path.

mod commands;
mod media;
mod text;

use std::sync::Arc;

use tracing::warn;

use crate::{
    context::AppContext,
    domain::{MediaKind, NormalizedMessage},
    messaging::types::QuotedMessage,
};

pub use commands::Command;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Image,
    Video,
    Audio,
    Command,
    Text,
}

/// First match wins: media kind, then the group-only `-` command prefix,
/// then plain text. Documents fall through to the text path.
pub fn route(msg: &NormalizedMessage) -> Route {
    match msg.media_kind {
        MediaKind::Image => Route::Image,
        MediaKind::Video => Route::Video,
        MediaKind::Audio => Route::Audio,
        _ if msg.is_command() => Route::Command,
        _ => Route::Text,
    }
}

pub async fn dispatch(ctx: &Arc<AppContext>, msg: NormalizedMessage) {
    match route(&msg) {
        Route::Image => media::handle_image(ctx, &msg).await,
        Route::Video => media::handle_video(&msg),
        Route::Audio => media::handle_audio(&msg),
        Route::Command => commands::handle_command(ctx, &msg).await,
        Route::Text => text::handle_text(ctx, &msg).await,
    }
}

/// Name written to the message log: alias in this chat, else the display
/// name, else the raw sender id.
async fn log_name(ctx: &AppContext, msg: &NormalizedMessage) -> String {
    match ctx.aliases.lookup(&msg.chat_id, &msg.sender_id).await {
        Ok(Some(alias)) => return alias,
        Ok(None) => {}
        Err(e) => warn!(chat = %msg.chat_id, sender = %msg.sender_id, "alias lookup failed: {e}"),
    }
    if !msg.sender_name.trim().is_empty() {
        return msg.sender_name.clone();
    }
    msg.sender_id.to_string()
}

/// The message was sent at or after startup.
fn is_live(ctx: &AppContext, msg: &NormalizedMessage) -> bool {
    msg.timestamp >= ctx.started_at
}

async fn send_text(ctx: &AppContext, msg: &NormalizedMessage, text: &str) {
    if let Err(e) = ctx.messenger.send_text(&msg.chat_id, text).await {
        warn!(chat = %msg.chat_id, "send failed: {e}");
    }
}

async fn send_reply(ctx: &AppContext, msg: &NormalizedMessage, text: &str) {
    let quoted = QuotedMessage::from(msg);
    if let Err(e) = ctx.messenger.send_reply(&msg.chat_id, &quoted, text).await {
        warn!(chat = %msg.chat_id, message_id = %msg.message_id, "reply failed: {e}");
    }
}

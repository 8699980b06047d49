//! Entry point for inbound transport events: classify, gate, dispatch.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    classify::classify,
    context::AppContext,
    dispatch::dispatch,
    domain::NormalizedMessage,
    events::InboundEvent,
};

/// Handle one event to completion. Malformed messages are dropped silently.
pub async fn handle_event(ctx: &Arc<AppContext>, evt: InboundEvent) {
    match evt {
        InboundEvent::Message(m) => {
            let msg = match classify(&m) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!("dropping event: {e}");
                    return;
                }
            };
            if !admitted(ctx, &msg).await {
                debug!(chat = %msg.chat_id, sender = %msg.sender_id, "not on allow-list; dropped");
                return;
            }
            dispatch(ctx, msg).await;
        }
        InboundEvent::Connected => info!("transport connected"),
        InboundEvent::Disconnected { reason } => {
            warn!(reason = reason.as_deref().unwrap_or("unknown"), "transport disconnected");
        }
    }
}

/// One task per event; the caller does not wait for it.
pub fn spawn_event(ctx: Arc<AppContext>, evt: InboundEvent) -> JoinHandle<()> {
    tokio::spawn(async move { handle_event(&ctx, evt).await })
}

async fn admitted(ctx: &AppContext, msg: &NormalizedMessage) -> bool {
    if !ctx.allow_list_enforced {
        return true;
    }
    if ctx.config.current().operational.owner().as_ref() == Some(&msg.sender_id) {
        return true;
    }

    let user = ctx
        .allow_list
        .is_user_allowed(&msg.sender_id)
        .await
        .unwrap_or_else(|e| {
            warn!(sender = %msg.sender_id, "allow-list lookup failed: {e}");
            false
        });
    if user || !msg.is_group {
        return user;
    }

    ctx.allow_list
        .is_group_allowed(&msg.chat_id)
        .await
        .unwrap_or_else(|e| {
            warn!(chat = %msg.chat_id, "allow-list lookup failed: {e}");
            false
        })
}

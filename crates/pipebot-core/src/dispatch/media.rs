use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    context::AppContext,
    domain::{MediaMeta, NormalizedMessage},
    enrich::DescribeRequest,
    store::MessageLogEntry,
};

use super::log_name;

pub(super) async fn handle_image(ctx: &Arc<AppContext>, msg: &NormalizedMessage) {
    let meta = msg.media.clone().unwrap_or_default();
    let placeholder = ctx.config.current().prompts.placeholder();

    // `key` is the hash this message may write under. A failed lookup leaves
    // the hash alone: whatever the store holds is not overwritten.
    let (cached, key) = match meta.content_key() {
        Some(hash) => match ctx.media.lookup(hash).await {
            Ok(cached) => (cached, Some(hash.to_string())),
            Err(e) => {
                warn!(hash = %hash, "media description lookup failed: {e}");
                (None, None)
            }
        },
        None => (None, None),
    };
    let miss = cached.is_none();

    let mut claimed = false;
    let description = match cached {
        Some(d) => {
            debug!(message_id = %msg.message_id, "media description cache hit");
            d
        }
        None => {
            // Claim the hash now so duplicates arriving before enrichment
            // finishes reuse the placeholder.
            if let Some(hash) = &key {
                match ctx.media.put(hash, &placeholder).await {
                    Ok(()) => claimed = true,
                    Err(e) => warn!(hash = %hash, "failed to cache placeholder: {e}"),
                }
            }
            placeholder.clone()
        }
    };

    let entry = MessageLogEntry {
        message_id: msg.message_id.clone(),
        chat_id: msg.chat_id.clone(),
        sender_name: log_name(ctx, msg).await,
        media_description: Some(description),
        text: None,
    };
    if let Err(e) = ctx.store.upsert_message_log(&entry).await {
        warn!(message_id = %msg.message_id, "failed to log image message: {e}");
        if claimed {
            release_claim(ctx, key.as_deref(), &placeholder).await;
        }
        return;
    }

    if miss {
        let claim = claimed.then_some(placeholder);
        enrich(ctx, msg, meta, key, claim).await;
    }
}

/// Hand the slow describe call to the pool. On success the result overwrites
/// the cache entry for this hash and the log row for this message. Without a
/// result the placeholder claim is dropped so a later image can retry.
async fn enrich(
    ctx: &Arc<AppContext>,
    msg: &NormalizedMessage,
    media: MediaMeta,
    key: Option<String>,
    claim: Option<String>,
) {
    let req = DescribeRequest {
        message_id: msg.message_id.clone(),
        chat_id: msg.chat_id.clone(),
        media,
    };
    let message_id = req.message_id.clone();
    let done_ctx = ctx.clone();
    let done_key = key.clone();
    let done_claim = claim.clone();

    let accepted = ctx.enrichment.submit(req, move |description| async move {
        let Some(description) = description else {
            if let Some(claim) = &done_claim {
                release_claim(&done_ctx, done_key.as_deref(), claim).await;
            }
            return;
        };
        if let Some(hash) = &done_key {
            if let Err(e) = done_ctx.media.put(hash, &description).await {
                warn!(hash = %hash, "failed to cache media description: {e}");
            }
        }
        if let Err(e) = done_ctx
            .store
            .patch_message_log_description(&message_id, &description)
            .await
        {
            warn!(message_id = %message_id, "failed to update media description: {e}");
        }
    });

    if !accepted {
        debug!(message_id = %msg.message_id, "enrichment not scheduled");
        if let Some(claim) = &claim {
            release_claim(ctx, key.as_deref(), claim).await;
        }
    }
}

async fn release_claim(ctx: &AppContext, key: Option<&str>, claim: &str) {
    let Some(hash) = key else {
        return;
    };
    match ctx.media.release(hash, claim).await {
        Ok(true) => debug!(hash = %hash, "placeholder claim released"),
        Ok(false) => {}
        Err(e) => warn!(hash = %hash, "failed to release placeholder claim: {e}"),
    }
}

pub(super) fn handle_video(msg: &NormalizedMessage) {
    info!(chat = %msg.chat_id, message_id = %msg.message_id, "video received");
}

pub(super) fn handle_audio(msg: &NormalizedMessage) {
    info!(chat = %msg.chat_id, message_id = %msg.message_id, "audio received");
}

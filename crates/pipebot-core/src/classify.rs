use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, MediaKind, MediaMeta, MessageId, NormalizedMessage, SenderId},
    errors::Error,
    events::{MediaPayload, MessageEvent},
    Result,
};

/// Turn a raw message event into a [`NormalizedMessage`].
///
/// Only missing identity fields (id, chat, sender) fail classification.
/// Everything else degrades to defaults. A missing timestamp becomes the Unix
/// epoch, which keeps the message out of every "since startup" behaviour.
pub fn classify(evt: &MessageEvent) -> Result<NormalizedMessage> {
    let info = &evt.info;

    let message_id = required(info.id.as_deref(), "message id")?;
    let chat_id = required(info.chat.as_deref(), "chat id")?;
    let sender_id = required(info.sender.as_deref(), "sender id")?;
    let timestamp = info.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let payload = &evt.payload;

    // Mentions only come from the extended-text variant.
    let mentions = payload
        .extended_text
        .as_ref()
        .and_then(|ext| ext.context.as_ref())
        .map(|ctx| ctx.mentioned.clone())
        .unwrap_or_default();

    let text = match payload.conversation.as_deref() {
        Some(conv) if !conv.is_empty() => conv.to_string(),
        _ => payload
            .extended_text
            .as_ref()
            .and_then(|ext| ext.text.clone())
            .unwrap_or_default(),
    };

    let (media_kind, media) = classify_media(payload);

    Ok(NormalizedMessage {
        message_id: MessageId(message_id),
        chat_id: ChatId(chat_id),
        sender_id: SenderId(sender_id),
        sender_name: info.push_name.clone().unwrap_or_default(),
        is_group: info.is_group,
        text,
        media_kind,
        media,
        timestamp,
        mentions,
        is_from_self: info.is_from_me,
        raw: evt.raw.clone(),
    })
}

fn required(v: Option<&str>, what: &str) -> Result<String> {
    match v.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(Error::Classification(format!("missing {what}"))),
    }
}

/// Pick the first present media variant in priority order.
///
/// Stickers are image-format payloads, so they classify as images.
fn classify_media(payload: &crate::events::MessagePayload) -> (MediaKind, Option<MediaMeta>) {
    let candidates: [(Option<&MediaPayload>, MediaKind, MetaShape); 5] = [
        (payload.sticker.as_ref(), MediaKind::Image, MetaShape::Visual),
        (payload.image.as_ref(), MediaKind::Image, MetaShape::Visual),
        (payload.video.as_ref(), MediaKind::Video, MetaShape::Timed),
        (payload.audio.as_ref(), MediaKind::Audio, MetaShape::AudioOnly),
        (payload.document.as_ref(), MediaKind::Document, MetaShape::Plain),
    ];

    for (media, kind, shape) in candidates {
        if let Some(m) = media {
            return (kind, Some(build_meta(m, shape)));
        }
    }

    (MediaKind::Text, None)
}

/// Which optional fields a payload variant is allowed to contribute.
#[derive(Clone, Copy)]
enum MetaShape {
    Visual,
    Timed,
    AudioOnly,
    Plain,
}

fn build_meta(m: &MediaPayload, shape: MetaShape) -> MediaMeta {
    let (dims, timed) = match shape {
        MetaShape::Visual => (true, false),
        MetaShape::Timed => (true, true),
        MetaShape::AudioOnly => (false, true),
        MetaShape::Plain => (false, false),
    };

    MediaMeta {
        mime_type: m.mime_type.clone().unwrap_or_default(),
        size_bytes: m.file_length.unwrap_or(0),
        width: if dims { m.width.unwrap_or(0) } else { 0 },
        height: if dims { m.height.unwrap_or(0) } else { 0 },
        duration_secs: if timed {
            f64::from(m.seconds.unwrap_or(0))
        } else {
            0.0
        },
        hash: m.media_key.clone().unwrap_or_default(),
    }
}

//! Telegram `Message` -> core `InboundEvent`.

use sha2::{Digest, Sha256};
use teloxide::types::{FileMeta, Message, MessageEntityKind, MessageEntityRef};

use pipebot_core::{
    domain::RawPayload,
    events::{ContextInfo, ExtendedText, InboundEvent, MediaPayload, MessageEvent, MessageInfo, MessagePayload},
};

/// The bot's own account, used to resolve mentions and self-sent messages.
#[derive(Clone, Debug)]
pub struct BotIdentity {
    pub id: String,
    pub username: Option<String>,
}

/// Telegram message ids are only unique per chat, so the core id is
/// `"{chat}:{message}"`.
pub fn message_key(chat: i64, message: i32) -> String {
    format!("{chat}:{message}")
}

pub fn parse_message_key(key: &str) -> Option<(i64, i32)> {
    let (chat, msg) = key.rsplit_once(':')?;
    Some((chat.parse().ok()?, msg.parse().ok()?))
}

/// Hex SHA-256 of the file's `file_unique_id`, stable across re-sends of the
/// same content.
pub fn content_hash(unique_id: &str) -> String {
    if unique_id.is_empty() {
        return String::new();
    }
    Sha256::digest(unique_id.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn to_event(msg: &Message, me: &BotIdentity) -> InboundEvent {
    let from = msg.from();
    let sender = from.map(|u| u.id.0.to_string());

    let info = MessageInfo {
        id: Some(message_key(msg.chat.id.0, msg.id.0)),
        chat: Some(msg.chat.id.0.to_string()),
        is_from_me: sender.as_deref() == Some(me.id.as_str()),
        sender,
        push_name: from.map(|u| u.full_name()),
        is_group: msg.chat.is_group() || msg.chat.is_supergroup(),
        timestamp: Some(msg.date),
    };

    let raw = serde_json::to_value(msg)
        .map(RawPayload::new)
        .unwrap_or_default();

    InboundEvent::Message(MessageEvent {
        info,
        payload: payload(msg, me),
        raw,
    })
}

fn payload(msg: &Message, me: &BotIdentity) -> MessagePayload {
    let mut p = MessagePayload::default();

    // Entities or a caption make it "extended" text; mentions only live there.
    if let Some(text) = msg.text() {
        match msg.parse_entities() {
            Some(entities) if !entities.is_empty() => {
                p.extended_text = Some(extended(text, &entities, me));
            }
            _ => p.conversation = Some(text.to_string()),
        }
    } else if let Some(caption) = msg.caption() {
        let entities = msg.parse_caption_entities().unwrap_or_default();
        p.extended_text = Some(extended(caption, &entities, me));
    }

    if let Some(s) = msg.sticker() {
        p.sticker = Some(MediaPayload {
            mime_type: Some("image/webp".to_string()),
            width: Some(u32::from(s.width)),
            height: Some(u32::from(s.height)),
            ..file_payload(&s.file)
        });
    } else if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        p.image = Some(MediaPayload {
            mime_type: Some("image/jpeg".to_string()),
            width: Some(photo.width),
            height: Some(photo.height),
            ..file_payload(&photo.file)
        });
    } else if let Some(v) = msg.video() {
        p.video = Some(MediaPayload {
            mime_type: v.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            width: Some(v.width),
            height: Some(v.height),
            seconds: Some(v.duration),
            ..file_payload(&v.file)
        });
    } else if let Some(a) = msg.audio() {
        p.audio = Some(MediaPayload {
            mime_type: a.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            seconds: Some(a.duration),
            ..file_payload(&a.file)
        });
    } else if let Some(v) = msg.voice() {
        p.audio = Some(MediaPayload {
            mime_type: v.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            seconds: Some(v.duration),
            ..file_payload(&v.file)
        });
    } else if let Some(d) = msg.document() {
        p.document = Some(MediaPayload {
            mime_type: d.mime_type.as_ref().map(|m| m.essence_str().to_string()),
            ..file_payload(&d.file)
        });
    }

    p
}

fn file_payload(file: &FileMeta) -> MediaPayload {
    MediaPayload {
        file_length: Some(u64::from(file.size)),
        media_key: Some(content_hash(&file.unique_id)),
        ..Default::default()
    }
}

fn extended(text: &str, entities: &[MessageEntityRef<'_>], me: &BotIdentity) -> ExtendedText {
    let mentioned: Vec<String> = entities
        .iter()
        .filter_map(|e| match e.kind() {
            MessageEntityKind::Mention => Some(resolve_mention(e.text(), me)),
            MessageEntityKind::TextMention { user } => Some(user.id.0.to_string()),
            _ => None,
        })
        .collect();

    ExtendedText {
        text: Some(text.to_string()),
        context: (!mentioned.is_empty()).then_some(ContextInfo { mentioned }),
    }
}

/// `@username` of the bot becomes the bot's id; other handles pass through.
fn resolve_mention(handle: &str, me: &BotIdentity) -> String {
    let name = handle.trim_start_matches('@');
    match &me.username {
        Some(own) if own.eq_ignore_ascii_case(name) => me.id.clone(),
        _ => handle.to_string(),
    }
}

//! Inbound event model delivered by the transport.
//!
//! The transport narrows whatever it receives into this closed union; the
//! pipeline matches on it exactly once and only `Message` reaches the
//! classifier.

use chrono::{DateTime, Utc};

use crate::domain::RawPayload;

#[derive(Clone, Debug)]
pub enum InboundEvent {
    Message(MessageEvent),
    Connected,
    Disconnected { reason: Option<String> },
}

/// A chat message as the transport sees it, before classification.
#[derive(Clone, Debug, Default)]
pub struct MessageEvent {
    pub info: MessageInfo,
    pub payload: MessagePayload,
    pub raw: RawPayload,
}

/// Envelope metadata. Identity fields are optional here because the
/// classifier is the one that rejects events missing them.
#[derive(Clone, Debug, Default)]
pub struct MessageInfo {
    pub id: Option<String>,
    pub chat: Option<String>,
    pub sender: Option<String>,
    pub push_name: Option<String>,
    pub is_group: bool,
    pub is_from_me: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Message body variants. At most one media field is expected to be set.
#[derive(Clone, Debug, Default)]
pub struct MessagePayload {
    pub conversation: Option<String>,
    pub extended_text: Option<ExtendedText>,
    pub sticker: Option<MediaPayload>,
    pub image: Option<MediaPayload>,
    pub video: Option<MediaPayload>,
    pub audio: Option<MediaPayload>,
    pub document: Option<MediaPayload>,
}

#[derive(Clone, Debug, Default)]
pub struct ExtendedText {
    pub text: Option<String>,
    pub context: Option<ContextInfo>,
}

#[derive(Clone, Debug, Default)]
pub struct ContextInfo {
    pub mentioned: Vec<String>,
}

/// Raw media fields; every one may be missing on the wire.
#[derive(Clone, Debug, Default)]
pub struct MediaPayload {
    pub mime_type: Option<String>,
    pub file_length: Option<u64>,
    pub media_key: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seconds: Option<u32>,
}

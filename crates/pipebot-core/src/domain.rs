use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(v: impl Into<String>) -> Self {
                Self(v.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Chat identifier as issued by the transport (group or one-to-one).
    ChatId
);
string_id!(
    /// Sender (user) identifier as issued by the transport.
    SenderId
);
string_id!(
    /// Message identifier, unique across the message log.
    MessageId
);

/// Media kind of a normalized message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata of a media payload. Absent source fields are zero/empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaMeta {
    pub mime_type: String,
    pub size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    /// Content hash used as the media-description key. Empty when unavailable.
    pub hash: String,
}

impl MediaMeta {
    /// The cache/store key for this media, if it has one.
    ///
    /// An empty hash never resolves to a key: distinct media without a hash must
    /// not share a description.
    pub fn content_key(&self) -> Option<&str> {
        let h = self.hash.trim();
        if h.is_empty() {
            None
        } else {
            Some(h)
        }
    }
}

/// Opaque handle to the transport's raw payload. Only used for reply-quoting.
#[derive(Clone, Debug, Default)]
pub struct RawPayload(Option<Arc<serde_json::Value>>);

impl RawPayload {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(Some(Arc::new(raw)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&serde_json::Value> {
        self.0.as_deref()
    }
}

/// One classified inbound message. Created once by the classifier, consumed by
/// the dispatcher.
#[derive(Clone, Debug)]
pub struct NormalizedMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: SenderId,
    pub sender_name: String,
    pub is_group: bool,
    pub text: String,
    pub media_kind: MediaKind,
    pub media: Option<MediaMeta>,
    pub timestamp: DateTime<Utc>,
    pub mentions: Vec<String>,
    pub is_from_self: bool,
    pub raw: RawPayload,
}

impl NormalizedMessage {
    /// Commands start with `-` and are only honoured in group chats.
    pub fn is_command(&self) -> bool {
        self.is_group && self.text.starts_with('-')
    }

    pub fn mentions_identity(&self, id: &str) -> bool {
        !id.is_empty() && self.mentions.iter().any(|m| m == id)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Duration declared for an audio reply when the real length cannot be measured.
pub const PLACEHOLDER_DURATION_MS: u64 = 1000;

/// Payload of an inbound user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Text(String),
    Audio(Vec<u8>),
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
        }
    }
}

/// One user message received from the channel, ready for the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    /// Single-use token issued by the channel for replying to this event.
    pub reply_token: String,
    pub kind: MessageKind,
}

impl InboundEvent {
    pub fn text(reply_token: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            reply_token: reply_token.into(),
            kind: MessageKind::Text(text.into()),
        }
    }

    pub fn audio(reply_token: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            reply_token: reply_token.into(),
            kind: MessageKind::Audio(bytes),
        }
    }
}

/// Reply sent back to the channel: the generated text plus a link to its audio rendition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundReply {
    pub text: String,
    pub audio_url: String,
    pub duration_ms: u64,
}

/// Audio blob published to transient storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioArtifact {
    /// Object name inside the container.
    pub name: String,
    /// Externally resolvable, read-only signed URL.
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: usize,
}

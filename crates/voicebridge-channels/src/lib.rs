//! Messaging channel abstraction.
//!
//! A channel authenticates and parses webhook deliveries, fetches the binary
//! content behind media messages, and sends replies. Only LINE is built in;
//! it is feature-gated like any other channel would be.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use voicebridge_core::error::Result;
use voicebridge_core::types::OutboundReply;

#[cfg(feature = "line")]
pub mod line;

/// A user message as announced by a webhook, before any media is downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WebhookMessage {
    Text { text: String },
    Audio { message_id: String },
}

/// One dispatchable webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub reply_token: String,
    pub message: WebhookMessage,
}

/// The core channel trait.
#[async_trait]
pub trait MessagingChannel: Send + Sync + 'static {
    /// Unique channel identifier (e.g., "line").
    fn id(&self) -> &str;

    /// HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Check a webhook body against its signature header value.
    /// Fails with `RelayError::Authentication` when absent or wrong.
    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<()>;

    /// Parse an authenticated webhook body into dispatchable events.
    /// Events the relay does not handle are dropped.
    fn parse_events(&self, body: &[u8]) -> Result<Vec<WebhookEvent>>;

    /// Download the binary content of a media message.
    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>>;

    /// Send the reply for an event. The reply token is single-use.
    async fn reply(&self, reply_token: &str, reply: &OutboundReply) -> Result<()>;
}

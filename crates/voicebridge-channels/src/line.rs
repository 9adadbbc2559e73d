//! LINE Messaging API channel implementation.
//!
//! Webhooks are authenticated with `X-Line-Signature`, the base64-encoded
//! HMAC-SHA256 of the raw request body keyed by the channel secret. Replies go
//! through the reply endpoint with the event's one-shot reply token; audio
//! content is downloaded from the data API host.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, error, info};

use voicebridge_core::config::LineSettings;
use voicebridge_core::error::{RelayError, Result};
use voicebridge_core::types::OutboundReply;

use crate::{MessagingChannel, WebhookEvent, WebhookMessage};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

type HmacSha256 = Hmac<Sha256>;

pub struct LineChannel {
    channel_access_token: String,
    channel_secret: String,
    api_base_url: String,
    data_base_url: String,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(settings: &LineSettings, client: reqwest::Client) -> Self {
        Self {
            channel_access_token: settings.channel_access_token.clone(),
            channel_secret: settings.channel_secret.clone(),
            api_base_url: settings.api_base_url.clone(),
            data_base_url: settings.data_base_url.clone(),
            client,
        }
    }
}

fn signature_mac(channel_secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(channel_secret.as_bytes())
        .map_err(|e| RelayError::Authentication(format!("unusable channel secret: {e}")))
}

/// Compute the `X-Line-Signature` value for a body.
pub fn sign(body: &[u8], channel_secret: &str) -> Result<String> {
    let mut mac = signature_mac(channel_secret)?;
    mac.update(body);
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

/// Verify a LINE webhook signature in constant time.
pub fn verify_signature(body: &[u8], signature: &str, channel_secret: &str) -> bool {
    let Ok(expected) = BASE64.decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = signature_mac(channel_secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

// --- Webhook payload types ---

#[derive(Debug, Deserialize)]
struct WebhookBody {
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    events: Vec<LineEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum LineEvent {
    Message {
        #[serde(rename = "replyToken", default)]
        reply_token: Option<String>,
        message: LineMessage,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum LineMessage {
    Text { text: String },
    Audio { id: String },
    #[serde(other)]
    Unsupported,
}

/// Parse a LINE webhook body, keeping only text and audio message events.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<WebhookEvent>> {
    let payload: WebhookBody = serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidPayload(format!("LINE webhook body: {e}")))?;

    debug!(
        destination = payload.destination.as_deref().unwrap_or(""),
        count = payload.events.len(),
        "Parsed LINE webhook"
    );

    let mut events = Vec::new();
    for event in payload.events {
        let LineEvent::Message {
            reply_token,
            message,
        } = event
        else {
            debug!("Skipping non-message LINE event");
            continue;
        };

        let Some(reply_token) = reply_token.filter(|t| !t.is_empty()) else {
            debug!("Skipping LINE message event without reply token");
            continue;
        };

        let message = match message {
            LineMessage::Text { text } => WebhookMessage::Text { text },
            LineMessage::Audio { id } => WebhookMessage::Audio { message_id: id },
            LineMessage::Unsupported => {
                debug!("Skipping unsupported LINE message type");
                continue;
            }
        };

        events.push(WebhookEvent {
            reply_token,
            message,
        });
    }

    Ok(events)
}

/// Build the ordered LINE message list for a reply: text first, then audio.
pub fn reply_messages(reply: &OutboundReply) -> serde_json::Value {
    json!([
        { "type": "text", "text": reply.text },
        {
            "type": "audio",
            "originalContentUrl": reply.audio_url,
            "duration": reply.duration_ms,
        }
    ])
}

#[async_trait]
impl MessagingChannel for LineChannel {
    fn id(&self) -> &str {
        "line"
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        let signature = signature
            .ok_or_else(|| RelayError::Authentication("missing X-Line-Signature header".into()))?;
        if verify_signature(body, signature, &self.channel_secret) {
            Ok(())
        } else {
            Err(RelayError::Authentication("invalid LINE signature".into()))
        }
    }

    fn parse_events(&self, body: &[u8]) -> Result<Vec<WebhookEvent>> {
        parse_webhook(body)
    }

    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/v2/bot/message/{message_id}/content", self.data_base_url);

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.channel_access_token)
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("LINE content request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body, message_id, "LINE content fetch failed");
            return Err(RelayError::Channel(format!("LINE content API error {status}")));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RelayError::Channel(format!("LINE content read failed: {e}")))?;

        debug!(message_id, bytes = bytes.len(), "Fetched LINE message content");
        Ok(bytes.to_vec())
    }

    async fn reply(&self, reply_token: &str, reply: &OutboundReply) -> Result<()> {
        let url = format!("{}/v2/bot/message/reply", self.api_base_url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.channel_access_token)
            .json(&json!({
                "replyToken": reply_token,
                "messages": reply_messages(reply),
            }))
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("LINE reply request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body, "LINE reply failed");
            return Err(RelayError::Channel(format!("LINE reply API error {status}")));
        }

        info!(duration_ms = reply.duration_ms, "LINE reply sent");
        Ok(())
    }
}

//! The relay pipeline: webhook in, text and voice reply out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use voicebridge_channels::line::LineChannel;
use voicebridge_channels::{MessagingChannel, WebhookEvent, WebhookMessage};
use voicebridge_core::config::Settings;
use voicebridge_core::error::{RelayError, Result};
use voicebridge_core::types::{InboundEvent, MessageKind, OutboundReply};
use voicebridge_media::VoiceBridge;
use voicebridge_media::blob::AzureBlobStore;
use voicebridge_media::speech::AzureSpeech;
use voicebridge_providers::CompletionClient;
use voicebridge_providers::openai::OpenAiProvider;

/// Owns the process-wide clients and runs events through them.
#[derive(Clone)]
pub struct Relay {
    channel: Arc<dyn MessagingChannel>,
    completion: CompletionClient,
    voice: VoiceBridge,
}

impl Relay {
    pub fn new(
        channel: Arc<dyn MessagingChannel>,
        completion: CompletionClient,
        voice: VoiceBridge,
    ) -> Self {
        Self {
            channel,
            completion,
            voice,
        }
    }

    /// Header the channel signs its webhooks with.
    pub fn signature_header(&self) -> &'static str {
        self.channel.signature_header()
    }

    /// Authenticate a webhook delivery and process each of its events in order.
    /// Returns the number of replies sent. The first failure aborts the rest.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>) -> Result<usize> {
        self.channel.verify(body, signature)?;
        let events = self.channel.parse_events(body)?;

        let mut sent = 0;
        for event in events {
            let inbound = self.materialize(event).await?;
            self.handle_event(inbound).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Download media so the event carries its payload.
    pub async fn materialize(&self, event: WebhookEvent) -> Result<InboundEvent> {
        Ok(match event.message {
            WebhookMessage::Text { text } => InboundEvent::text(event.reply_token, text),
            WebhookMessage::Audio { message_id } => {
                let bytes = self.channel.fetch_content(&message_id).await?;
                InboundEvent::audio(event.reply_token, bytes)
            }
        })
    }

    /// Run one event through the pipeline and send its reply.
    pub async fn handle_event(&self, event: InboundEvent) -> Result<OutboundReply> {
        let kind = event.kind.label();
        let input = match event.kind {
            MessageKind::Text(text) => text,
            MessageKind::Audio(bytes) => {
                let text = self.voice.transcribe(&bytes).await?;
                debug!(chars = text.len(), "Audio transcribed");
                text
            }
        };

        let reply_text = self.completion.complete(&input).await?;
        let spoken = self.voice.speak(&reply_text).await?;

        let reply = OutboundReply {
            text: reply_text,
            audio_url: spoken.artifact.url,
            duration_ms: spoken.duration_ms,
        };

        self.channel.reply(&event.reply_token, &reply).await?;
        info!(channel = self.channel.id(), kind, "Reply delivered");

        Ok(reply)
    }
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RelayError::Config(format!("HTTP client setup failed: {e}")))
}

/// Build the production relay: LINE, OpenAI, Azure Speech and Azure Blob.
pub fn build_relay(settings: &Settings) -> Result<Relay> {
    let default_http = http_client(30)?;

    let channel = Arc::new(LineChannel::new(&settings.line, default_http.clone()));

    let provider = Arc::new(OpenAiProvider::new(
        &settings.completion,
        http_client(settings.completion.timeout_secs)?,
    ));
    let completion = CompletionClient::new(provider, &settings.completion);

    let speech = Arc::new(AzureSpeech::new(
        &settings.speech,
        http_client(settings.speech.timeout_secs)?,
    ));
    let store = Arc::new(AzureBlobStore::new(&settings.storage, default_http)?);
    info!(
        account = store.account_name(),
        container = %settings.storage.container,
        "Blob storage configured"
    );

    Ok(Relay::new(
        channel,
        completion,
        VoiceBridge::new(speech, store),
    ))
}

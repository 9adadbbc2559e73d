//! Media pipeline: speech synthesis and recognition, and transient audio storage.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use voicebridge_core::error::Result;
use voicebridge_core::types::{AudioArtifact, PLACEHOLDER_DURATION_MS};

pub mod blob;
pub mod speech;
pub mod wav;

/// Speech provider: text to audio and audio to text, one utterance at a time.
#[async_trait]
pub trait SpeechCodec: Send + Sync {
    /// Synthesize `text` into an encoded audio buffer.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>>;

    /// Recognize a single utterance. Silence or non-speech yields an empty string.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;
}

/// Write-once store that hands out short-lived read URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn publish(&self, bytes: Vec<u8>) -> Result<AudioArtifact>;
}

/// Synthesized audio after it has been published.
#[derive(Debug, Clone)]
pub struct SpokenReply {
    pub artifact: AudioArtifact,
    pub duration_ms: u64,
}

/// Bridges text and voice, publishing synthesized audio to the store.
#[derive(Clone)]
pub struct VoiceBridge {
    codec: Arc<dyn SpeechCodec>,
    store: Arc<dyn ObjectStore>,
}

impl VoiceBridge {
    pub fn new(codec: Arc<dyn SpeechCodec>, store: Arc<dyn ObjectStore>) -> Self {
        Self { codec, store }
    }

    pub async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let text = self.codec.transcribe(audio).await?;
        Ok(text.trim().to_string())
    }

    /// Synthesize `text` and publish it. The declared duration is measured
    /// from the WAV header, falling back to the placeholder when unparseable.
    pub async fn speak(&self, text: &str) -> Result<SpokenReply> {
        let audio = self.codec.synthesize(text).await?;
        let duration_ms = wav::wav_duration_ms(&audio).unwrap_or(PLACEHOLDER_DURATION_MS);
        let artifact = self.store.publish(audio).await?;

        info!(
            name = %artifact.name,
            size_bytes = artifact.size_bytes,
            duration_ms,
            "Reply audio published"
        );

        Ok(SpokenReply {
            artifact,
            duration_ms,
        })
    }
}

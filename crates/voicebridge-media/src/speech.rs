//! Azure Speech REST provider.
//!
//! Synthesis posts SSML to the regional TTS endpoint and receives a WAV
//! buffer. Recognition uses the short-audio endpoint, which returns one
//! result for one utterance.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};

use voicebridge_core::config::SpeechSettings;
use voicebridge_core::error::{RelayError, Result};

use crate::SpeechCodec;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OUTPUT_FORMAT_HEADER: &str = "X-Microsoft-OutputFormat";
/// 24kHz 16-bit mono PCM in a RIFF container.
const OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

pub struct AzureSpeech {
    subscription_key: String,
    voice: String,
    language: String,
    input_content_type: String,
    tts_url: String,
    stt_url: String,
    client: reqwest::Client,
}

impl AzureSpeech {
    pub fn new(settings: &SpeechSettings, client: reqwest::Client) -> Self {
        let tts_base = settings
            .tts_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.tts.speech.microsoft.com", settings.region));
        let stt_base = settings
            .stt_endpoint
            .clone()
            .unwrap_or_else(|| format!("https://{}.stt.speech.microsoft.com", settings.region));

        Self {
            subscription_key: settings.subscription_key.clone(),
            voice: settings.voice.clone(),
            language: settings.language.clone(),
            input_content_type: settings.input_content_type.clone(),
            tts_url: format!("{tts_base}/cognitiveservices/v1"),
            stt_url: format!(
                "{stt_base}/speech/recognition/conversation/cognitiveservices/v1"
            ),
            client,
        }
    }

    pub fn tts_url(&self) -> &str {
        &self.tts_url
    }

    pub fn stt_url(&self) -> &str {
        &self.stt_url
    }
}

/// Escape text for inclusion in an SSML document.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the SSML body for a synthesis request.
pub fn build_ssml(text: &str, voice: &str, language: &str) -> String {
    format!(
        "<speak version='1.0' xml:lang='{lang}'><voice xml:lang='{lang}' name='{voice}'>{text}</voice></speak>",
        lang = xml_escape(language),
        voice = xml_escape(voice),
        text = xml_escape(text),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
}

/// Pick the recognition content type from the audio container.
///
/// Short-audio recognition accepts only WAV and OGG/Opus. MP4-family audio
/// (LINE delivers voice messages as m4a) is rejected before any request is
/// made; unrecognized containers fall back to the configured content type.
fn recognition_content_type<'a>(audio: &[u8], configured: &'a str) -> Result<&'a str> {
    if audio.starts_with(b"RIFF") && audio.get(8..12) == Some(&b"WAVE"[..]) {
        return Ok("audio/wav");
    }
    if audio.starts_with(b"OggS") {
        return Ok("audio/ogg; codecs=opus");
    }
    if audio.get(4..8) == Some(&b"ftyp"[..]) {
        return Err(RelayError::Transcription(
            "MP4/M4A audio is not accepted by short-audio recognition; send WAV or OGG/Opus".into(),
        ));
    }
    Ok(configured)
}

/// Map a recognition response to text. Non-speech outcomes are empty text.
fn recognized_text(response: RecognitionResponse) -> Result<String> {
    match response.recognition_status.as_str() {
        "Success" => Ok(response.display_text.unwrap_or_default().trim().to_string()),
        "NoMatch" | "InitialSilenceTimeout" | "BabbleTimeout" => {
            debug!(status = %response.recognition_status, "No speech recognized");
            Ok(String::new())
        }
        other => Err(RelayError::Transcription(format!(
            "recognition failed with status {other}"
        ))),
    }
}

#[async_trait]
impl SpeechCodec for AzureSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let ssml = build_ssml(text, &self.voice, &self.language);

        debug!(voice = %self.voice, text_len = text.len(), "Sending synthesis request");

        let resp = self
            .client
            .post(&self.tts_url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header(OUTPUT_FORMAT_HEADER, OUTPUT_FORMAT)
            .header("Content-Type", "application/ssml+xml")
            .header("User-Agent", "voicebridge")
            .body(ssml)
            .send()
            .await
            .map_err(|e| RelayError::Synthesis(format!("speech request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body, "Speech synthesis failed");
            return Err(RelayError::Synthesis(format!("speech API error {status}")));
        }

        let audio = resp
            .bytes()
            .await
            .map_err(|e| RelayError::Synthesis(format!("speech response read failed: {e}")))?;

        if audio.is_empty() {
            return Err(RelayError::Synthesis("speech API returned no audio".into()));
        }

        debug!(bytes = audio.len(), "Speech synthesized");
        Ok(audio.to_vec())
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let content_type = recognition_content_type(audio, &self.input_content_type)?;
        debug!(
            bytes = audio.len(),
            language = %self.language,
            content_type,
            "Sending recognition request"
        );

        let resp = self
            .client
            .post(&self.stt_url)
            .query(&[("language", self.language.as_str()), ("format", "simple")])
            .header(SUBSCRIPTION_KEY_HEADER, &self.subscription_key)
            .header("Content-Type", content_type)
            .header("Accept", "application/json")
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| RelayError::Transcription(format!("speech request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body, "Speech recognition failed");
            return Err(RelayError::Transcription(format!("speech API error {status}")));
        }

        let parsed: RecognitionResponse = resp.json().await.map_err(|e| {
            RelayError::Transcription(format!("speech response decode failed: {e}"))
        })?;

        recognized_text(parsed)
    }
}

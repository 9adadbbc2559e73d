//! In-memory fakes for every provider the relay talks to.
//!
//! Each fake appends a line to a shared call log so tests can assert on the
//! exact order of downstream calls.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use voicebridge_channels::line::{self, SIGNATURE_HEADER};
use voicebridge_channels::{MessagingChannel, WebhookEvent};
use voicebridge_core::config::CompletionSettings;
use voicebridge_core::error::{RelayError, Result};
use voicebridge_core::types::{AudioArtifact, OutboundReply};
use voicebridge_gateway::Relay;
use voicebridge_media::{ObjectStore, SpeechCodec, VoiceBridge};
use voicebridge_providers::{
    CompletionClient, CompletionProvider, CompletionRequest, CompletionResult,
};

pub const SECRET: &str = "test-channel-secret";

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, entry: String) {
    log.lock().unwrap().push(entry);
}

pub struct FakeChannel {
    log: CallLog,
    audio: HashMap<String, Vec<u8>>,
    pub replies: Mutex<Vec<(String, OutboundReply)>>,
}

#[async_trait]
impl MessagingChannel for FakeChannel {
    fn id(&self) -> &str {
        "fake-line"
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<()> {
        match signature {
            Some(sig) if line::verify_signature(body, sig, SECRET) => Ok(()),
            _ => Err(RelayError::Authentication("bad signature".into())),
        }
    }

    fn parse_events(&self, body: &[u8]) -> Result<Vec<WebhookEvent>> {
        line::parse_webhook(body)
    }

    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>> {
        record(&self.log, format!("fetch:{message_id}"));
        self.audio
            .get(message_id)
            .cloned()
            .ok_or_else(|| RelayError::Channel(format!("no content for {message_id}")))
    }

    async fn reply(&self, reply_token: &str, reply: &OutboundReply) -> Result<()> {
        record(&self.log, format!("reply:{reply_token}"));
        self.replies
            .lock()
            .unwrap()
            .push((reply_token.to_string(), reply.clone()));
        Ok(())
    }
}

pub struct FakeSpeech {
    log: CallLog,
    transcripts: HashMap<Vec<u8>, String>,
    fail_synthesis: bool,
}

/// What the fake synthesizer returns for a given text.
pub fn synthesized(text: &str) -> Vec<u8> {
    format!("synth:{text}").into_bytes()
}

#[async_trait]
impl SpeechCodec for FakeSpeech {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        record(&self.log, format!("synthesize:{text}"));
        if self.fail_synthesis {
            return Err(RelayError::Synthesis("voice unavailable".into()));
        }
        Ok(synthesized(text))
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        record(&self.log, format!("transcribe:{}", String::from_utf8_lossy(audio)));
        self.transcripts
            .get(audio)
            .cloned()
            .ok_or_else(|| RelayError::Transcription("unrecognized audio".into()))
    }
}

pub struct FakeCompletion {
    log: CallLog,
    replies: HashMap<String, String>,
    fail: bool,
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    fn id(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        record(&self.log, format!("complete:{}", request.prompt));
        if self.fail {
            return Err(RelayError::Completion("request timed out".into()));
        }
        let reply = self
            .replies
            .get(&request.prompt)
            .cloned()
            .unwrap_or_else(|| "default reply".into());
        Ok(CompletionResult {
            choices: vec![format!(" {reply}\n")],
        })
    }
}

pub struct FakeStore {
    log: CallLog,
    fail: bool,
    pub published: Mutex<Vec<AudioArtifact>>,
    pub contents: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn publish(&self, bytes: Vec<u8>) -> Result<AudioArtifact> {
        record(&self.log, format!("publish:{}", String::from_utf8_lossy(&bytes)));
        if self.fail {
            return Err(RelayError::Storage("container not found".into()));
        }
        let mut published = self.published.lock().unwrap();
        let name = format!("audio-test-{}.wav", published.len());
        let artifact = AudioArtifact {
            url: format!("https://acct.blob.core.windows.net/replies/{name}?sp=r&sig=test"),
            name: name.clone(),
            expires_at: chrono::Utc::now(),
            size_bytes: bytes.len(),
        };
        self.contents.lock().unwrap().insert(name, bytes);
        published.push(artifact.clone());
        Ok(artifact)
    }
}

#[derive(Default)]
pub struct Options {
    /// prompt -> completion reply
    pub completions: Vec<(&'static str, &'static str)>,
    /// audio payload -> transcript
    pub transcripts: Vec<(&'static str, &'static str)>,
    /// message id -> audio payload
    pub audio: Vec<(&'static str, &'static str)>,
    pub fail_completion: bool,
    pub fail_synthesis: bool,
    pub fail_storage: bool,
}

pub struct Harness {
    pub relay: Relay,
    pub log: CallLog,
    pub channel: Arc<FakeChannel>,
    pub store: Arc<FakeStore>,
}

impl Harness {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(String, OutboundReply)> {
        self.channel.replies.lock().unwrap().clone()
    }
}

pub fn harness(options: Options) -> Harness {
    let log = CallLog::default();

    let channel = Arc::new(FakeChannel {
        log: log.clone(),
        audio: options
            .audio
            .iter()
            .map(|(id, audio)| (id.to_string(), audio.as_bytes().to_vec()))
            .collect(),
        replies: Mutex::new(Vec::new()),
    });
    let speech = Arc::new(FakeSpeech {
        log: log.clone(),
        transcripts: options
            .transcripts
            .iter()
            .map(|(audio, text)| (audio.as_bytes().to_vec(), text.to_string()))
            .collect(),
        fail_synthesis: options.fail_synthesis,
    });
    let provider = Arc::new(FakeCompletion {
        log: log.clone(),
        replies: options
            .completions
            .iter()
            .map(|(prompt, reply)| (prompt.to_string(), reply.to_string()))
            .collect(),
        fail: options.fail_completion,
    });
    let store = Arc::new(FakeStore {
        log: log.clone(),
        fail: options.fail_storage,
        published: Mutex::new(Vec::new()),
        contents: Mutex::new(HashMap::new()),
    });

    let settings = CompletionSettings {
        api_key: "unused".into(),
        base_url: "http://127.0.0.1:9".into(),
        model: "fake-model".into(),
        max_tokens: 100,
        temperature: 0.5,
        timeout_secs: 5,
    };

    let relay = Relay::new(
        channel.clone(),
        CompletionClient::new(provider, &settings),
        VoiceBridge::new(speech, store.clone()),
    );

    Harness {
        relay,
        log,
        channel,
        store,
    }
}

pub fn text_event(reply_token: &str, text: &str) -> serde_json::Value {
    json!({
        "type": "message",
        "replyToken": reply_token,
        "mode": "active",
        "source": { "type": "user", "userId": "U0001" },
        "message": { "type": "text", "id": format!("t-{reply_token}"), "text": text }
    })
}

pub fn audio_event(reply_token: &str, message_id: &str) -> serde_json::Value {
    json!({
        "type": "message",
        "replyToken": reply_token,
        "mode": "active",
        "source": { "type": "user", "userId": "U0001" },
        "message": { "type": "audio", "id": message_id, "duration": 1800 }
    })
}

/// Serialize a webhook body and sign it with the test secret.
pub fn signed_webhook(events: Vec<serde_json::Value>) -> (Vec<u8>, String) {
    let body = json!({ "destination": "Ubot", "events": events })
        .to_string()
        .into_bytes();
    let signature = line::sign(&body, SECRET).unwrap();
    (body, signature)
}

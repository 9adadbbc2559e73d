//! Configuration loading and startup resolution.
//!
//! Every value can come from the optional JSON5 config file or from the
//! environment. Secrets are looked up as `field` first, then the environment
//! variable named by `field_env`, then the conventional variable name.
//! [`Config::resolve`] turns the loose file model into [`Settings`] and fails
//! when anything required is absent, so misconfiguration surfaces at startup.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::storage::ConnectionString;

pub const ENV_LINE_ACCESS_TOKEN: &str = "LINE_CHANNEL_ACCESS_TOKEN";
pub const ENV_LINE_SECRET: &str = "LINE_CHANNEL_SECRET";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_SPEECH_KEY: &str = "AZURE_SPEECH_SUBSCRIPTION_KEY";
pub const ENV_SPEECH_REGION: &str = "AZURE_SPEECH_REGION";
pub const ENV_BLOB_CONNECTION_STRING: &str = "AZURE_BLOB_CONNECTION_STRING";
pub const ENV_BLOB_CONTAINER: &str = "AZURE_BLOB_CONTAINER";

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_LINE_API_BASE: &str = "https://api.line.me";
const DEFAULT_LINE_DATA_BASE: &str = "https://api-data.line.me";
const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo-instruct";
const DEFAULT_MAX_TOKENS: u32 = 100;
const DEFAULT_TEMPERATURE: f64 = 0.5;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VOICE: &str = "en-US-JennyNeural";
const DEFAULT_LANGUAGE: &str = "en-US";
const DEFAULT_INPUT_CONTENT_TYPE: &str = "audio/wav";
const DEFAULT_CONTAINER: &str = "voicebridge-audio";

/// Top-level Voicebridge configuration, as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<LineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech: Option<SpeechConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Second listen address serving the same router.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_bind: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: None,
            alt_bind: None,
        }
    }
}

/// LINE Messaging API channel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_access_token_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_secret_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_base_url: Option<String>,
}

/// Language-model completion configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Azure Speech configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_env: Option<String>,

    /// Neural voice name used for synthesis (e.g. "en-US-JennyNeural").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Recognition language (e.g. "en-US").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Content type declared for inbound audio sent to recognition when the
    /// container cannot be detected. WAV and OGG/Opus are detected from their
    /// headers; LINE voice messages arrive as m4a, which short-audio
    /// recognition does not accept, so they fail with a transcription error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_content_type: Option<String>,

    /// Override for the synthesis endpoint base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_endpoint: Option<String>,

    /// Override for the recognition endpoint base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Azure Blob Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_string_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_env: Option<String>,
}

// --- Resolved settings ---

/// Fully resolved runtime settings. Produced once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub line: LineSettings,
    pub completion: CompletionSettings,
    pub speech: SpeechSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub bind: String,
    pub port: u16,
    pub alt_bind: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LineSettings {
    pub channel_access_token: String,
    pub channel_secret: String,
    pub api_base_url: String,
    pub data_base_url: String,
}

#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub subscription_key: String,
    pub region: String,
    pub voice: String,
    pub language: String,
    pub input_content_type: String,
    pub tts_endpoint: Option<String>,
    pub stt_endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub connection_string: String,
    pub container: String,
}

/// Resolve a secret: direct value first, then the named environment variable.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &str) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    match std::env::var(env_var) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

/// Collects the names of required values that could not be resolved.
#[derive(Default)]
struct Requirements {
    missing: Vec<String>,
}

impl Requirements {
    fn require(&mut self, direct: &Option<String>, env_var: &Option<String>, default_env: &str) -> String {
        let env_name = env_var.as_deref().unwrap_or(default_env);
        match resolve_secret_field(direct, env_name) {
            Some(val) => val,
            None => {
                self.missing.push(env_name.to_string());
                String::new()
            }
        }
    }
}

static ENV_REF: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    ENV_REF
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn trim_url(url: Option<&String>, default: &str) -> String {
    url.map(String::as_str)
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    /// A missing file yields the default (environment-only) configuration.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using environment only");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let substituted = substitute_env_vars(&raw);

        let config = json5::from_str(&substituted)
            .map_err(|e| RelayError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Resolve every required value, reporting all missing ones at once.
    pub fn resolve(&self) -> Result<Settings> {
        let mut req = Requirements::default();

        let gateway = self.gateway.clone().unwrap_or_default();
        let line = self.line.clone().unwrap_or_default();
        let completion = self.completion.clone().unwrap_or_default();
        let speech = self.speech.clone().unwrap_or_default();
        let storage = self.storage.clone().unwrap_or_default();

        let line = LineSettings {
            channel_access_token: req.require(
                &line.channel_access_token,
                &line.channel_access_token_env,
                ENV_LINE_ACCESS_TOKEN,
            ),
            channel_secret: req.require(
                &line.channel_secret,
                &line.channel_secret_env,
                ENV_LINE_SECRET,
            ),
            api_base_url: trim_url(line.api_base_url.as_ref(), DEFAULT_LINE_API_BASE),
            data_base_url: trim_url(line.data_base_url.as_ref(), DEFAULT_LINE_DATA_BASE),
        };

        let completion = CompletionSettings {
            api_key: req.require(&completion.api_key, &completion.api_key_env, ENV_OPENAI_API_KEY),
            base_url: trim_url(completion.base_url.as_ref(), DEFAULT_OPENAI_BASE),
            model: completion
                .model
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            max_tokens: completion.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: completion.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            timeout_secs: completion.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let speech = SpeechSettings {
            subscription_key: req.require(
                &speech.subscription_key,
                &speech.subscription_key_env,
                ENV_SPEECH_KEY,
            ),
            region: req.require(&speech.region, &speech.region_env, ENV_SPEECH_REGION),
            voice: speech.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            language: speech.language.unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            input_content_type: speech
                .input_content_type
                .unwrap_or_else(|| DEFAULT_INPUT_CONTENT_TYPE.to_string()),
            tts_endpoint: speech.tts_endpoint.map(|u| u.trim_end_matches('/').to_string()),
            stt_endpoint: speech.stt_endpoint.map(|u| u.trim_end_matches('/').to_string()),
            timeout_secs: speech.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };

        let container_env = storage.container_env.as_deref().unwrap_or(ENV_BLOB_CONTAINER);
        let storage = StorageSettings {
            connection_string: req.require(
                &storage.connection_string,
                &storage.connection_string_env,
                ENV_BLOB_CONNECTION_STRING,
            ),
            container: resolve_secret_field(&storage.container, container_env)
                .unwrap_or_else(|| DEFAULT_CONTAINER.to_string()),
        };

        if !req.missing.is_empty() {
            return Err(RelayError::Config(format!(
                "missing required configuration: {}",
                req.missing.join(", ")
            )));
        }

        if completion.max_tokens == 0 {
            return Err(RelayError::Config("completion.max_tokens must be positive".into()));
        }
        if gateway.port == 0 {
            return Err(RelayError::Config("Gateway port cannot be 0".into()));
        }
        ConnectionString::parse(&storage.connection_string)?;

        Ok(Settings {
            gateway: GatewaySettings {
                bind: gateway.bind.unwrap_or_else(|| "0.0.0.0".to_string()),
                port: gateway.port,
                alt_bind: gateway.alt_bind,
            },
            line,
            completion,
            speech,
            storage,
        })
    }
}

/// Base directory for Voicebridge data: `~/.voicebridge/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voicebridge")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A config whose secrets all point at the given (test-unique) env var names.
    fn config_with_env_names(prefix: &str) -> Config {
        Config {
            gateway: None,
            line: Some(LineConfig {
                channel_access_token_env: Some(format!("{prefix}_LINE_TOKEN")),
                channel_secret_env: Some(format!("{prefix}_LINE_SECRET")),
                ..Default::default()
            }),
            completion: Some(CompletionConfig {
                api_key_env: Some(format!("{prefix}_OPENAI")),
                ..Default::default()
            }),
            speech: Some(SpeechConfig {
                subscription_key_env: Some(format!("{prefix}_SPEECH_KEY")),
                region_env: Some(format!("{prefix}_SPEECH_REGION")),
                ..Default::default()
            }),
            storage: Some(StorageConfig {
                connection_string_env: Some(format!("{prefix}_BLOB")),
                container_env: Some(format!("{prefix}_CONTAINER")),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_VB_SUBST_KEY", "sk-test-123") };
        let input = r#"{"key": "${TEST_VB_SUBST_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("sk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_VB_SUBST_KEY") };
    }

    #[test]
    fn test_env_var_missing() {
        let input = r#"{"key": "${NONEXISTENT_VAR_VB_TEST}"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains(r#""""#));
    }

    #[test]
    fn test_all_missing_values_reported() {
        let config = config_with_env_names("VB_TEST_NONE");
        let err = config.resolve().unwrap_err();
        let msg = err.to_string();
        for name in [
            "VB_TEST_NONE_LINE_TOKEN",
            "VB_TEST_NONE_LINE_SECRET",
            "VB_TEST_NONE_OPENAI",
            "VB_TEST_NONE_SPEECH_KEY",
            "VB_TEST_NONE_SPEECH_REGION",
            "VB_TEST_NONE_BLOB",
        ] {
            assert!(msg.contains(name), "{name} not reported in: {msg}");
        }
        // Container has a default and is never reported.
        assert!(!msg.contains("VB_TEST_NONE_CONTAINER"));
    }

    #[test]
    fn test_resolve_from_env_with_defaults() {
        let prefix = "VB_TEST_ENV";
        for (suffix, value) in [
            ("LINE_TOKEN", "line-token"),
            ("LINE_SECRET", "line-secret"),
            ("OPENAI", "sk-abc"),
            ("SPEECH_KEY", "speech-key"),
            ("SPEECH_REGION", "westeurope"),
            ("BLOB", "AccountName=a;AccountKey=a2V5"),
        ] {
            // SAFETY: test-only, variable names unique to this test
            unsafe { std::env::set_var(format!("{prefix}_{suffix}"), value) };
        }

        let settings = config_with_env_names(prefix).resolve().unwrap();
        assert_eq!(settings.line.channel_access_token, "line-token");
        assert_eq!(settings.line.api_base_url, "https://api.line.me");
        assert_eq!(settings.line.data_base_url, "https://api-data.line.me");
        assert_eq!(settings.completion.api_key, "sk-abc");
        assert_eq!(settings.completion.max_tokens, 100);
        assert_eq!(settings.completion.temperature, 0.5);
        assert_eq!(settings.speech.region, "westeurope");
        assert_eq!(settings.speech.voice, "en-US-JennyNeural");
        assert_eq!(settings.storage.container, "voicebridge-audio");
        assert_eq!(settings.gateway.port, 5000);
        assert_eq!(settings.gateway.bind, "0.0.0.0");

        for suffix in ["LINE_TOKEN", "LINE_SECRET", "OPENAI", "SPEECH_KEY", "SPEECH_REGION", "BLOB"] {
            unsafe { std::env::remove_var(format!("{prefix}_{suffix}")) };
        }
    }

    #[test]
    fn test_direct_values_take_priority() {
        let mut config = config_with_env_names("VB_TEST_DIRECT");
        config.line = Some(LineConfig {
            channel_access_token: Some("direct-token".into()),
            channel_secret: Some("direct-secret".into()),
            api_base_url: Some("http://127.0.0.1:9/".into()),
            ..Default::default()
        });
        config.completion = Some(CompletionConfig {
            api_key: Some("direct-key".into()),
            ..Default::default()
        });
        config.speech = Some(SpeechConfig {
            subscription_key: Some("k".into()),
            region: Some("eastus".into()),
            ..Default::default()
        });
        config.storage = Some(StorageConfig {
            connection_string: Some("AccountName=a;AccountKey=a2V5".into()),
            container: Some("replies".into()),
            ..Default::default()
        });

        let settings = config.resolve().unwrap();
        assert_eq!(settings.line.channel_access_token, "direct-token");
        assert_eq!(settings.line.api_base_url, "http://127.0.0.1:9");
        assert_eq!(settings.completion.api_key, "direct-key");
        assert_eq!(settings.storage.container, "replies");
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let mut config = config_with_env_names("VB_TEST_ZERO");
        config.line = Some(LineConfig {
            channel_access_token: Some("t".into()),
            channel_secret: Some("s".into()),
            ..Default::default()
        });
        config.completion = Some(CompletionConfig {
            api_key: Some("k".into()),
            max_tokens: Some(0),
            ..Default::default()
        });
        config.speech = Some(SpeechConfig {
            subscription_key: Some("k".into()),
            region: Some("r".into()),
            ..Default::default()
        });
        config.storage = Some(StorageConfig {
            connection_string: Some("c".into()),
            ..Default::default()
        });

        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("max_tokens"));
    }

    #[test]
    fn test_malformed_connection_string_rejected() {
        let mut config = config_with_env_names("VB_TEST_CONN");
        config.line = Some(LineConfig {
            channel_access_token: Some("t".into()),
            channel_secret: Some("s".into()),
            ..Default::default()
        });
        config.completion = Some(CompletionConfig {
            api_key: Some("k".into()),
            ..Default::default()
        });
        config.speech = Some(SpeechConfig {
            subscription_key: Some("k".into()),
            region: Some("r".into()),
            ..Default::default()
        });

        for raw in ["garbage", "AccountName=acct", "AccountKey=a2V5", "AccountName=a;AccountKey=%%%"] {
            config.storage = Some(StorageConfig {
                connection_string: Some(raw.into()),
                ..Default::default()
            });
            let err = config.resolve().unwrap_err();
            assert!(matches!(err, RelayError::Config(_)), "{raw}: {err}");
        }
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/voicebridge/config.json")).unwrap();
        assert!(config.line.is_none());
        assert!(config.gateway.is_none());
    }

    #[test]
    fn test_load_json5_file() {
        // SAFETY: test-only, variable name unique to this test
        unsafe { std::env::set_var("TEST_VB_FILE_SECRET", "from-env") };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // comments are allowed
                gateway: { port: 8080 },
                line: { channel_secret: "${TEST_VB_FILE_SECRET}" },
                completion: { model: "my-model", temperature: 0.2 },
            }"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway.as_ref().unwrap().port, 8080);
        assert_eq!(
            config.line.as_ref().unwrap().channel_secret.as_deref(),
            Some("from-env")
        );
        let completion = config.completion.unwrap();
        assert_eq!(completion.model.as_deref(), Some("my-model"));
        assert_eq!(completion.temperature, Some(0.2));
        unsafe { std::env::remove_var("TEST_VB_FILE_SECRET") };
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid").unwrap();
        assert!(matches!(Config::load(&path), Err(RelayError::Config(_))));
    }
}

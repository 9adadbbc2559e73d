//! Azure Blob Storage as a transient object store.
//!
//! Every published object gets a fresh time-based name, is uploaded with a
//! short-lived create/write SAS, and is handed out through a read-only service
//! SAS that expires one hour after publication. Objects are never deleted here;
//! access ends when the SAS expires.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, error};

use voicebridge_core::config::StorageSettings;
use voicebridge_core::error::{RelayError, Result};
use voicebridge_core::storage::ConnectionString;
use voicebridge_core::types::AudioArtifact;

use crate::ObjectStore;

/// Storage service version used to sign SAS tokens.
pub const SAS_VERSION: &str = "2021-08-06";

const READ_TTL_MINUTES: i64 = 60;
const UPLOAD_TTL_MINUTES: i64 = 5;
const CONTENT_TYPE: &str = "audio/wav";

/// Generate a unique object name: UTC timestamp to the microsecond plus a random suffix.
pub fn generate_blob_name(now: DateTime<Utc>) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("audio-{}-{}.wav", now.format("%Y%m%d%H%M%S%6f"), &id[..8])
}

/// Format a timestamp the way SAS fields expect it.
fn sas_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Build a blob-scoped service SAS query string.
pub fn blob_sas(
    account_name: &str,
    account_key: &[u8],
    container: &str,
    blob: &str,
    permissions: &str,
    expiry: DateTime<Utc>,
    https_only: bool,
) -> Result<String> {
    let expiry = sas_time(expiry);
    let protocol = if https_only { "https" } else { "" };
    let canonical_resource = format!("/blob/{account_name}/{container}/{blob}");

    // Field order is fixed by the service version; unused fields stay empty.
    let fields: [&str; 16] = [
        permissions,
        "", // signed start
        expiry.as_str(),
        canonical_resource.as_str(),
        "", // signed identifier
        "", // signed IP
        protocol,
        SAS_VERSION,
        "b", // signed resource: blob
        "",  // snapshot time
        "",  // encryption scope
        "",  // rscc
        "",  // rscd
        "",  // rsce
        "",  // rscl
        "",  // rsct
    ];
    let string_to_sign = fields.join("\n");

    let mut mac = Hmac::<Sha256>::new_from_slice(account_key)
        .map_err(|e| RelayError::Storage(format!("invalid account key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    let mut query = format!("sp={permissions}&se={}", urlencoding::encode(&expiry));
    if https_only {
        query.push_str("&spr=https");
    }
    query.push_str(&format!(
        "&sv={SAS_VERSION}&sr=b&sig={}",
        urlencoding::encode(&signature)
    ));
    Ok(query)
}

pub struct AzureBlobStore {
    connection: ConnectionString,
    container: String,
    client: reqwest::Client,
}

impl AzureBlobStore {
    pub fn new(settings: &StorageSettings, client: reqwest::Client) -> Result<Self> {
        Ok(Self {
            connection: ConnectionString::parse(&settings.connection_string)?,
            container: settings.container.clone(),
            client,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.connection.account_name
    }

    fn blob_url(&self, name: &str) -> String {
        format!("{}/{}/{name}", self.connection.blob_endpoint, self.container)
    }

    fn sas(&self, name: &str, permissions: &str, expiry: DateTime<Utc>) -> Result<String> {
        blob_sas(
            &self.connection.account_name,
            self.connection.account_key(),
            &self.container,
            name,
            permissions,
            expiry,
            self.connection.blob_endpoint.starts_with("https://"),
        )
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn publish(&self, bytes: Vec<u8>) -> Result<AudioArtifact> {
        let now = Utc::now();
        let name = generate_blob_name(now);
        let size_bytes = bytes.len();

        let upload_sas = self.sas(&name, "cw", now + TimeDelta::minutes(UPLOAD_TTL_MINUTES))?;
        let upload_url = format!("{}?{upload_sas}", self.blob_url(&name));

        debug!(name, container = %self.container, size_bytes, "Uploading blob");

        let resp = self
            .client
            .put(&upload_url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", SAS_VERSION)
            .header("Content-Type", CONTENT_TYPE)
            .body(bytes)
            .send()
            .await
            .map_err(|e| RelayError::Storage(format!("blob upload request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(%status, body, name, "Blob upload failed");
            return Err(RelayError::Storage(format!("blob upload error {status}")));
        }

        let expires_at = now + TimeDelta::minutes(READ_TTL_MINUTES);
        let read_sas = self.sas(&name, "r", expires_at)?;

        Ok(AudioArtifact {
            url: format!("{}?{read_sas}", self.blob_url(&name)),
            name,
            expires_at,
            size_bytes,
        })
    }
}

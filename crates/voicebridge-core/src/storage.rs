//! Storage account connection strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{RelayError, Result};

/// Parsed storage account connection string.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    pub account_name: String,
    account_key: Vec<u8>,
    /// Blob service endpoint without a trailing slash.
    pub blob_endpoint: String,
}

impl ConnectionString {
    /// Parse `Key=Value;...` pairs. `AccountName` and `AccountKey` are required;
    /// `BlobEndpoint` overrides the endpoint derived from protocol and suffix.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut blob_endpoint = None;

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(RelayError::Config(format!(
                    "malformed connection string segment '{pair}'"
                )));
            };
            match key {
                "AccountName" => account_name = Some(value.to_string()),
                "AccountKey" => account_key = Some(value.to_string()),
                "DefaultEndpointsProtocol" => protocol = value.to_string(),
                "EndpointSuffix" => suffix = value.to_string(),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let account_name = account_name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| RelayError::Config("connection string has no AccountName".into()))?;
        let account_key = account_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| RelayError::Config("connection string has no AccountKey".into()))?;
        let account_key = BASE64
            .decode(account_key)
            .map_err(|e| RelayError::Config(format!("AccountKey is not valid base64: {e}")))?;

        let blob_endpoint = blob_endpoint
            .unwrap_or_else(|| format!("{protocol}://{account_name}.blob.{suffix}"));

        Ok(Self {
            account_name,
            account_key,
            blob_endpoint,
        })
    }

    /// Decoded account key, the HMAC key for SAS signatures.
    pub fn account_key(&self) -> &[u8] {
        &self.account_key
    }
}

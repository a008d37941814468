//! Remote compute offload client.
//!
//! The offload platform exposes a blob store keyed by dataset id and a set of
//! named functions that mirror the local engines. Every call follows the same
//! contract: check whether the blob exists, upload it if absent, then invoke
//! the function by name and decode its JSON result.

use crate::config::OffloadConfig;
use crate::error::OffloadError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, info};

/// Remote function names.
pub mod functions {
    pub const SEGMENTATION: &str = "run_segmentation";
    pub const FORECAST: &str = "run_forecast";
    pub const DATA_AUDIT: &str = "run_data_audit";
    pub const AGENT_ANALYSIS: &str = "run_agent_analysis";
}

/// Execution surface for offloaded stages.
#[async_trait]
pub trait RemoteCompute: Send + Sync {
    /// Whether the durable store already holds the dataset.
    async fn blob_exists(&self, dataset_id: &str) -> Result<bool, OffloadError>;

    /// Store the dataset bytes under `dataset_id`.
    async fn upload_blob(&self, dataset_id: &str, bytes: &[u8]) -> Result<(), OffloadError>;

    /// Invoke a remote function and return its JSON result.
    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, OffloadError>;

    /// Upload the dataset unless the store already has it.
    async fn sync_blob(&self, dataset_id: &str, bytes: &[u8]) -> Result<(), OffloadError> {
        if self.blob_exists(dataset_id).await? {
            debug!(dataset_id, "Blob already present on offload volume");
            return Ok(());
        }
        info!(dataset_id, bytes = bytes.len(), "Uploading dataset to offload volume");
        self.upload_blob(dataset_id, bytes).await
    }
}

/// HTTP client for the offload platform.
pub struct OffloadClient {
    client: Client,
    base_url: Url,
    app_name: String,
    token: Option<String>,
    timeout_secs: u64,
}

impl OffloadClient {
    /// Build a client, or `Disabled` when offload is switched off or has no URL.
    pub fn from_config(config: &OffloadConfig) -> Result<Self, OffloadError> {
        if !config.is_active() {
            return Err(OffloadError::Disabled);
        }
        let raw_url = config.base_url.as_deref().ok_or(OffloadError::Disabled)?;
        let base_url = Url::parse(raw_url).map_err(|e| OffloadError::Request {
            message: format!("Invalid offload base URL '{}': {}", raw_url, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(OffloadError::Request {
                message: format!("Offload base URL '{}' cannot hold a path", raw_url),
            });
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| OffloadError::Request {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            base_url,
            app_name: config.app_name.clone(),
            token: std::env::var(&config.token_env).ok(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// `{base}/apps/{app}/{kind}/{name}` with every segment percent-encoded.
    fn endpoint(&self, kind: &str, name: &str) -> Result<Url, OffloadError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| OffloadError::Request {
                message: format!("Offload base URL '{}' cannot hold a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(["apps", self.app_name.as_str(), kind, name]);
        Ok(url)
    }

    fn blob_url(&self, dataset_id: &str) -> Result<Url, OffloadError> {
        self.endpoint("blobs", dataset_id)
    }

    fn function_url(&self, function: &str) -> Result<Url, OffloadError> {
        self.endpoint("functions", function)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> OffloadError {
        if e.is_timeout() {
            OffloadError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else {
            OffloadError::Request {
                message: e.to_string(),
            }
        }
    }
}

/// Hex SHA-256 of a blob, sent so the platform can verify uploads.
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Reject results that carry an `error` field, which the platform uses for
/// handled failures returned with a 200 status.
fn check_result(function: &str, value: Value) -> Result<Value, OffloadError> {
    if let Some(message) = value.get("error").and_then(|e| e.as_str()) {
        return Err(OffloadError::Remote {
            function: function.to_string(),
            status: StatusCode::OK.as_u16(),
            message: message.to_string(),
        });
    }
    Ok(value)
}

#[async_trait]
impl RemoteCompute for OffloadClient {
    async fn blob_exists(&self, dataset_id: &str) -> Result<bool, OffloadError> {
        let response = self
            .authorize(self.client.head(self.blob_url(dataset_id)?))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(OffloadError::Remote {
                function: "blob_exists".to_string(),
                status: status.as_u16(),
                message: "unexpected status".to_string(),
            }),
        }
    }

    async fn upload_blob(&self, dataset_id: &str, bytes: &[u8]) -> Result<(), OffloadError> {
        let response = self
            .authorize(self.client.put(self.blob_url(dataset_id)?))
            .header("x-content-sha256", content_digest(bytes))
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OffloadError::Remote {
                function: "upload_blob".to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }

    async fn invoke(&self, function: &str, payload: Value) -> Result<Value, OffloadError> {
        debug!(function, "Invoking remote function");
        let response = self
            .authorize(self.client.post(self.function_url(function)?))
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| OffloadError::Request {
            message: format!("Failed to read response body: {}", e),
        })?;
        if !status.is_success() {
            return Err(OffloadError::Remote {
                function: function.to_string(),
                status: status.as_u16(),
                message: body,
            });
        }
        let value: Value = serde_json::from_str(&body).map_err(|e| OffloadError::Decode {
            message: format!("{}: {}", function, e),
        })?;
        check_result(function, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unreachable_config() -> OffloadConfig {
        OffloadConfig {
            enabled: true,
            // Port 9 (discard) is closed on test machines: connection refused.
            base_url: Some("http://127.0.0.1:9/".to_string()),
            timeout_secs: 2,
            ..OffloadConfig::default()
        }
    }

    #[test]
    fn test_disabled_config_builds_no_client() {
        let err = OffloadClient::from_config(&OffloadConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, OffloadError::Disabled));
    }

    #[test]
    fn test_urls() {
        let client = OffloadClient::from_config(&unreachable_config()).unwrap();
        assert_eq!(
            client.blob_url("abc").unwrap().as_str(),
            "http://127.0.0.1:9/apps/tabula-analysis/blobs/abc"
        );
        assert_eq!(
            client.function_url(functions::FORECAST).unwrap().as_str(),
            "http://127.0.0.1:9/apps/tabula-analysis/functions/run_forecast"
        );
    }

    #[test]
    fn test_dataset_id_is_one_path_segment() {
        let client = OffloadClient::from_config(&unreachable_config()).unwrap();
        let url = client.blob_url("q3 sales?v=2#draft/b").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9/apps/tabula-analysis/blobs/q3%20sales%3Fv=2%23draft%2Fb"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path_segments().unwrap().count(), 4);
    }

    #[test]
    fn test_base_url_with_prefix() {
        let config = OffloadConfig {
            base_url: Some("http://127.0.0.1:9/compute/".to_string()),
            ..unreachable_config()
        };
        let client = OffloadClient::from_config(&config).unwrap();
        assert_eq!(
            client.blob_url("sales").unwrap().as_str(),
            "http://127.0.0.1:9/compute/apps/tabula-analysis/blobs/sales"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = OffloadConfig {
            base_url: Some("not a url".to_string()),
            ..unreachable_config()
        };
        let err = OffloadClient::from_config(&config).err().unwrap();
        assert!(matches!(err, OffloadError::Request { .. }));
    }

    #[test]
    fn test_content_digest() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_check_result_error_field() {
        let err = check_result("run_data_audit", json!({"error": "no such file"})).unwrap_err();
        assert!(matches!(err, OffloadError::Remote { status: 200, .. }));
        assert!(check_result("run_data_audit", json!({"anomalies": []})).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_platform_errors() {
        let client = OffloadClient::from_config(&unreachable_config()).unwrap();
        let result = client.sync_blob("abc", b"a,b\n1,2\n").await;
        assert!(result.is_err());
        let result = client.invoke(functions::SEGMENTATION, json!({})).await;
        assert!(matches!(
            result,
            Err(OffloadError::Request { .. }) | Err(OffloadError::Timeout { .. })
        ));
    }
}

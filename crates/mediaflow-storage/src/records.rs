//! Asset record store.
//!
//! Processors persist derived facts about an asset (technical metadata, the
//! custom thumbnail pointer, the completed proxy ladder) as partial updates.
//! Each processor writes a disjoint set of fields, so updates never conflict.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use mediaflow_models::{MetadataResult, ProxyResolution};

use crate::error::{StorageError, StorageResult};

/// Partial asset record update. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecordUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_metadata: Option<MetadataResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_thumbnail_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_resolutions: Option<Vec<ProxyResolution>>,
    pub updated_at: DateTime<Utc>,
}

impl AssetRecordUpdate {
    pub fn technical_metadata(metadata: MetadataResult) -> Self {
        Self {
            technical_metadata: Some(metadata),
            ..Self::empty()
        }
    }

    pub fn custom_thumbnail(key: impl Into<String>) -> Self {
        Self {
            custom_thumbnail_key: Some(key.into()),
            ..Self::empty()
        }
    }

    pub fn proxy_resolutions(resolutions: Vec<ProxyResolution>) -> Self {
        Self {
            proxy_resolutions: Some(resolutions),
            ..Self::empty()
        }
    }

    fn empty() -> Self {
        Self {
            technical_metadata: None,
            custom_thumbnail_key: None,
            proxy_resolutions: None,
            updated_at: Utc::now(),
        }
    }
}

/// Persists partial asset record updates.
#[async_trait]
pub trait AssetRecordStore: Send + Sync {
    async fn update_asset_record(
        &self,
        asset_id: &str,
        update: AssetRecordUpdate,
    ) -> StorageResult<()>;
}

/// Configuration for the records service client.
#[derive(Debug, Clone)]
pub struct RecordsConfig {
    /// Base URL, e.g. `https://records.internal/api`
    pub base_url: String,
    /// Bearer token, if the service requires one
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl RecordsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let base_url = std::env::var("RECORDS_API_URL")
            .map_err(|_| StorageError::config_error("RECORDS_API_URL not set"))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: std::env::var("RECORDS_API_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout: std::env::var("RECORDS_API_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
        })
    }
}

/// HTTP client for the records service (`PATCH {base}/assets/{id}`).
#[derive(Clone)]
pub struct HttpRecordStore {
    http: Client,
    base_url: Url,
    config: RecordsConfig,
}

impl HttpRecordStore {
    pub fn new(config: RecordsConfig) -> StorageResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("mediaflow-storage/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| StorageError::config_error(format!("RECORDS_API_URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::config_error(format!(
                "RECORDS_API_URL {} cannot take a path",
                config.base_url
            )));
        }

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::new(RecordsConfig::from_env()?)
    }

    /// `{base}/assets/{asset_id}` with the id as one encoded path segment.
    fn asset_url(&self, asset_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["assets", asset_id]);
        }
        url
    }
}

#[async_trait]
impl AssetRecordStore for HttpRecordStore {
    async fn update_asset_record(
        &self,
        asset_id: &str,
        update: AssetRecordUpdate,
    ) -> StorageResult<()> {
        let url = self.asset_url(asset_id);
        let mut request = self.http.patch(url.clone()).json(&update);
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        match status {
            StatusCode::OK | StatusCode::NO_CONTENT => {
                debug!("Updated asset record {}", asset_id);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(StorageError::not_found(format!("asset {}", asset_id))),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::RecordUpdateFailed {
                    status: status.as_u16(),
                    message: format!("{} failed: {}", url, body),
                })
            }
        }
    }
}

/// In-process record store that keeps every update per asset.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    updates: Arc<Mutex<HashMap<String, Vec<AssetRecordUpdate>>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates recorded for an asset, oldest first.
    pub async fn updates_for(&self, asset_id: &str) -> Vec<AssetRecordUpdate> {
        self.updates
            .lock()
            .await
            .get(asset_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssetRecordStore for MemoryRecordStore {
    async fn update_asset_record(
        &self,
        asset_id: &str,
        update: AssetRecordUpdate,
    ) -> StorageResult<()> {
        self.updates
            .lock()
            .await
            .entry(asset_id.to_string())
            .or_default()
            .push(update);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_omits_absent_fields() {
        let update = AssetRecordUpdate::custom_thumbnail("a/b/c/derived/custom-thumbnail/medium");
        let value = serde_json::to_value(&update).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(
            obj["customThumbnailKey"],
            "a/b/c/derived/custom-thumbnail/medium"
        );
        assert!(obj.contains_key("updatedAt"));
        assert!(!obj.contains_key("technicalMetadata"));
        assert!(!obj.contains_key("proxyResolutions"));
    }

    #[test]
    fn test_proxy_resolutions_wire_names() {
        let update =
            AssetRecordUpdate::proxy_resolutions(vec![ProxyResolution::P360, ProxyResolution::P720]);
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["proxyResolutions"], serde_json::json!(["360p", "720p"]));
    }

    #[tokio::test]
    async fn test_memory_record_store() {
        let store = MemoryRecordStore::new();
        store
            .update_asset_record(
                "asset-1",
                AssetRecordUpdate::technical_metadata(MetadataResult {
                    duration: Some(12.0),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();

        let updates = store.updates_for("asset-1").await;
        assert_eq!(updates.len(), 1);
        assert_eq!(
            updates[0].technical_metadata.as_ref().unwrap().duration,
            Some(12.0)
        );
        assert!(store.updates_for("other").await.is_empty());
    }

    #[test]
    fn test_asset_url() {
        let store = HttpRecordStore::new(RecordsConfig {
            base_url: "http://records.local/api".to_string(),
            api_token: None,
            timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(store.asset_url("x1").as_str(), "http://records.local/api/assets/x1");
        assert_eq!(
            store.asset_url("a/b c?d").as_str(),
            "http://records.local/api/assets/a%2Fb%20c%3Fd"
        );
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let result = HttpRecordStore::new(RecordsConfig {
            base_url: "not a url".to_string(),
            api_token: None,
            timeout: Duration::from_secs(1),
        });
        assert!(matches!(result, Err(StorageError::ConfigError(_))));
    }
}

//! R2 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use reel_models::ItemId;

use crate::error::{StorageError, StorageResult};

/// Folder used when `R2_KEY_PREFIX` is not set.
pub const DEFAULT_KEY_PREFIX: &str = "auto_reels";

/// Content type of uploaded reels.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public base URL the bucket is served from (custom domain or r2.dev)
    pub public_base_url: String,
    /// Key prefix for uploaded videos
    pub key_prefix: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| StorageError::config_error(format!("{name} not set")))
        };

        let public_base_url = required("R2_PUBLIC_BASE_URL")?;
        url::Url::parse(&public_base_url).map_err(|e| {
            StorageError::config_error(format!("R2_PUBLIC_BASE_URL is not a URL: {e}"))
        })?;

        Ok(Self {
            endpoint_url: required("R2_ENDPOINT_URL")?,
            access_key_id: required("R2_ACCESS_KEY_ID")?,
            secret_access_key: required("R2_SECRET_ACCESS_KEY")?,
            bucket_name: required("R2_BUCKET_NAME")?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url,
            key_prefix: std::env::var("R2_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
        })
    }
}

/// Object key of the reel for `item_id`.
pub fn reel_key(prefix: &str, item_id: &ItemId) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("reel_{}.mp4", item_id)
    } else {
        format!("{}/reel_{}.mp4", prefix, item_id)
    }
}

/// Public URL of `key` under `base`, with each key segment percent-encoded.
pub fn public_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

/// Somewhere a finished video can be put so that platforms can fetch it.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Upload the reel for `item_id` and return its public URL.
    async fn put_reel(&self, item_id: &ItemId, path: &Path) -> StorageResult<String>;
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base_url: String,
    key_prefix: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        Ok(Self {
            client,
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
            key_prefix: config.key_prefix,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    /// Public URL for an object key.
    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.public_base_url, key)
    }

    /// Upload a file to R2.
    pub async fn upload_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        let path = path.as_ref();
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        if !path.is_file() {
            return Err(StorageError::not_found(path.display().to_string()));
        }
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("R2 connectivity check failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl AssetStore for R2Client {
    async fn put_reel(&self, item_id: &ItemId, path: &Path) -> StorageResult<String> {
        let key = reel_key(&self.key_prefix, item_id);
        self.upload_file(path, &key, VIDEO_CONTENT_TYPE).await?;
        Ok(self.public_url(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> R2Config {
        R2Config {
            endpoint_url: "http://127.0.0.1:9".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "reels".to_string(),
            region: "auto".to_string(),
            public_base_url: "https://media.example.com/".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    #[test]
    fn test_reel_key() {
        assert_eq!(reel_key("auto_reels", &ItemId::from(42u64)), "auto_reels/reel_42.mp4");
        assert_eq!(reel_key("/nested/dir/", &ItemId::from(7u64)), "nested/dir/reel_7.mp4");
        assert_eq!(reel_key("", &ItemId::from(7u64)), "reel_7.mp4");
    }

    #[test]
    fn test_public_url_joins_and_encodes() {
        assert_eq!(
            public_url("https://media.example.com/", "auto_reels/reel_42.mp4"),
            "https://media.example.com/auto_reels/reel_42.mp4"
        );
        assert_eq!(
            public_url("https://media.example.com", "a b/reel_1.mp4"),
            "https://media.example.com/a%20b/reel_1.mp4"
        );
    }

    #[tokio::test]
    async fn test_client_public_url() {
        let client = R2Client::new(config()).await.unwrap();
        assert_eq!(
            client.public_url("auto_reels/reel_1.mp4"),
            "https://media.example.com/auto_reels/reel_1.mp4"
        );
    }

    #[tokio::test]
    async fn test_upload_missing_file_fails_fast() {
        let client = R2Client::new(config()).await.unwrap();
        let err = client
            .put_reel(&ItemId::from(1u64), Path::new("/nonexistent/reel_1.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(!err.is_retryable());
    }
}

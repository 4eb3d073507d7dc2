//! Object store API used for code bundles and module archives

use std::path::Path;

use async_trait::async_trait;
use url::Url;

use crate::errors::DeployError;

/// Object store client trait for testability
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether an object exists (head request)
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, DeployError>;

    /// Upload a local file
    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> Result<(), DeployError>;

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), DeployError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, DeployError>;
}

/// Bucket and key of an `s3://bucket/key` location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn parse(location: &str) -> Result<Self, DeployError> {
        let url = Url::parse(location)
            .map_err(|e| DeployError::ConfigError(format!("Invalid URL {}: {}", location, e)))?;

        if url.scheme() != "s3" {
            return Err(DeployError::ConfigError(format!(
                "Only s3:// locations are supported: {}",
                location
            )));
        }

        let bucket = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| DeployError::ConfigError(format!("Missing bucket: {}", location)))?;
        let key = url.path().trim_start_matches('/');
        if key.is_empty() {
            return Err(DeployError::ConfigError(format!("Missing key: {}", location)));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

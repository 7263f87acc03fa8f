//! Durable object storage interface and HTTP implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

/// External storage backend the finished clip is transferred to.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `bytes` at `path`, returning the durable public URL.
    async fn put_object(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Public URL an already-stored object resolves to.
    fn get_public_url(&self, path: &str) -> String;
}

/// Direct-PUT object storage over HTTP.
pub struct HttpStorageBackend {
    client: Client,
    upload_base_url: String,
    public_base_url: String,
}

impl HttpStorageBackend {
    pub fn new(upload_base_url: impl Into<String>, public_base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            upload_base_url: upload_base_url.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

#[async_trait]
impl StorageBackend for HttpStorageBackend {
    async fn put_object(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<String> {
        let url = format!("{}/{}", self.upload_base_url.trim_end_matches('/'), path);
        debug!(%url, size_bytes = bytes.len(), "starting object transfer");

        self.client
            .put(&url)
            .header("Content-Type", content_type)
            .header("Content-Length", bytes.len())
            .body(bytes.to_vec())
            .send()
            .await
            .context("Failed to transfer object")?
            .error_for_status()
            .context("Storage returned error status")?;

        info!(
            path,
            size_mb = bytes.len() as f64 / (1024.0 * 1024.0),
            "object stored"
        );
        Ok(self.get_public_url(path))
    }

    fn get_public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), path)
    }
}

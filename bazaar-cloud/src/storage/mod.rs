//! Attendee ID document storage
//!
//! Documents are content-addressed: `documents/{vendor_id}/{event_id}/{sha256}.{ext}`.
//! Re-uploading identical bytes yields the same key, so a retried upload is a
//! harmless overwrite.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use sha2::{Digest, Sha256};

use crate::error::BoxError;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), BoxError>;
}

/// Storage key for an attendee document
pub fn document_key(vendor_id: &str, event_id: &str, data: &[u8], ext: &str) -> String {
    let hash = hex::encode(Sha256::digest(data));
    format!("documents/{vendor_id}/{event_id}/{hash}.{ext}")
}

pub struct S3DocumentStore {
    client: S3Client,
    bucket: String,
}

impl S3DocumentStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl DocumentStore for S3DocumentStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), BoxError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(data.into())
            .content_type(content_type)
            .send()
            .await?;
        tracing::debug!(key = key, "Document uploaded to S3");
        Ok(())
    }
}

/// Filesystem store for development and tests
pub struct LocalDocumentStore {
    root: PathBuf,
}

impl LocalDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BoxError> {
        let rel = Path::new(key);
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(format!("Invalid document key: {key}").into());
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<(), BoxError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so readers never observe a half-written file
        let tmp = path.with_extension("part");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

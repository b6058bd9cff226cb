//! Object store abstraction (C2): a write-only blob sink with two backends.

mod local;
mod s3;

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Single write-only capability shared by every backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;
}

/// Build the configured backend from an output root.
///
/// A root starting with `s3://bucket/prefix` activates the S3 backend;
/// everything else is treated as a local directory. The selection is fixed
/// for the life of the process (spec.md §4.2).
pub fn build_from_root(output_root: &str) -> Box<dyn ObjectStore> {
    if let Some(rest) = output_root.strip_prefix("s3://") {
        let mut parts = rest.splitn(2, '/');
        let bucket = parts.next().unwrap_or_default().to_string();
        let prefix = parts.next().unwrap_or_default().to_string();
        Box::new(S3ObjectStore::new(bucket, prefix))
    } else {
        Box::new(LocalObjectStore::new(output_root))
    }
}

/// Compute the logical text URI for a document (spec.md §4.7h): a local
/// directory path or an `s3://bucket/prefix/...` URI, under the same
/// relative key layout used by `put`.
pub fn text_uri(output_root: &str, doc_id: &str) -> String {
    format!("{}/{}/extracted_text", output_root.trim_end_matches('/'), doc_id)
}

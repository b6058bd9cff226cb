//! S3-compatible object store backend.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::OnceCell;

use super::{ObjectStore, StorageError};

/// `key` is joined under a configured bucket and optional prefix; a single
/// object put with the supplied content type.
pub struct S3ObjectStore {
    bucket: String,
    prefix: String,
    client: OnceCell<aws_sdk_s3::Client>,
}

impl S3ObjectStore {
    pub fn new(bucket: String, prefix: String) -> Self {
        Self {
            bucket,
            prefix,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> &aws_sdk_s3::Client {
        self.client
            .get_or_init(|| async {
                let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .load()
                    .await;
                aws_sdk_s3::Client::new(&config)
            })
            .await
    }

    fn object_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError> {
        let object_key = self.object_key(key);
        self.client()
            .await
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_joins_prefix() {
        let store = S3ObjectStore::new("bucket".to_string(), "prefix".to_string());
        assert_eq!(
            store.object_key("D1/extracted_text/page_0001_fitz.md"),
            "prefix/D1/extracted_text/page_0001_fitz.md"
        );
    }

    #[test]
    fn object_key_without_prefix() {
        let store = S3ObjectStore::new("bucket".to_string(), String::new());
        assert_eq!(store.object_key("D1/page_0001_fitz.md"), "D1/page_0001_fitz.md");
    }
}

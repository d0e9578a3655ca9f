//! S3 upload backend.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption;

use super::{detect_content_type, remote_key, UploadSink};
use crate::config::UploadTarget;
use crate::error::{ArchiveError, Result};

/// Uploads artifacts to one bucket with AES256 server-side encryption.
///
/// Credentials come from the default AWS provider chain (environment,
/// shared credentials file, instance profile).
#[derive(Clone)]
pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Sink {
    pub async fn from_target(target: &UploadTarget) -> Result<Self> {
        if target.bucket.trim().is_empty() {
            return Err(ArchiveError::Config(
                "an S3 bucket is required unless uploads are disabled".to_string(),
            ));
        }
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(target.region.clone()))
            .load()
            .await;
        Ok(Self {
            client: aws_sdk_s3::Client::new(&shared),
            bucket: target.bucket.clone(),
        })
    }
}

#[async_trait]
impl UploadSink for S3Sink {
    async fn put(&self, local_path: &Path, remote_prefix: &str) -> Result<()> {
        let key = remote_key(local_path, remote_prefix)?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| ArchiveError::io(local_path, e))?;
        let content_type = detect_content_type(local_path, &bytes);
        let size = bytes.len() as i64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_length(size)
            .content_type(content_type.as_str())
            .server_side_encryption(ServerSideEncryption::Aes256)
            .send()
            .await
            .map_err(|e| ArchiveError::Upload {
                path: local_path.to_path_buf(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::debug!(bucket = %self.bucket, key = %key, size, content_type = %content_type, "Uploaded artifact");
        Ok(())
    }
}

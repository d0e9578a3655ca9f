//! Replication of local artifacts to remote object storage.
//!
//! The pipeline only sees the `UploadSink` trait. `S3Sink` is the production
//! backend (feature `s3`); `NoopSink` keeps a run local-only.

#[cfg(feature = "s3")]
pub mod s3;

use std::path::Path;

use async_trait::async_trait;

use crate::error::{ArchiveError, Result};

#[cfg(feature = "s3")]
pub use self::s3::S3Sink;

/// Stores one local file under `remote_prefix + basename(local_path)`.
///
/// Any error is treated as fatal by the pipeline.
#[async_trait]
pub trait UploadSink: Send + Sync {
    async fn put(&self, local_path: &Path, remote_prefix: &str) -> Result<()>;
}

/// Object key for a local file under a prefix.
pub fn remote_key(local_path: &Path, remote_prefix: &str) -> Result<String> {
    let name = local_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ArchiveError::Upload {
            path: local_path.to_path_buf(),
            message: "path has no UTF-8 file name".to_string(),
        })?;
    Ok(format!("{remote_prefix}{name}"))
}

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";
const SNIFF_LEN: usize = 512;

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Content type for an upload: magic bytes first, then the file extension,
/// then plain text unless the first 512 bytes hold control characters.
/// Text types are labelled UTF-8.
pub fn detect_content_type(local_path: &Path, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }
    if let Some(mime) = mime_guess::from_path(local_path).first() {
        return if mime.type_() == mime_guess::mime::TEXT && mime.get_param("charset").is_none() {
            format!("{mime}; charset=utf-8")
        } else {
            mime.to_string()
        };
    }
    let head = &data[..data.len().min(SNIFF_LEN)];
    if head.iter().copied().any(is_binary_byte) {
        OCTET_STREAM.to_string()
    } else {
        TEXT_PLAIN.to_string()
    }
}

/// Accepts every upload without sending anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

#[async_trait]
impl UploadSink for NoopSink {
    async fn put(&self, local_path: &Path, remote_prefix: &str) -> Result<()> {
        let key = remote_key(local_path, remote_prefix)?;
        tracing::debug!(path = %local_path.display(), key = %key, "Upload disabled, skipping");
        Ok(())
    }
}

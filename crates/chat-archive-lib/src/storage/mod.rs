//! Local artifact layout and the append-only writers behind it.
//!
//! ```text
//! <root>/originals/<RecordID>.json
//! <root>/transcript/<VisitorIdentity>/<YYYY-MM-DD HHMM>.txt
//! ```
//!
//! Raw records are staged next to their final name and renamed into place,
//! so an `originals/` entry is never a torn write. Transcript lines are
//! appended one `write` call at a time.

pub mod resume;

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{ArchiveError, Result};
use crate::transcript::Transcript;

pub const ORIGINALS_DIR: &str = "originals";
pub const TRANSCRIPT_DIR: &str = "transcript";

/// Reject ids that would escape `originals/` or produce hidden files.
pub fn validate_record_id(id: &str) -> Result<()> {
    let bad = id.is_empty()
        || id.starts_with('.')
        || id.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if bad {
        return Err(ArchiveError::InvalidRecordId(id.to_string()));
    }
    Ok(())
}

/// Relative path of a raw artifact, as referenced from transcript headers.
pub fn raw_relative_path(id: &str) -> String {
    format!("{ORIGINALS_DIR}/{id}.json")
}

/// Writes artifacts under a single output root.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.root.join(ORIGINALS_DIR)
    }

    pub fn transcript_root(&self) -> PathBuf {
        self.root.join(TRANSCRIPT_DIR)
    }

    /// Final location of the raw artifact for `id`.
    pub fn raw_path(&self, id: &str) -> Result<PathBuf> {
        validate_record_id(id)?;
        Ok(self.originals_dir().join(format!("{id}.json")))
    }

    /// Location of a transcript file for a resolved identity and file stem.
    pub fn transcript_path(&self, identity: &str, file_stem: &str) -> PathBuf {
        self.transcript_root()
            .join(identity)
            .join(format!("{file_stem}.txt"))
    }

    /// Idempotent directory creation; a concurrent creator winning the race is fine.
    pub async fn ensure_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| ArchiveError::io(dir, e))
    }

    /// Persist the raw body of a record, followed by a newline.
    pub async fn write_raw(&self, id: &str, raw: &str) -> Result<PathBuf> {
        let path = self.raw_path(id)?;
        self.ensure_dir(&self.originals_dir()).await?;

        let staging = path.with_extension("json.part");
        let mut body = String::with_capacity(raw.len() + 1);
        body.push_str(raw);
        body.push('\n');
        fs::write(&staging, body)
            .await
            .map_err(|e| ArchiveError::io(&staging, e))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| ArchiveError::io(&path, e))?;
        Ok(path)
    }

    /// Append one line (newline added) in a single write.
    pub async fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| ArchiveError::io(path, e))?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())
            .await
            .map_err(|e| ArchiveError::io(path, e))?;
        file.flush().await.map_err(|e| ArchiveError::io(path, e))
    }

    /// Write a transcript header then each event line, one append per line.
    /// A failure part way leaves a readable prefix on disk.
    pub async fn write_transcript(&self, transcript: &Transcript) -> Result<PathBuf> {
        let path = self.transcript_path(&transcript.identity, &transcript.file_stem);
        if let Some(dir) = path.parent() {
            self.ensure_dir(dir).await?;
        }
        self.append_line(&path, &transcript.header).await?;
        for line in &transcript.lines {
            self.append_line(&path, line).await?;
        }
        Ok(path)
    }
}

//! Offline regeneration of transcripts from raw artifacts already on disk.

use serde::Serialize;
use tokio::fs;

use crate::error::{ArchiveError, Result};
use crate::model::record::Record;
use crate::storage::ArtifactWriter;
use crate::transcript::TranscriptBuilder;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RebuildSummary {
    pub transcripts: usize,
    pub lines: usize,
}

/// Clear `transcript/` and rebuild one transcript per `originals/*.json`,
/// in file-name order. Nothing is fetched or uploaded.
pub async fn rebuild_transcripts(writer: &ArtifactWriter) -> Result<RebuildSummary> {
    let transcript_root = writer.transcript_root();
    if fs::try_exists(&transcript_root)
        .await
        .map_err(|e| ArchiveError::io(&transcript_root, e))?
    {
        tracing::info!(path = %transcript_root.display(), "Removing existing transcripts");
        fs::remove_dir_all(&transcript_root)
            .await
            .map_err(|e| ArchiveError::io(&transcript_root, e))?;
    }

    let originals = writer.originals_dir();
    let mut ids = Vec::new();
    let mut entries = fs::read_dir(&originals)
        .await
        .map_err(|e| ArchiveError::io(&originals, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ArchiveError::io(&originals, e))?
    {
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(|n| n.strip_suffix(".json")) {
            ids.push(id.to_string());
        }
    }
    ids.sort();

    let builder = TranscriptBuilder::new();
    let mut summary = RebuildSummary::default();
    for id in ids {
        let path = writer.raw_path(&id)?;
        let raw = fs::read_to_string(&path)
            .await
            .map_err(|e| ArchiveError::io(&path, e))?;
        let record = Record::parse(&raw)?;
        let transcript = builder.build(&id, &record);
        writer.write_transcript(&transcript).await?;
        summary.transcripts += 1;
        summary.lines += transcript.line_count();
    }

    tracing::info!(
        transcripts = summary.transcripts,
        lines = summary.lines,
        "Transcripts rebuilt"
    );
    Ok(summary)
}

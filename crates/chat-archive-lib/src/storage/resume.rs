use std::path::PathBuf;

use super::ArtifactWriter;

/// Decides whether a record was already extracted by an earlier run.
///
/// This is a plain existence check on `originals/<id>.json`; there is no lock,
/// so two processes sharing one output root are not coordinated.
#[derive(Debug, Clone)]
pub struct ResumeFilter {
    writer: ArtifactWriter,
}

impl ResumeFilter {
    pub fn new(writer: ArtifactWriter) -> Self {
        Self { writer }
    }

    /// True when the raw artifact for `id` is already on disk.
    ///
    /// Ids that cannot name a file are never skipped; the record worker
    /// reports them instead.
    pub fn should_skip(&self, id: &str) -> bool {
        match self.raw_path(id) {
            Some(path) => path.is_file(),
            None => false,
        }
    }

    fn raw_path(&self, id: &str) -> Option<PathBuf> {
        self.writer.raw_path(id).ok()
    }
}

//! The bounded extraction/upload pipeline.
//!
//! Work is discovered and processed in three nested stages, each behind its
//! own admission gate:
//!
//! | Stage  | Holds its slot while                          | Spawns            |
//! |--------|-----------------------------------------------|-------------------|
//! | page   | listing one page and submitting its records   | record workers    |
//! | record | fetching, writing, submitting both uploads    | two upload tasks  |
//! | upload | replicating one file                          | nothing           |
//!
//! Every worker is spawned on one `TaskTracker`. A parent always registers
//! its children before it returns, so once the date loop has finished and
//! the tracker is closed, "tracker empty" can only mean "all work done".
//!
//! The first error anywhere is recorded and cancels the run: no further
//! slots are granted, in-flight workers drain, and `run` returns that error.
//!
//! Two records from the same visitor that start in the same minute share a
//! transcript file. Each record holds that file's lock from its header line
//! until its transcript upload has finished, so blocks never interleave and
//! an upload never sees another record's partial block.

mod gate;
mod stats;

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::{PipelineConfig, UploadTarget};
use crate::error::{ArchiveError, Result};
use crate::model::date_range::DateScope;
use crate::model::record::Record;
use crate::remote::RemoteCollection;
use crate::storage::resume::ResumeFilter;
use crate::storage::{validate_record_id, ArtifactWriter, ORIGINALS_DIR};
use crate::transcript::TranscriptBuilder;
use crate::upload::UploadSink;

pub use gate::{AdmissionGate, AdmissionPermit};
pub use stats::{PipelineSummary, ProgressEvent};

use stats::PipelineStats;

/// Receives `ProgressEvent`s from worker tasks.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Extraction pipeline bound to one remote collection, upload sink and output root.
pub struct Pipeline {
    config: PipelineConfig,
    remote: Arc<dyn RemoteCollection>,
    sink: Arc<dyn UploadSink>,
    progress: Option<ProgressCallback>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        remote: Arc<dyn RemoteCollection>,
        sink: Arc<dyn UploadSink>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            remote,
            sink,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract everything in `scope` and return once every spawned worker
    /// at every stage has finished.
    pub async fn run(&self, scope: DateScope) -> Result<PipelineSummary> {
        let started = Instant::now();
        let ctx = Arc::new(RunContext::new(self)?);

        tracing::info!(
            root = %ctx.writer.root().display(),
            pages = ctx.pages.capacity(),
            records = ctx.records.capacity(),
            uploads = ctx.uploads.capacity(),
            "Starting extraction"
        );

        ctx.discover(scope).await;

        // Nothing can register new work past this point except workers
        // already tracked, which register children before they finish.
        ctx.tracker.close();
        ctx.tracker.wait().await;

        if let Some(err) = ctx.take_failure() {
            return Err(err);
        }

        let summary = ctx.stats.snapshot(started.elapsed());
        tracing::info!("Extraction finished: {}", summary.summary());
        Ok(summary)
    }
}

/// State of a single run, shared by all of its workers.
struct RunContext {
    remote: Arc<dyn RemoteCollection>,
    sink: Arc<dyn UploadSink>,
    progress: Option<ProgressCallback>,
    writer: ArtifactWriter,
    resume: ResumeFilter,
    transcripts: TranscriptBuilder,
    upload_target: UploadTarget,
    pages: AdmissionGate,
    records: AdmissionGate,
    uploads: AdmissionGate,
    tracker: TaskTracker,
    cancel: CancellationToken,
    claimed: Mutex<HashSet<String>>,
    transcript_locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
    failure: Mutex<Option<ArchiveError>>,
    stats: PipelineStats,
}

impl RunContext {
    fn new(pipeline: &Pipeline) -> Result<Self> {
        let config = &pipeline.config;
        let writer = ArtifactWriter::new(config.output_root.clone());
        Ok(Self {
            remote: Arc::clone(&pipeline.remote),
            sink: Arc::clone(&pipeline.sink),
            progress: pipeline.progress.clone(),
            resume: ResumeFilter::new(writer.clone()),
            writer,
            transcripts: TranscriptBuilder::new(),
            upload_target: config.upload.clone(),
            pages: AdmissionGate::new("page", config.concurrency.pages)?,
            records: AdmissionGate::new("record", config.concurrency.records)?,
            uploads: AdmissionGate::new("upload", config.concurrency.uploads)?,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            claimed: Mutex::new(HashSet::new()),
            transcript_locks: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
            stats: PipelineStats::default(),
        })
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.progress {
            cb(event);
        }
    }

    /// Record the first fatal error and stop admitting work.
    fn fail(&self, err: ArchiveError) {
        let mut slot = self.failure.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_none() {
            tracing::error!(error = %err, "Fatal error, aborting extraction");
            *slot = Some(err);
        } else {
            tracing::debug!(error = %err, "Further error after abort");
        }
        drop(slot);
        self.cancel.cancel();
    }

    fn take_failure(&self) -> Option<ArchiveError> {
        self.failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
    }

    /// First claim of `id` in this run wins; later listings of it are ignored.
    fn claim(&self, id: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id.to_string())
    }

    /// Exclusive hold on one transcript file for the rest of a record's work.
    async fn lock_transcript(&self, path: PathBuf) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .transcript_locks
                .lock()
                .unwrap_or_else(|p| p.into_inner());
            Arc::clone(locks.entry(path).or_default())
        };
        lock.lock_owned().await
    }

    /// Wait for a slot on `gate`, unless the run has been aborted.
    async fn admit(&self, gate: &AdmissionGate) -> Option<AdmissionPermit> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = gate.acquire() => match permit {
                Ok(permit) => Some(permit),
                Err(e) => {
                    self.fail(e);
                    None
                }
            },
        }
    }

    /// Date loop: query page counts and submit page workers.
    async fn discover(self: &Arc<Self>, scope: DateScope) {
        for date in scope.filters() {
            if self.cancel.is_cancelled() {
                return;
            }

            let total_pages = match self.remote.total_pages(date).await {
                Ok(n) => n,
                Err(e) => {
                    self.fail(e);
                    return;
                }
            };
            PipelineStats::bump(&self.stats.dates_scanned);
            self.emit(ProgressEvent::DateStarted { date, total_pages });

            if total_pages == 0 {
                PipelineStats::bump(&self.stats.empty_dates);
                tracing::info!(date = %DateLabel(date), "No chats for date");
                continue;
            }
            tracing::info!(date = %DateLabel(date), total_pages, "Listing pages");

            for page in 1..=total_pages {
                let Some(permit) = self.admit(&self.pages).await else {
                    return;
                };
                let ctx = Arc::clone(self);
                self.tracker.spawn(async move {
                    let _permit = permit;
                    match ctx.page_worker(date, page).await {
                        Ok(()) => PipelineStats::bump(&ctx.stats.pages_completed),
                        Err(e) => ctx.fail(e),
                    }
                });
            }
        }
    }

    /// List one page and submit a record worker per id not already on disk.
    async fn page_worker(self: &Arc<Self>, date: Option<NaiveDate>, page: u32) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let ids = self.remote.list_record_ids(date, page).await?;
        PipelineStats::add(&self.stats.records_listed, ids.len());

        let mut submitted = 0usize;
        let mut skipped = 0usize;
        for id in ids {
            if self.resume.should_skip(&id) {
                skipped += 1;
                PipelineStats::bump(&self.stats.records_skipped);
                tracing::debug!(id = %id, "Already extracted, skipping");
                continue;
            }
            if !self.claim(&id) {
                PipelineStats::bump(&self.stats.records_duplicate);
                tracing::debug!(id = %id, page, "Listed twice in this run, skipping");
                continue;
            }

            let Some(permit) = self.admit(&self.records).await else {
                return Ok(());
            };
            let ctx = Arc::clone(self);
            self.tracker.spawn(async move {
                let _permit = permit;
                match ctx.record_worker(&id).await {
                    Ok(true) => PipelineStats::bump(&ctx.stats.records_extracted),
                    Ok(false) => {}
                    Err(e) => ctx.fail(e),
                }
            });
            submitted += 1;
        }

        tracing::debug!(date = %DateLabel(date), page, submitted, skipped, "Page submitted");
        self.emit(ProgressEvent::PageListed {
            page,
            submitted,
            skipped,
        });
        Ok(())
    }

    /// Fetch, persist and transcribe one record, submitting an upload after
    /// each artifact. Returns `false` when the run was aborted part way.
    async fn record_worker(self: &Arc<Self>, id: &str) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        validate_record_id(id)?;

        let raw = self.remote.fetch_record(id).await?;
        let record = Record::parse(&raw)?;

        let raw_path = self.writer.write_raw(id, &raw).await?;
        let raw_prefix = self.upload_target.remote_prefix(ORIGINALS_DIR);
        if !self.submit_upload(raw_path, raw_prefix, None).await {
            return Ok(false);
        }

        let transcript = self.transcripts.build(id, &record);
        let hold = self
            .lock_transcript(
                self.writer
                    .transcript_path(&transcript.identity, &transcript.file_stem),
            )
            .await;
        let transcript_path = self.writer.write_transcript(&transcript).await?;
        PipelineStats::add(&self.stats.transcript_lines, transcript.line_count());
        let transcript_prefix = self.upload_target.remote_prefix(&transcript.relative_dir());
        if !self
            .submit_upload(transcript_path, transcript_prefix, Some(hold))
            .await
        {
            return Ok(false);
        }

        tracing::debug!(id, identity = %transcript.identity, events = transcript.lines.len(), "Record extracted");
        self.emit(ProgressEvent::RecordExtracted { id: id.to_string() });
        Ok(true)
    }

    /// Take an upload slot and spawn the upload. `false` if the run was aborted first.
    ///
    /// `hold` is released once the upload finishes.
    async fn submit_upload(
        self: &Arc<Self>,
        path: PathBuf,
        remote_prefix: String,
        hold: Option<OwnedMutexGuard<()>>,
    ) -> bool {
        let Some(permit) = self.admit(&self.uploads).await else {
            return false;
        };
        let ctx = Arc::clone(self);
        self.tracker.spawn(async move {
            let _permit = permit;
            let _hold = hold;
            match ctx.sink.put(&path, &remote_prefix).await {
                Ok(()) => {
                    PipelineStats::bump(&ctx.stats.uploads_completed);
                    ctx.emit(ProgressEvent::UploadFinished {
                        key_prefix: remote_prefix,
                    });
                }
                Err(e) => ctx.fail(e),
            }
        });
        true
    }
}

/// Displays a date filter, `all` when unfiltered.
struct DateLabel(Option<NaiveDate>);

impl std::fmt::Display for DateLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            None => f.write_str("all"),
        }
    }
}

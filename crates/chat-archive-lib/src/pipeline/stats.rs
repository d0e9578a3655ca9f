use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

/// Live counters shared by every worker of one run.
#[derive(Debug, Default)]
pub(crate) struct PipelineStats {
    pub dates_scanned: AtomicUsize,
    pub empty_dates: AtomicUsize,
    pub pages_completed: AtomicUsize,
    pub records_listed: AtomicUsize,
    pub records_skipped: AtomicUsize,
    pub records_duplicate: AtomicUsize,
    pub records_extracted: AtomicUsize,
    pub transcript_lines: AtomicUsize,
    pub uploads_completed: AtomicUsize,
}

impl PipelineStats {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, elapsed: Duration) -> PipelineSummary {
        let get = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        PipelineSummary {
            dates_scanned: get(&self.dates_scanned),
            empty_dates: get(&self.empty_dates),
            pages_completed: get(&self.pages_completed),
            records_listed: get(&self.records_listed),
            records_skipped: get(&self.records_skipped),
            records_duplicate: get(&self.records_duplicate),
            records_extracted: get(&self.records_extracted),
            transcript_lines: get(&self.transcript_lines),
            uploads_completed: get(&self.uploads_completed),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Final counts of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub dates_scanned: usize,
    pub empty_dates: usize,
    pub pages_completed: usize,
    pub records_listed: usize,
    /// Already on disk from an earlier run.
    pub records_skipped: usize,
    /// Listed more than once during this run (pagination shifted underneath us).
    pub records_duplicate: usize,
    pub records_extracted: usize,
    pub transcript_lines: usize,
    pub uploads_completed: usize,
    pub elapsed_ms: u64,
}

impl PipelineSummary {
    /// Page, record and upload workers that ran to completion.
    pub fn worker_completions(&self) -> usize {
        self.pages_completed + self.records_extracted + self.uploads_completed
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "dates={} (empty={}) pages={} listed={} skipped={} duplicate={} extracted={} transcript_lines={} uploads={} in {:.1}s",
            self.dates_scanned,
            self.empty_dates,
            self.pages_completed,
            self.records_listed,
            self.records_skipped,
            self.records_duplicate,
            self.records_extracted,
            self.transcript_lines,
            self.uploads_completed,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}

/// Notifications delivered to an optional progress callback while a run is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Page count for a date is known. `None` is the unfiltered collection.
    DateStarted {
        date: Option<NaiveDate>,
        total_pages: u32,
    },
    /// A page was listed and its records submitted.
    PageListed {
        page: u32,
        submitted: usize,
        skipped: usize,
    },
    /// Raw artifact and transcript written, uploads submitted.
    RecordExtracted { id: String },
    UploadFinished { key_prefix: String },
}

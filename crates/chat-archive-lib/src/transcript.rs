//! Human-readable transcripts derived from a record.
//!
//! A transcript lives at `transcript/<identity>/<YYYY-MM-DD HHMM>.txt`. The
//! identity buckets chats per visitor; the file stem is the chat start time
//! rendered in UTC.
//!
//! Identity resolution order:
//! 1. `visitor.email` when present and non-empty,
//! 2. the pre-chat survey answer keyed exactly `"E-mail:"`,
//! 3. `"unknown"`.
//!
//! The result is sanitised to `[A-Za-z0-9\-@+._]` because visitors mistype
//! their own addresses and the value becomes a directory name.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::record::{Event, Record};
use crate::storage::raw_relative_path;

/// Identity used when nothing usable was supplied.
pub const UNKNOWN_IDENTITY: &str = "unknown";
/// Survey key that carries the visitor email on the pre-chat form.
pub const SURVEY_EMAIL_KEY: &str = "E-mail:";
/// `chrono` format of the transcript file stem.
pub const FILE_STEM_FORMAT: &str = "%Y-%m-%d %H%M";

static DISALLOWED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9\-@+._]+").expect("identity pattern is valid"));

/// Strip every character outside `[A-Za-z0-9\-@+._]`.
pub fn sanitize_identity(raw: &str) -> String {
    DISALLOWED.replace_all(raw, "").into_owned()
}

/// Resolve and sanitise the visitor identity of a record.
///
/// Sanitising can leave nothing usable (`"!!!"`) or a dot-only segment
/// (`".."`); both fall back to `"unknown"` so the directory stays inside
/// `transcript/`.
pub fn resolve_identity(record: &Record) -> String {
    let email = record
        .visitor
        .email
        .as_deref()
        .filter(|e| !e.is_empty());
    let survey = || {
        record
            .prechat_survey
            .iter()
            .find(|entry| entry.key == SURVEY_EMAIL_KEY)
            .map(|entry| entry.value.as_str())
            .filter(|v| !v.is_empty())
    };

    let raw = email.or_else(survey).unwrap_or(UNKNOWN_IDENTITY);
    let clean = sanitize_identity(raw);
    if clean.chars().all(|c| c == '.') {
        UNKNOWN_IDENTITY.to_string()
    } else {
        clean
    }
}

/// Transcript file stem for a chat start time (epoch seconds, UTC).
pub fn file_stem(started_timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(started_timestamp, 0)
        .unwrap_or_default()
        .format(FILE_STEM_FORMAT)
        .to_string()
}

/// First line of every transcript, pointing back at the raw artifact.
pub fn header_line(record_id: &str) -> String {
    format!("Original File is: ./{}", raw_relative_path(record_id))
}

/// `<date> - [<author_name>|<agent_id>]  <text>`
pub fn event_line(event: &Event) -> String {
    format!(
        "{} - [{}|{}]  {}",
        event.date, event.author_name, event.agent_id, event.text
    )
}

/// Everything needed to write one transcript file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub identity: String,
    pub file_stem: String,
    pub header: String,
    /// One entry per event, in source order.
    pub lines: Vec<String>,
}

impl Transcript {
    /// Directory of this transcript relative to the output root.
    pub fn relative_dir(&self) -> String {
        format!("{}/{}", crate::storage::TRANSCRIPT_DIR, self.identity)
    }

    /// Header plus event lines.
    pub fn line_count(&self) -> usize {
        self.lines.len() + 1
    }
}

/// Projects a record into its transcript.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptBuilder;

impl TranscriptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// `record_id` is the identifier the record was listed under; it names the
    /// raw artifact the header points at.
    pub fn build(&self, record_id: &str, record: &Record) -> Transcript {
        Transcript {
            identity: resolve_identity(record),
            file_stem: file_stem(record.started_timestamp),
            header: header_line(record_id),
            lines: record.events.iter().map(event_line).collect(),
        }
    }
}

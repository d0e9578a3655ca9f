//! Library entry point for the chat archive.
//!
//! Conversations are pulled from a paginated remote collection, written to a
//! local output root as raw JSON plus a per-visitor transcript, and replicated
//! to object storage. The `pipeline` module drives the three bounded worker
//! stages; the other modules are the pieces it plugs together.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_archive::{
//!     Credentials, DateScope, LiveChatClient, NoopSink, Pipeline, PipelineConfig,
//! };
//!
//! # async fn demo() -> chat_archive::Result<()> {
//! let config = PipelineConfig::default();
//! let creds = Credentials::from_parts(Some("me@example.com".into()), Some("key".into()))?;
//! let remote = Arc::new(LiveChatClient::new(creds, config.retry)?);
//! let pipeline = Pipeline::new(config, remote, Arc::new(NoopSink))?;
//! let summary = pipeline.run(DateScope::Unfiltered).await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```

// Public modules
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod rebuild;
pub mod remote;
pub mod storage;
pub mod transcript;
pub mod upload;

// Re-export primary types for ergonomic use.
pub use config::{ConcurrencyBudget, Credentials, PipelineConfig, RetryPolicy, UploadTarget};
pub use error::{ArchiveError, Result};
pub use model::date_range::{DateRange, DateScope};
pub use model::record::{Event, Record};
pub use pipeline::{
    AdmissionGate, AdmissionPermit, Pipeline, PipelineSummary, ProgressCallback, ProgressEvent,
};
pub use rebuild::{rebuild_transcripts, RebuildSummary};
pub use remote::{LiveChatClient, RemoteCollection};
pub use storage::resume::ResumeFilter;
pub use storage::ArtifactWriter;
pub use transcript::{Transcript, TranscriptBuilder};
pub use upload::{NoopSink, UploadSink};

#[cfg(feature = "s3")]
pub use upload::S3Sink;

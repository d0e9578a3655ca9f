//! Run configuration: output location, stage budgets, retry policy and the
//! remote upload target.
//!
//! Everything here is fixed when a `Pipeline` is constructed and never changes
//! while it runs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Default number of concurrent page listings.
pub const DEFAULT_PAGE_CONCURRENCY: usize = 3;
/// Default number of concurrent record workers.
pub const DEFAULT_RECORD_CONCURRENCY: usize = 3;
/// Default number of concurrent uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 50;

/// Independent ceilings for the three worker stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyBudget {
    /// Concurrent page listings.
    pub pages: usize,
    /// Concurrent record fetch/write workers.
    pub records: usize,
    /// Concurrent uploads.
    pub uploads: usize,
}

impl Default for ConcurrencyBudget {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGE_CONCURRENCY,
            records: DEFAULT_RECORD_CONCURRENCY,
            uploads: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }
}

/// Bounded exponential backoff for transient API failures.
///
/// `max_retries = 0` restores the all-or-nothing behaviour: the first failed
/// request aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubling each time and
    /// capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

/// Where artifacts are replicated to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub bucket: String,
    pub region: String,
    /// Key prefix inside the bucket. Empty means the bucket root.
    #[serde(default)]
    pub prefix: String,
}

impl Default for UploadTarget {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "eu-west-1".to_string(),
            prefix: String::new(),
        }
    }
}

impl UploadTarget {
    /// Remote key prefix for a path relative to the output root.
    ///
    /// ```
    /// use chat_archive::UploadTarget;
    ///
    /// let mut target = UploadTarget::default();
    /// assert_eq!(target.remote_prefix("originals"), "originals/");
    /// target.prefix = "/backups/chat/".to_string();
    /// assert_eq!(target.remote_prefix("transcript/a@b.com"), "backups/chat/transcript/a@b.com/");
    /// ```
    pub fn remote_prefix(&self, relative_dir: &str) -> String {
        let base = self.prefix.trim_matches('/');
        let rel = relative_dir.trim_matches('/');
        match (base.is_empty(), rel.is_empty()) {
            (true, true) => String::new(),
            (true, false) => format!("{rel}/"),
            (false, true) => format!("{base}/"),
            (false, false) => format!("{base}/{rel}/"),
        }
    }
}

/// Top-level configuration for one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root holding `originals/` and `transcript/`.
    pub output_root: PathBuf,
    #[serde(default)]
    pub concurrency: ConcurrencyBudget,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub upload: UploadTarget,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("./files"),
            concurrency: ConcurrencyBudget::default(),
            retry: RetryPolicy::default(),
            upload: UploadTarget::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject budgets that could never admit any work.
    pub fn validate(&self) -> Result<()> {
        let c = &self.concurrency;
        for (stage, value) in [("page", c.pages), ("record", c.records), ("upload", c.uploads)] {
            if value == 0 {
                return Err(ArchiveError::Config(format!(
                    "{stage} concurrency must be at least 1"
                )));
            }
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ArchiveError::Config(
                "initial backoff must not exceed the maximum backoff".to_string(),
            ));
        }
        Ok(())
    }
}

/// LiveChat API login and key. Both are required before any work starts.
#[derive(Clone)]
pub struct Credentials {
    pub login: String,
    pub api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from optional parts, failing when either is missing or blank.
    pub fn from_parts(login: Option<String>, api_key: Option<String>) -> Result<Self> {
        let login = login.filter(|s| !s.trim().is_empty());
        let api_key = api_key.filter(|s| !s.trim().is_empty());
        match (login, api_key) {
            (Some(login), Some(api_key)) => Ok(Self { login, api_key }),
            _ => Err(ArchiveError::Config(
                "Missing LiveChat credentials (LIVECHAT_LOGIN / LIVECHAT_API_KEY)".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let config = PipelineConfig::default();
        assert_eq!(config.concurrency.pages, 3);
        assert_eq!(config.concurrency.records, 3);
        assert_eq!(config.concurrency.uploads, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let mut config = PipelineConfig::default();
        config.concurrency.records = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("record concurrency"));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2_000));
        assert_eq!(policy.backoff(10), Duration::from_millis(8_000));
    }

    #[test]
    fn test_remote_prefix_empty_base() {
        let target = UploadTarget::default();
        assert_eq!(target.remote_prefix("originals/"), "originals/");
        assert_eq!(target.remote_prefix(""), "");
    }

    #[test]
    fn test_credentials_required() {
        assert!(Credentials::from_parts(None, Some("key".into())).is_err());
        assert!(Credentials::from_parts(Some("me".into()), Some("  ".into())).is_err());
        let creds = Credentials::from_parts(Some("me".into()), Some("key".into())).unwrap();
        assert_eq!(creds.login, "me");
        assert!(!format!("{creds:?}").contains("\"key\""));
    }

    #[test]
    fn test_serde_roundtrip_with_defaults() {
        let parsed: PipelineConfig =
            serde_json::from_str(r#"{"output_root":"/tmp/out"}"#).unwrap();
        assert_eq!(parsed.output_root, PathBuf::from("/tmp/out"));
        assert_eq!(parsed.concurrency, ConcurrencyBudget::default());
        assert_eq!(parsed.retry, RetryPolicy::default());
    }
}

//! The paginated source of conversation records.

pub mod livechat;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;

pub use livechat::LiveChatClient;

/// A paginated, optionally date-filtered collection of records.
///
/// Each call is one logical request; implementations may retry transient
/// failures internally but must surface anything else as an error.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Number of pages for `date` (`None` = whole collection). Re-queried per date.
    async fn total_pages(&self, date: Option<NaiveDate>) -> Result<u32>;

    /// Record identifiers on one 1-based page, in listing order.
    async fn list_record_ids(&self, date: Option<NaiveDate>, page: u32) -> Result<Vec<String>>;

    /// Full raw body of one record.
    async fn fetch_record(&self, id: &str) -> Result<String>;
}

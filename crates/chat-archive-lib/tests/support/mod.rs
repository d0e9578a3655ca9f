//! In-memory remote collection and recording upload sink shared by the
//! pipeline integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chat_archive::{ArchiveError, RemoteCollection, Result, UploadSink};
use chrono::NaiveDate;
use serde_json::json;

/// Tracks how many callers are inside a section at once.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
}

pub struct ProbeGuard<'a>(&'a ConcurrencyProbe);

impl ConcurrencyProbe {
    pub fn enter(&self) -> ProbeGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(self)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Raw body of a chat in the shape the LiveChat API returns.
pub fn chat_json(id: &str, started: i64, email: Option<&str>, events: &[(&str, &str, &str, &str)]) -> String {
    let events: Vec<_> = events
        .iter()
        .map(|(date, author, agent, text)| {
            json!({"date": date, "author_name": author, "agent_id": agent, "text": text, "type": "message"})
        })
        .collect();
    let mut chat = json!({
        "id": id,
        "started_timestamp": started,
        "events": events,
        "prechat_survey": [],
    });
    if let Some(email) = email {
        chat["visitor"] = json!({ "email": email, "name": "Visitor" });
    }
    chat.to_string()
}

#[derive(Default)]
pub struct MockCollection {
    pages: HashMap<Option<NaiveDate>, Vec<Vec<String>>>,
    records: HashMap<String, String>,
    failing_ids: Vec<String>,
    delay: Option<Duration>,
    pub total_page_calls: Mutex<Vec<Option<NaiveDate>>>,
    pub list_calls: Mutex<Vec<(Option<NaiveDate>, u32)>>,
    pub fetches: Mutex<Vec<String>>,
    pub listing_probe: ConcurrencyProbe,
    pub fetch_probe: ConcurrencyProbe,
}

impl MockCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages of record ids served for `date`.
    pub fn with_pages(mut self, date: Option<NaiveDate>, pages: Vec<Vec<&str>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|p| p.into_iter().map(str::to_string).collect())
            .collect();
        self.pages.insert(date, pages);
        self
    }

    pub fn with_record(mut self, id: &str, raw: String) -> Self {
        self.records.insert(id.to_string(), raw);
        self
    }

    /// Fill in a generic two-event record for every listed id without one.
    pub fn with_default_records(mut self) -> Self {
        let ids: Vec<String> = self.pages.values().flatten().flatten().cloned().collect();
        for (i, id) in ids.iter().enumerate() {
            self.records.entry(id.clone()).or_insert_with(|| {
                chat_json(
                    id,
                    1_514_800_800 + (i as i64) * 3600,
                    Some(&format!("visitor{i}@example.com")),
                    &[("d1", "Visitor", "", "hello"), ("d2", "Agent", "agent@co", "hi there")],
                )
            });
        }
        self
    }

    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing_ids.push(id.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl RemoteCollection for MockCollection {
    async fn total_pages(&self, date: Option<NaiveDate>) -> Result<u32> {
        self.total_page_calls.lock().unwrap().push(date);
        Ok(self.pages.get(&date).map(|p| p.len() as u32).unwrap_or(0))
    }

    async fn list_record_ids(&self, date: Option<NaiveDate>, page: u32) -> Result<Vec<String>> {
        let _inside = self.listing_probe.enter();
        self.list_calls.lock().unwrap().push((date, page));
        self.pause().await;
        let pages = self.pages.get(&date).cloned().unwrap_or_default();
        Ok(pages
            .get(page.saturating_sub(1) as usize)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_record(&self, id: &str) -> Result<String> {
        let _inside = self.fetch_probe.enter();
        self.fetches.lock().unwrap().push(id.to_string());
        self.pause().await;
        if self.failing_ids.iter().any(|f| f == id) {
            return Err(ArchiveError::Api {
                status: 500,
                path: format!("chats/{id}"),
                body: "boom".to_string(),
            });
        }
        self.records.get(id).cloned().ok_or_else(|| ArchiveError::Api {
            status: 404,
            path: format!("chats/{id}"),
            body: String::new(),
        })
    }
}

/// Remembers every upload instead of sending it anywhere.
#[derive(Default)]
pub struct RecordingSink {
    pub uploads: Mutex<Vec<(PathBuf, String)>>,
    /// File contents as seen at upload time, keyed by remote key.
    pub contents: Mutex<Vec<(String, String)>>,
    pub probe: ConcurrencyProbe,
    delay: Option<Duration>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    /// Remote keys (`prefix + basename`) in upload order.
    pub fn keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .unwrap()
            .iter()
            .map(|(path, prefix)| {
                let name = path.file_name().unwrap().to_string_lossy();
                format!("{prefix}{name}")
            })
            .collect()
    }
}

#[async_trait]
impl UploadSink for RecordingSink {
    async fn put(&self, local_path: &Path, remote_prefix: &str) -> Result<()> {
        let _inside = self.probe.enter();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(ArchiveError::Upload {
                path: local_path.to_path_buf(),
                message: "access denied".to_string(),
            });
        }
        assert!(local_path.is_file(), "uploaded before written: {}", local_path.display());
        let name = local_path.file_name().unwrap().to_string_lossy();
        let body = std::fs::read_to_string(local_path).unwrap_or_default();
        self.contents
            .lock()
            .unwrap()
            .push((format!("{remote_prefix}{name}"), body));
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), remote_prefix.to_string()));
        Ok(())
    }
}

/// Every file under `root`, keyed by relative path.
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Vec<u8>>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(root, &path, out);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
                out.insert(rel, std::fs::read(&path).unwrap());
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

pub fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}

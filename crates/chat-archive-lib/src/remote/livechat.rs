//! LiveChat REST API (v2) client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

use super::RemoteCollection;
use crate::config::{Credentials, RetryPolicy};
use crate::error::{ArchiveError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.livechatinc.com";
const API_VERSION: &str = "2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Listing body of `GET /chats`. Only the fields we page with are read.
#[derive(Debug, Deserialize)]
struct ChatListing {
    #[serde(default)]
    pages: Option<Value>,
    #[serde(default)]
    chats: Vec<ChatSummary>,
}

#[derive(Debug, Deserialize)]
struct ChatSummary {
    #[serde(default)]
    id: Value,
}

fn page_count(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n.as_u64().map(|v| v.min(u32::MAX as u64) as u32).unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Relative request path for the chat listing.
pub(crate) fn chats_path(date: Option<NaiveDate>, page: Option<u32>) -> String {
    let mut params: Vec<String> = Vec::new();
    if let Some(day) = date {
        let day = day.format("%Y-%m-%d");
        params.push(format!("date_from={day}"));
        params.push(format!("date_to={day}"));
    }
    if let Some(page) = page {
        params.push(format!("page={page}"));
    }
    if params.is_empty() {
        "chats".to_string()
    } else {
        format!("chats?{}", params.join("&"))
    }
}

/// HTTP client for the LiveChat chat archive.
pub struct LiveChatClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    retry: RetryPolicy,
}

impl LiveChatClient {
    pub fn new(credentials: Credentials, retry: RetryPolicy) -> Result<Self> {
        Self::with_base_url(credentials, retry, DEFAULT_BASE_URL)
    }

    /// Point the client at another host (proxies, test servers).
    pub fn with_base_url(
        credentials: Credentials,
        retry: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(client, credentials, retry, base_url))
    }

    pub(crate) fn with_client(
        client: reqwest::Client,
        credentials: Credentials,
        retry: RetryPolicy,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            retry,
        }
    }

    /// GET `path`, retrying transient failures per the retry policy.
    async fn get_text(&self, path: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            match self.get_once(path).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        path,
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, path: &str) -> Result<String> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .header("X-API-Version", API_VERSION)
            .basic_auth(&self.credentials.login, Some(&self.credentials.api_key))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ArchiveError::Api {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            });
        }

        Ok(resp.text().await?)
    }

    async fn listing(&self, date: Option<NaiveDate>, page: Option<u32>) -> Result<ChatListing> {
        let body = self.get_text(&chats_path(date, page)).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RemoteCollection for LiveChatClient {
    async fn total_pages(&self, date: Option<NaiveDate>) -> Result<u32> {
        let listing = self.listing(date, None).await?;
        Ok(page_count(listing.pages.as_ref()))
    }

    async fn list_record_ids(&self, date: Option<NaiveDate>, page: u32) -> Result<Vec<String>> {
        let listing = self.listing(date, Some(page)).await?;
        Ok(listing.chats.iter().filter_map(|c| id_string(&c.id)).collect())
    }

    async fn fetch_record(&self, id: &str) -> Result<String> {
        self.get_text(&format!("chats/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP endpoint answering the n-th request with `script[n]`
    /// (the last entry repeats). Keeps every request head it saw.
    struct StubApi {
        base_url: String,
        hits: Arc<AtomicUsize>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl StubApi {
        async fn start(script: Vec<(u16, &'static str)>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let requests = Arc::new(Mutex::new(Vec::new()));
            let (served, seen) = (Arc::clone(&hits), Arc::clone(&requests));
            tokio::spawn(async move {
                while let Ok((mut socket, _)) = listener.accept().await {
                    let mut head = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => head.extend_from_slice(&buf[..n]),
                        }
                    }
                    seen.lock().unwrap().push(String::from_utf8_lossy(&head).into_owned());
                    let n = served.fetch_add(1, Ordering::SeqCst);
                    let (status, body) = script[n.min(script.len() - 1)];
                    let response = format!(
                        "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
            });
            Self {
                base_url: format!("http://{addr}"),
                hits,
                requests,
            }
        }

        fn client(&self, max_retries: u32) -> LiveChatClient {
            let http = reqwest::Client::builder().no_proxy().build().unwrap();
            let credentials = Credentials {
                login: "me@example.com".to_string(),
                api_key: "secret".to_string(),
            };
            let retry = RetryPolicy {
                max_retries,
                initial_backoff_ms: 1,
                max_backoff_ms: 4,
            };
            LiveChatClient::with_client(http, credentials, retry, self.base_url.as_str())
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    fn status_of(err: ArchiveError) -> u16 {
        match err {
            ArchiveError::Api { status, .. } => status,
            other => panic!("expected an API error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_server_errors_retried_until_success() {
        let api = StubApi::start(vec![(503, ""), (500, ""), (200, r#"{"pages": 4, "chats": []}"#)]).await;
        let pages = api.client(3).total_pages(None).await.unwrap();
        assert_eq!(pages, 4);
        assert_eq!(api.hits(), 3);

        let head = api.requests.lock().unwrap()[0].to_ascii_lowercase();
        assert!(head.starts_with("get /chats "), "{head}");
        assert!(head.contains("x-api-version: 2"), "{head}");
        assert!(head.contains("authorization: basic "), "{head}");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let api = StubApi::start(vec![(500, "oops")]).await;
        let err = api.client(2).fetch_record("R1").await.unwrap_err();
        assert_eq!(status_of(err), 500);
        assert_eq!(api.hits(), 3, "one attempt plus two retries");
    }

    #[tokio::test]
    async fn test_throttling_retried() {
        let api = StubApi::start(vec![(429, ""), (200, r#"{"id":"R1"}"#)]).await;
        let body = api.client(3).fetch_record("R1").await.unwrap();
        assert_eq!(body, r#"{"id":"R1"}"#);
        assert_eq!(api.hits(), 2);
        assert!(api.requests.lock().unwrap()[1].starts_with("GET /chats/R1 "));
    }

    #[tokio::test]
    async fn test_unauthorized_not_retried() {
        let api = StubApi::start(vec![(401, "bad key"), (200, "{}")]).await;
        let err = api.client(3).total_pages(None).await.unwrap_err();
        assert_eq!(status_of(err), 401);
        assert_eq!(api.hits(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_aborts_on_first_failure() {
        let api = StubApi::start(vec![(503, ""), (200, r#"{"pages": 1}"#)]).await;
        let err = api.client(0).total_pages(None).await.unwrap_err();
        assert_eq!(status_of(err), 503);
        assert_eq!(api.hits(), 1);
    }

    #[tokio::test]
    async fn test_listing_sends_date_and_page() {
        let api = StubApi::start(vec![(200, r#"{"pages": 2, "chats": [{"id": "A"}, {"id": "B"}]}"#)]).await;
        let day = NaiveDate::from_ymd_opt(2018, 1, 5).unwrap();
        let ids = api.client(0).list_record_ids(Some(day), 2).await.unwrap();
        assert_eq!(ids, vec!["A", "B"]);
        assert!(api.requests.lock().unwrap()[0]
            .starts_with("GET /chats?date_from=2018-01-05&date_to=2018-01-05&page=2 "));
    }

    #[test]
    fn test_chats_path() {
        assert_eq!(chats_path(None, None), "chats");
        assert_eq!(chats_path(None, Some(4)), "chats?page=4");
        let day = NaiveDate::from_ymd_opt(2018, 1, 5).unwrap();
        assert_eq!(
            chats_path(Some(day), Some(2)),
            "chats?date_from=2018-01-05&date_to=2018-01-05&page=2"
        );
    }

    #[test]
    fn test_listing_parse() {
        let listing: ChatListing = serde_json::from_str(
            r#"{"total": 3, "pages": 2, "chats": [{"id": "A1"}, {"id": 7}, {"id": null}]}"#,
        )
        .unwrap();
        assert_eq!(page_count(listing.pages.as_ref()), 2);
        let ids: Vec<String> = listing.chats.iter().filter_map(|c| id_string(&c.id)).collect();
        assert_eq!(ids, vec!["A1", "7"]);
    }

    #[test]
    fn test_missing_pages_is_zero() {
        let listing: ChatListing = serde_json::from_str(r#"{"chats": []}"#).unwrap();
        assert_eq!(page_count(listing.pages.as_ref()), 0);
    }
}

//! Upstream API client — rate-limited, retrying fetcher for JSON and
//! binary resources.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::UpstreamConfig;

const USER_AGENT: &str = concat!("chanharvest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("decoding response from {url} failed: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Thin wrapper around the upstream JSON/binary API.
///
/// A single minimum inter-request interval is enforced before every
/// outbound call, JSON or binary alike; the only state the client keeps is
/// the monotonic timestamp of its previous request.
pub struct ChanClient {
    cfg: UpstreamConfig,
    http: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
}

impl ChanClient {
    pub fn new(cfg: UpstreamConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(cfg.timeout)
            .build()?;
        Ok(Self {
            cfg,
            http,
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.cfg.request_delay {
                sleep(self.cfg.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn backoff_delay(&self, attempt: u32) -> std::time::Duration {
        self.cfg.retry_backoff * 2u32.saturating_pow(attempt)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle().await;
            match self.http.get(url).send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    tracing::warn!(%url, "upstream returned 404");
                    return Ok(None);
                }
                Ok(resp) if resp.status().is_success() => {
                    return match resp.json::<T>().await {
                        Ok(value) => Ok(Some(value)),
                        Err(source) => Err(FetchError::Decode {
                            url: url.to_string(),
                            source,
                        }),
                    };
                }
                Ok(resp) => {
                    let status = resp.status();
                    tracing::warn!(
                        %url, %status, attempt, max = self.cfg.max_retries,
                        "fetch attempt failed"
                    );
                    if attempt >= self.cfg.max_retries {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }
                }
                Err(source) => {
                    tracing::warn!(
                        %url, error = %source, attempt, max = self.cfg.max_retries,
                        "fetch attempt failed"
                    );
                    if attempt >= self.cfg.max_retries {
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            source,
                        });
                    }
                }
            }
            sleep(self.backoff_delay(attempt)).await;
        }
    }

    async fn get_bytes(&self, url: &str) -> Result<Option<Vec<u8>>, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.throttle().await;
            match self.http.get(url).send().await {
                Ok(resp) if resp.status() == StatusCode::NOT_FOUND => {
                    tracing::warn!(%url, "upstream returned 404");
                    return Ok(None);
                }
                Ok(resp) if resp.status().is_success() => {
                    return match resp.bytes().await {
                        Ok(body) => Ok(Some(body.to_vec())),
                        Err(source) => Err(FetchError::Transport {
                            url: url.to_string(),
                            source,
                        }),
                    };
                }
                Ok(resp) => {
                    let status = resp.status();
                    tracing::warn!(
                        %url, %status, attempt, max = self.cfg.max_retries,
                        "download attempt failed"
                    );
                    if attempt >= self.cfg.max_retries {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status,
                        });
                    }
                }
                Err(source) => {
                    tracing::warn!(
                        %url, error = %source, attempt, max = self.cfg.max_retries,
                        "download attempt failed"
                    );
                    if attempt >= self.cfg.max_retries {
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            source,
                        });
                    }
                }
            }
            sleep(self.backoff_delay(attempt)).await;
        }
    }

    /// Fetch the list of boards advertised by the upstream.
    pub async fn boards(&self) -> Result<Vec<BoardInfo>, FetchError> {
        let url = format!("{}/boards.json", self.cfg.api_base);
        Ok(self
            .get_json::<BoardsResponse>(&url)
            .await?
            .map(|resp| resp.boards)
            .unwrap_or_default())
    }

    /// Fetch a board's catalog: pages of OP-only thread summaries.
    pub async fn catalog(&self, board: &str) -> Result<Vec<CatalogPage>, FetchError> {
        let url = format!("{}/{board}/catalog.json", self.cfg.api_base);
        Ok(self.get_json(&url).await?.unwrap_or_default())
    }

    /// Fetch the lightweight per-board thread list.
    pub async fn thread_list(&self, board: &str) -> Result<Vec<ThreadListPage>, FetchError> {
        let url = format!("{}/{board}/threads.json", self.cfg.api_base);
        Ok(self.get_json(&url).await?.unwrap_or_default())
    }

    /// Fetch a full thread (OP at index 0, replies in source order).
    /// Returns `None` when the thread does not exist upstream.
    pub async fn thread(
        &self,
        board: &str,
        thread_no: i64,
    ) -> Result<Option<ThreadResponse>, FetchError> {
        let url = format!("{}/{board}/thread/{thread_no}.json", self.cfg.api_base);
        self.get_json(&url).await
    }

    /// Fetch the list of archived thread numbers for a board.
    pub async fn archive(&self, board: &str) -> Result<Vec<i64>, FetchError> {
        let url = format!("{}/{board}/archive.json", self.cfg.api_base);
        Ok(self.get_json(&url).await?.unwrap_or_default())
    }

    /// Download a full-resolution media payload, addressed by the source's
    /// time-based file id and extension.
    pub async fn download_media(
        &self,
        board: &str,
        tim: i64,
        ext: &str,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let url = format!("{}/{board}/{tim}{ext}", self.cfg.media_base);
        self.get_bytes(&url).await
    }

    /// Download the upstream-generated thumbnail for a media payload.
    pub async fn download_thumbnail(
        &self,
        board: &str,
        tim: i64,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let url = format!("{}/{board}/{tim}s.jpg", self.cfg.media_base);
        self.get_bytes(&url).await
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardsResponse {
    #[serde(default)]
    pub boards: Vec<BoardInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardInfo {
    pub board: String,
    #[serde(default)]
    pub title: String,
    /// 1 when the board is worksafe.
    #[serde(default)]
    pub ws_board: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub threads: Vec<ApiPost>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadListPage {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub threads: Vec<ThreadListEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadListEntry {
    pub no: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub replies: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadResponse {
    #[serde(default)]
    pub posts: Vec<ApiPost>,
}

/// One post object as served by the upstream API. Catalog thread summaries
/// carry the same shape plus denormalized counters, so both deserialize
/// into this record. Absent optional fields stay `None`; a missing author
/// name maps to "Anonymous" at persistence time.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiPost {
    pub no: i64,
    /// Reply target; 0 means this post opens its thread.
    #[serde(default)]
    pub resto: i64,
    #[serde(default)]
    pub time: i64,
    /// Rendered HTML body.
    #[serde(default)]
    pub com: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub trip: Option<String>,
    #[serde(default)]
    pub capcode: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    /// Source-assigned poster id.
    #[serde(default)]
    pub id: Option<String>,
    /// Time-based file id of the attached media, if any.
    #[serde(default)]
    pub tim: Option<i64>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub fsize: Option<i64>,
    /// Source-reported checksum of the attachment.
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub w: Option<i64>,
    #[serde(default)]
    pub h: Option<i64>,
    #[serde(default)]
    pub spoiler: Option<i64>,
    #[serde(default)]
    pub sticky: Option<i64>,
    #[serde(default)]
    pub closed: Option<i64>,
    #[serde(default)]
    pub archived: Option<i64>,
    #[serde(default)]
    pub archived_on: Option<i64>,
    #[serde(default)]
    pub replies: Option<i64>,
    #[serde(default)]
    pub images: Option<i64>,
}

impl ApiPost {
    pub fn is_op(&self) -> bool {
        self.resto == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> UpstreamConfig {
        UpstreamConfig {
            retry_backoff: Duration::from_millis(10),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let client = ChanClient::new(test_config()).expect("client");
        assert_eq!(client.backoff_delay(1), Duration::from_millis(20));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(40));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(80));
    }

    #[test]
    fn thread_payload_deserializes_with_defaults() {
        let raw = r#"{
            "posts": [
                {"no": 100, "time": 1700000000, "sub": "hello", "com": "<p>op</p>",
                 "tim": 1699999999123, "ext": ".png", "filename": "pic", "fsize": 512,
                 "w": 800, "h": 600, "replies": 2, "images": 1, "sticky": 1},
                {"no": 101, "resto": 100, "com": "reply"}
            ]
        }"#;
        let thread: ThreadResponse = serde_json::from_str(raw).expect("decode");
        assert_eq!(thread.posts.len(), 2);
        let op = &thread.posts[0];
        assert!(op.is_op());
        assert_eq!(op.sub.as_deref(), Some("hello"));
        assert_eq!(op.ext.as_deref(), Some(".png"));
        let reply = &thread.posts[1];
        assert!(!reply.is_op());
        assert_eq!(reply.name, None);
        assert_eq!(reply.tim, None);
        assert_eq!(reply.time, 0);
    }

    #[test]
    fn catalog_page_deserializes_thread_summaries() {
        let raw = r#"[{"page": 1, "threads": [{"no": 500, "replies": 12, "images": 3}]}]"#;
        let pages: Vec<CatalogPage> = serde_json::from_str(raw).expect("decode");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].threads[0].no, 500);
        assert_eq!(pages[0].threads[0].replies, Some(12));
    }
}

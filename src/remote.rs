// 🌐 Remote Source - the only suspend point in the sync path
//
// A RemoteSource fetches the server's quotes and optionally accepts new
// ones. Failures are values (FetchError), never panics, and never touch
// local state.

use crate::quote::{ingest, Origin, Quote, QuoteRecord, RecordSet};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Category assigned to JSONPlaceholder posts, which carry none
pub const SERVER_CATEGORY: &str = "Server";

// ============================================================================
// FETCH ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("remote returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("could not decode remote payload: {0}")]
    Decode(String),

    #[error("remote does not accept {0}")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else if err.is_timeout() || err.is_connect() {
            FetchError::Unavailable(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

// ============================================================================
// REMOTE SOURCE
// ============================================================================

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Fetch every quote the remote currently holds. Origin tagging is
    /// done by `fetch_remote`, not here.
    async fn fetch(&self) -> Result<Vec<QuoteRecord>, FetchError>;

    /// Push one quote upstream, returning the remote's copy.
    async fn post(&self, _quote: &Quote) -> Result<Quote, FetchError> {
        Err(FetchError::Unsupported("posted quotes"))
    }
}

/// Call the remote once and tag every valid record `Origin::Remote`.
///
/// Malformed records are dropped with a warning; repeated texts keep
/// their first occurrence.
pub async fn fetch_remote(source: &dyn RemoteSource) -> Result<RecordSet, FetchError> {
    let records = source.fetch().await?;
    let received = records.len();
    let ingested = ingest(records, Origin::Remote);

    for rejected in &ingested.rejected {
        warn!(
            source = source.name(),
            index = rejected.index,
            "dropping malformed remote record: {}",
            rejected.error
        );
    }

    debug!(
        source = source.name(),
        received,
        accepted = ingested.quotes.len(),
        duplicates = ingested.duplicates,
        "fetched remote quotes"
    );

    Ok(ingested.quotes)
}

// ============================================================================
// HTTP REMOTE SOURCE
// ============================================================================

/// Payload shape spoken by the remote endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// `{text, category, id?}` as served by `quote-server`
    Quotes,

    /// JSONPlaceholder `/posts`: `{id, title, body, userId}`
    Posts,
}

impl PayloadFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "quotes" => Some(PayloadFormat::Quotes),
            "posts" => Some(PayloadFormat::Posts),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    user_id: i64,
}

impl From<Post> for QuoteRecord {
    fn from(post: Post) -> Self {
        QuoteRecord {
            text: post.title,
            category: SERVER_CATEGORY.to_string(),
            id: post.id,
            origin: Some(Origin::Remote),
        }
    }
}

pub struct HttpRemoteSource {
    client: reqwest::Client,
    url: String,
    format: PayloadFormat,
}

impl HttpRemoteSource {
    pub fn new(url: &str, format: PayloadFormat, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(HttpRemoteSource {
            client,
            url: url.to_string(),
            format,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    fn name(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<QuoteRecord>, FetchError> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;

        // Decode loosely: one bad element must not sink the whole payload
        let values: Vec<serde_json::Value> = response.json().await?;

        let records = values
            .into_iter()
            .filter_map(|value| {
                let decoded = match self.format {
                    PayloadFormat::Quotes => serde_json::from_value::<QuoteRecord>(value),
                    PayloadFormat::Posts => {
                        serde_json::from_value::<Post>(value).map(QuoteRecord::from)
                    }
                };
                match decoded {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(url = %self.url, "skipping undecodable remote element: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(records)
    }

    async fn post(&self, quote: &Quote) -> Result<Quote, FetchError> {
        let request = self.client.post(&self.url);

        let request = match self.format {
            PayloadFormat::Quotes => request.json(&QuoteRecord::from(quote.clone())),
            PayloadFormat::Posts => request.json(&Post {
                id: None,
                title: quote.text().to_string(),
                body: quote.category().to_string(),
                user_id: 1,
            }),
        };

        let response = request.send().await?.error_for_status()?;

        let record = match self.format {
            PayloadFormat::Quotes => response.json::<QuoteRecord>().await?,
            PayloadFormat::Posts => {
                // Placeholder APIs echo the post back; keep our category
                let post: Post = response.json().await?;
                QuoteRecord {
                    text: post.title,
                    category: quote.category().to_string(),
                    id: post.id,
                    origin: Some(Origin::Remote),
                }
            }
        };

        Quote::remote(&record.text, &record.category, record.id)
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

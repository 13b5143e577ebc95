//! Fetching and parsing of a single feed.

use std::time::Duration;

use async_trait::async_trait;
use badnews_core::{Error, Result};
use chrono::{DateTime, Utc};
use url::Url;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of a parsed feed, still in wire form: the link is raw text
/// and validated by the ingestion pipeline, not here.
#[derive(Debug, Clone)]
pub struct FetchedItem {
    pub link: String,
    pub title: String,
    pub description: String,
    pub updated: Option<DateTime<Utc>>,
    pub published: Option<DateTime<Utc>>,
}

/// A parsed feed: its title and entries.
#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub title: String,
    pub items: Vec<FetchedItem>,
}

/// The wire side of ingestion as a pure function. Implementations must
/// not touch the database; the [`crate::Reader`] owns persistence.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedFeed>;
}

/// The production source: HTTP via reqwest, parsing via feed-rs.
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("badnews/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &Url) -> Result<FetchedFeed> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let feed = feed_rs::parser::parse(body.as_ref())
            .map_err(|e| Error::FeedParse(e.to_string()))?;

        let items = feed
            .entries
            .into_iter()
            .map(|entry| FetchedItem {
                link: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                title: entry.title.map(|t| t.content).unwrap_or_default(),
                description: entry
                    .summary
                    .map(|t| t.content)
                    .or_else(|| entry.content.and_then(|c| c.body))
                    .unwrap_or_default(),
                updated: entry.updated,
                published: entry.published,
            })
            .collect();

        Ok(FetchedFeed {
            title: feed.title.map(|t| t.content).unwrap_or_default(),
            items,
        })
    }
}

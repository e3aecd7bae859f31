use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use feed_rs::parser;
use reqwest::Client;

use crate::error::{AppError, Result};
use crate::services::collapse_whitespace;

/// One candidate item pulled from a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub content: String,
}

/// Given a feed URL, returns its items in document order.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_items(&self, url: &str) -> Result<Vec<FeedItem>>;
}

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("newsbrief/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<Vec<FeedItem>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch feed {}", url))?;

        if !response.status().is_success() {
            return Err(AppError::Feed(format!(
                "Failed to fetch feed {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await?;
        parse_items(&bytes)
    }
}

impl Default for FeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch_items(&self, url: &str) -> Result<Vec<FeedItem>> {
        self.fetch_feed(url).await
    }
}

/// Parses RSS/Atom bytes. Full content is preferred over the summary snippet.
fn parse_items(bytes: &[u8]) -> Result<Vec<FeedItem>> {
    let feed = parser::parse(bytes)?;

    let items = feed
        .entries
        .into_iter()
        .map(|entry| {
            let content_html = entry
                .content
                .as_ref()
                .and_then(|c| c.body.as_ref())
                .filter(|body| !body.trim().is_empty())
                .or_else(|| entry.summary.as_ref().map(|s| &s.content));

            let content = content_html
                .map(|html| {
                    html2text::from_read(html.as_bytes(), 80)
                        .map(|text| collapse_whitespace(&text))
                        .unwrap_or_else(|_| collapse_whitespace(html))
                })
                .unwrap_or_default();

            FeedItem {
                title: entry
                    .title
                    .map(|t| t.content.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "Untitled".to_string()),
                url: entry
                    .links
                    .first()
                    .map(|l| l.href.clone())
                    .unwrap_or_default(),
                content,
            }
        })
        .collect();

    Ok(items)
}

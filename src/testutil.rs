use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Barrier;

use crate::ai::Enricher;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{FeedItem, FeedSource};
use crate::models::{NewArticle, NewUser, NewUserSource, Sentiment, SourceKind, User, UserSource};
use crate::services::{ExtractedContent, Extractor};

/// Summaries are `"summary of: <text>"`; sentiment is whatever the configured
/// raw answer maps to.
pub struct StubEnricher {
    fail_all: bool,
    fail_for: Vec<String>,
    sentiment_answer: String,
    rendezvous: Option<Arc<Barrier>>,
}

impl StubEnricher {
    pub fn new() -> Self {
        Self {
            fail_all: false,
            fail_for: Vec::new(),
            sentiment_answer: "neutral".to_string(),
            rendezvous: None,
        }
    }

    pub fn failing_summaries(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn failing_summaries_for(mut self, text: &str) -> Self {
        self.fail_for.push(text.to_string());
        self
    }

    pub fn with_sentiment_answer(mut self, answer: &str) -> Self {
        self.sentiment_answer = answer.to_string();
        self
    }

    /// Summary and sentiment both block until the other one is running.
    pub fn with_rendezvous(mut self) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(2)));
        self
    }

    async fn meet(&self) {
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
    }
}

#[async_trait]
impl Enricher for StubEnricher {
    async fn generate_summary(&self, text: &str) -> Result<String> {
        self.meet().await;
        if self.fail_all || self.fail_for.iter().any(|t| t == text) {
            return Err(AppError::Enrichment("stub refused to summarize".to_string()));
        }
        Ok(format!("summary of: {}", text))
    }

    async fn analyze_sentiment(&self, _text: &str) -> Sentiment {
        self.meet().await;
        crate::ai::sentiment_from_answer("stub", &self.sentiment_answer)
    }
}

/// Returns one fixed page for every URL, or fails every extraction.
#[derive(Default)]
pub struct StubExtractor {
    page: Option<ExtractedContent>,
    fail: bool,
}

impl StubExtractor {
    pub fn failing() -> Self {
        Self {
            page: None,
            fail: true,
        }
    }

    pub fn with_page(page: ExtractedContent) -> Self {
        Self {
            page: Some(page),
            fail: false,
        }
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        if self.fail {
            return Err(AppError::Extraction(format!("failed to fetch {}", url)));
        }
        Ok(self.page.clone().unwrap_or(ExtractedContent {
            title: Some("Stub page".to_string()),
            body: format!("Body of {}", url),
        }))
    }
}

/// Feeds keyed by URL. Unknown URLs fail like an unreachable host. Clones
/// share the request log.
#[derive(Clone, Default)]
pub struct StubFeeds {
    feeds: HashMap<String, Option<Vec<FeedItem>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl StubFeeds {
    /// `count` items titled `Item 0..count` with bodies `Body of item N`.
    pub fn with_feed(self, url: &str, count: usize) -> Self {
        let items = (0..count)
            .map(|i| FeedItem {
                title: format!("Item {}", i),
                url: format!("{}/{}", url, i),
                content: format!("Body of item {}", i),
            })
            .collect();
        self.with_items(url, items)
    }

    pub fn with_items(mut self, url: &str, items: Vec<FeedItem>) -> Self {
        self.feeds.insert(url.to_string(), Some(items));
        self
    }

    pub fn with_failure(mut self, url: &str) -> Self {
        self.feeds.insert(url.to_string(), None);
        self
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeedSource for StubFeeds {
    async fn fetch_items(&self, url: &str) -> Result<Vec<FeedItem>> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.feeds.get(url) {
            Some(Some(items)) => Ok(items.clone()),
            _ => Err(AppError::Feed(format!("failed to fetch feed {}", url))),
        }
    }
}

pub async fn user(repo: &Repository, email: &str) -> User {
    repo.create_user(NewUser {
        email: email.to_string(),
        password_hash: "hash".to_string(),
    })
    .await
    .unwrap()
}

/// Inserts a positive, untagged article and returns its id.
pub async fn article(repo: &Repository, content: &str) -> i64 {
    repo.insert_article(NewArticle {
        title: "Title".to_string(),
        content: content.to_string(),
        summary: format!("summary of: {}", content),
        sentiment: Sentiment::Positive,
    })
    .await
    .unwrap()
}

/// Inserts an enabled source named `Source <url>`.
pub async fn source(repo: &Repository, user_id: i64, url: &str, kind: SourceKind) -> UserSource {
    repo.insert_source(NewUserSource {
        user_id,
        url: url.to_string(),
        name: format!("Source {}", url),
        kind,
    })
    .await
    .unwrap()
}

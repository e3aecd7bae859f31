use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::ai::{enrich, Enricher};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{FeedItem, FeedSource};
use crate::models::{NewScheduledSummary, ScheduledSummary, SourceKind, User, UserSource};

pub const DEFAULT_MAX_ITEMS_PER_SOURCE: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub users: usize,
    pub sources_processed: usize,
    pub sources_failed: usize,
    pub items_enriched: usize,
    pub items_failed: usize,
    /// Set when another run was still in progress.
    pub skipped: bool,
}

pub struct NewsIngestor {
    repository: Arc<Repository>,
    feeds: Arc<dyn FeedSource>,
    enricher: Arc<dyn Enricher>,
    max_items_per_source: usize,
    running: Mutex<()>,
}

impl NewsIngestor {
    pub fn new(
        repository: Arc<Repository>,
        feeds: Arc<dyn FeedSource>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        Self {
            repository,
            feeds,
            enricher,
            max_items_per_source: DEFAULT_MAX_ITEMS_PER_SOURCE,
            running: Mutex::new(()),
        }
    }

    pub fn with_max_items_per_source(mut self, max: usize) -> Self {
        self.max_items_per_source = max;
        self
    }

    // Errors are logged and counted, never returned.
    pub async fn run(&self) -> IngestReport {
        let Ok(_guard) = self.running.try_lock() else {
            warn!("Previous ingestion run still in progress, skipping");
            return IngestReport {
                skipped: true,
                ..IngestReport::default()
            };
        };

        let mut report = IngestReport::default();

        let users = match self.repository.get_users_with_sources().await {
            Ok(users) => users,
            Err(e) => {
                error!("Failed to load users for ingestion: {}", e);
                return report;
            }
        };
        report.users = users.len();
        info!(users = users.len(), "Starting news ingestion run");

        for (user, sources) in &users {
            for source in sources {
                if !source.enabled {
                    debug!(user_id = user.id, source = %source.url, "Skipping disabled source");
                    continue;
                }
                self.process_source(user, source, &mut report).await;
            }
        }

        info!(
            sources_processed = report.sources_processed,
            sources_failed = report.sources_failed,
            items_enriched = report.items_enriched,
            items_failed = report.items_failed,
            "News ingestion run finished"
        );
        report
    }

    async fn process_source(&self, user: &User, source: &UserSource, report: &mut IngestReport) {
        let items = match self.fetch_items(source).await {
            Ok(items) => items,
            Err(e) => {
                error!(
                    user_id = user.id,
                    source = %source.url,
                    "Error processing source: {}", e
                );
                report.sources_failed += 1;
                return;
            }
        };
        report.sources_processed += 1;

        debug!(
            source = %source.url,
            available = items.len(),
            "Fetched source items"
        );

        for item in items.into_iter().take(self.max_items_per_source) {
            match self.process_item(user, source, &item).await {
                Ok(_) => report.items_enriched += 1,
                Err(e) => {
                    warn!(
                        user_id = user.id,
                        url = %item.url,
                        "Error processing article: {}", e
                    );
                    report.items_failed += 1;
                }
            }
        }
    }

    async fn fetch_items(&self, source: &UserSource) -> Result<Vec<FeedItem>> {
        match source.kind {
            SourceKind::Feed => self.feeds.fetch_items(&source.url).await,
            SourceKind::Scraped => {
                debug!(source = %source.url, "Scraped sources are not supported yet, no items");
                Ok(Vec::new())
            }
        }
    }

    async fn process_item(
        &self,
        user: &User,
        source: &UserSource,
        item: &FeedItem,
    ) -> Result<ScheduledSummary> {
        if item.content.trim().is_empty() {
            return Err(AppError::Validation("feed item has no content".to_string()));
        }

        let enrichment = enrich(self.enricher.as_ref(), &item.content).await?;

        self.repository
            .insert_scheduled_summary(NewScheduledSummary {
                user_id: user.id,
                article_title: item.title.clone(),
                article_url: item.url.clone(),
                summary: enrichment.summary,
                sentiment: enrichment.sentiment,
                source_name: source.name.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;
    use crate::testutil::{self, StubEnricher, StubFeeds};

    struct Fixture {
        repo: Arc<Repository>,
        ingestor: NewsIngestor,
    }

    async fn fixture(feeds: StubFeeds, enricher: StubEnricher) -> Fixture {
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let ingestor = NewsIngestor::new(repo.clone(), Arc::new(feeds), Arc::new(enricher));
        Fixture { repo, ingestor }
    }

    #[tokio::test]
    async fn at_most_three_items_per_source() {
        let feeds = StubFeeds::default().with_feed("https://wire.test/rss", 5);
        let f = fixture(feeds, StubEnricher::new().with_sentiment_answer("negative")).await;
        let user = testutil::user(&f.repo, "ada@example.com").await;
        testutil::source(&f.repo, user.id, "https://wire.test/rss", SourceKind::Feed).await;

        let report = f.ingestor.run().await;

        assert_eq!(report.items_enriched, 3);
        let summaries = f.repo.get_scheduled_summaries(user.id).await.unwrap();
        assert_eq!(summaries.len(), 3);
        // Newest first, so the first feed item comes back last.
        let titles: Vec<_> = summaries.iter().map(|s| s.article_title.as_str()).collect();
        assert_eq!(titles, ["Item 2", "Item 1", "Item 0"]);
        assert!(summaries.iter().all(|s| s.sentiment == Sentiment::Negative));
        assert!(summaries.iter().all(|s| s.source_name == "Source https://wire.test/rss"));
    }

    #[tokio::test]
    async fn failing_source_does_not_stop_the_others() {
        let feeds = StubFeeds::default()
            .with_feed("https://a.test/rss", 2)
            .with_failure("https://broken.test/rss")
            .with_feed("https://c.test/rss", 1);
        let f = fixture(feeds, StubEnricher::new()).await;
        let ada = testutil::user(&f.repo, "ada@example.com").await;
        let bob = testutil::user(&f.repo, "bob@example.com").await;
        testutil::source(&f.repo, ada.id, "https://a.test/rss", SourceKind::Feed).await;
        testutil::source(&f.repo, ada.id, "https://broken.test/rss", SourceKind::Feed).await;
        testutil::source(&f.repo, bob.id, "https://c.test/rss", SourceKind::Feed).await;

        let report = f.ingestor.run().await;

        assert_eq!(report.sources_failed, 1);
        assert_eq!(report.sources_processed, 2);
        assert_eq!(f.repo.get_scheduled_summaries(ada.id).await.unwrap().len(), 2);
        assert_eq!(f.repo.get_scheduled_summaries(bob.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_item_does_not_stop_the_source() {
        let feeds = StubFeeds::default().with_feed("https://wire.test/rss", 3);
        // Item 1's content is rejected by the summarizer.
        let enricher = StubEnricher::new().failing_summaries_for("Body of item 1");
        let f = fixture(feeds, enricher).await;
        let user = testutil::user(&f.repo, "ada@example.com").await;
        testutil::source(&f.repo, user.id, "https://wire.test/rss", SourceKind::Feed).await;

        let report = f.ingestor.run().await;

        assert_eq!(report.items_enriched, 2);
        assert_eq!(report.items_failed, 1);
        let titles: Vec<_> = f
            .repo
            .get_scheduled_summaries(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.article_title)
            .collect();
        assert_eq!(titles, ["Item 2", "Item 0"]);
    }

    #[tokio::test]
    async fn disabled_and_scraped_sources_produce_nothing() {
        let feeds = StubFeeds::default()
            .with_feed("https://off.test/rss", 2)
            .with_feed("https://page.test", 2);
        let f = fixture(feeds.clone(), StubEnricher::new()).await;
        let user = testutil::user(&f.repo, "ada@example.com").await;
        let off = testutil::source(&f.repo, user.id, "https://off.test/rss", SourceKind::Feed).await;
        f.repo.set_source_enabled(user.id, off.id, false).await.unwrap();
        testutil::source(&f.repo, user.id, "https://page.test", SourceKind::Scraped).await;

        let report = f.ingestor.run().await;

        assert_eq!(report.items_enriched, 0);
        assert_eq!(report.sources_processed, 1);
        assert!(f.repo.get_scheduled_summaries(user.id).await.unwrap().is_empty());
        assert!(feeds.requested().is_empty());
    }

    #[tokio::test]
    async fn items_without_content_are_skipped() {
        let feeds = StubFeeds::default().with_items(
            "https://wire.test/rss",
            vec![
                FeedItem {
                    title: "Empty".into(),
                    url: "https://wire.test/empty".into(),
                    content: "  ".into(),
                },
                FeedItem {
                    title: "Full".into(),
                    url: "https://wire.test/full".into(),
                    content: "words".into(),
                },
            ],
        );
        let f = fixture(feeds, StubEnricher::new()).await;
        let user = testutil::user(&f.repo, "ada@example.com").await;
        testutil::source(&f.repo, user.id, "https://wire.test/rss", SourceKind::Feed).await;

        let report = f.ingestor.run().await;

        assert_eq!(report.items_failed, 1);
        assert_eq!(report.items_enriched, 1);
    }

    #[tokio::test]
    async fn overlapping_run_is_skipped() {
        let f = fixture(StubFeeds::default(), StubEnricher::new()).await;

        let guard = f.ingestor.running.lock().await;
        let report = f.ingestor.run().await;
        drop(guard);

        assert!(report.skipped);
        assert!(!f.ingestor.run().await.skipped);
    }

    #[tokio::test]
    async fn cap_is_configurable() {
        let feeds = StubFeeds::default().with_feed("https://wire.test/rss", 5);
        let repo = Arc::new(Repository::in_memory().await.unwrap());
        let ingestor =
            NewsIngestor::new(repo.clone(), Arc::new(feeds), Arc::new(StubEnricher::new()))
                .with_max_items_per_source(1);
        let user = testutil::user(&repo, "ada@example.com").await;
        testutil::source(&repo, user.id, "https://wire.test/rss", SourceKind::Feed).await;

        assert_eq!(ingestor.run().await.items_enriched, 1);
    }
}

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::{build_enricher, Enricher};
use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{FeedFetcher, FeedSource};
use crate::models::{
    Article, NewUser, PopularTag, SavedArticle, ScheduledSummary, SourceKind, Tag, User,
    UserSource,
};
use crate::scheduler;
use crate::services::{
    AnalyzeRequest, ArticleAnalyzer, ContentExtractor, Extractor, IngestReport, NewsIngestor,
    SavedArticles, SourceRegistry, TagResolver,
};

/// Wires every collaborator once per process. The command line is a thin
/// dispatcher over these methods.
pub struct App {
    config: Config,

    // Services
    repository: Arc<Repository>,
    extractor: Arc<dyn Extractor>,
    feeds: Arc<dyn FeedSource>,
    tags: TagResolver,
    saved: SavedArticles,
    sources: SourceRegistry,
}

impl App {
    pub async fn new(config: Config) -> Result<Self> {
        if let Some(parent) = Path::new(&config.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let repository = Arc::new(Repository::new(&config.db_path).await?);
        let timeout = Duration::from_secs(config.request_timeout_secs);

        Ok(Self {
            extractor: Arc::new(ContentExtractor::new(timeout)),
            feeds: Arc::new(FeedFetcher::new()),
            tags: TagResolver::new(repository.clone()),
            saved: SavedArticles::new(repository.clone()),
            sources: SourceRegistry::new(repository.clone()),
            repository,
            config,
        })
    }

    /// The AI backend is only required by commands that enrich text.
    fn enricher(&self) -> Result<Arc<dyn Enricher>> {
        build_enricher(&self.config)
    }

    fn ingestor(&self) -> Result<NewsIngestor> {
        Ok(NewsIngestor::new(
            self.repository.clone(),
            self.feeds.clone(),
            self.enricher()?,
        )
        .with_max_items_per_source(self.config.max_items_per_source))
    }

    // Users

    pub async fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation(format!("invalid email '{}'", email)));
        }
        let user = self
            .repository
            .create_user(NewUser {
                email: email.to_string(),
                password_hash: password_hash.to_string(),
            })
            .await?;
        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    // Articles

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<Article> {
        let analyzer = ArticleAnalyzer::new(
            self.repository.clone(),
            self.extractor.clone(),
            self.enricher()?,
        );
        analyzer.analyze(request).await
    }

    pub async fn article(&self, article_id: i64) -> Result<Article> {
        self.repository
            .get_article(article_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Article".to_string()))
    }

    pub async fn article_summary(&self, article_id: i64) -> Result<String> {
        Ok(self.article(article_id).await?.summary)
    }

    pub async fn save_article(&self, user_id: i64, article_id: i64) -> Result<SavedArticle> {
        self.saved.save(user_id, article_id).await
    }

    pub async fn saved_articles(&self, user_id: i64) -> Result<Vec<Article>> {
        self.saved.list_saved(user_id).await
    }

    // Tags

    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        self.tags.create(name).await
    }

    pub async fn tags(&self) -> Result<Vec<Tag>> {
        self.tags.list().await
    }

    pub async fn delete_tag(&self, tag_id: i64) -> Result<()> {
        self.tags.delete(tag_id).await
    }

    pub async fn popular_tags(&self, limit: Option<usize>) -> Result<Vec<PopularTag>> {
        self.tags.popular(limit).await
    }

    // Sources

    pub async fn add_source(
        &self,
        user_id: i64,
        url: &str,
        name: &str,
        kind: SourceKind,
    ) -> Result<UserSource> {
        self.sources.add(user_id, url, name, kind).await
    }

    pub async fn sources(&self, user_id: i64) -> Result<Vec<UserSource>> {
        self.sources.list(user_id).await
    }

    pub async fn remove_source(&self, user_id: i64, source_id: i64) -> Result<()> {
        self.sources.remove(user_id, source_id).await
    }

    pub async fn set_source_enabled(
        &self,
        user_id: i64,
        source_id: i64,
        enabled: bool,
    ) -> Result<UserSource> {
        self.sources.set_enabled(user_id, source_id, enabled).await
    }

    // Scheduled ingestion

    pub async fn scheduled_summaries(&self, user_id: i64) -> Result<Vec<ScheduledSummary>> {
        self.repository.get_scheduled_summaries(user_id).await
    }

    /// One ingestion pass right now.
    pub async fn ingest_now(&self) -> Result<IngestReport> {
        Ok(self.ingestor()?.run().await)
    }

    /// Runs ingestion on the configured schedule until Ctrl-C.
    pub async fn run_daemon(&self) -> Result<()> {
        let ingestor = Arc::new(self.ingestor()?);
        let mut sched = scheduler::start(ingestor, &self.config.ingest_schedule).await?;

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutting down ingestion scheduler");
        sched.shutdown().await?;
        Ok(())
    }
}

use std::sync::Arc;

use serde::Deserialize;

use super::content_fetcher::Extractor;
use super::tags::{normalize_name, TagResolver};
use crate::ai::{enrich, Enricher};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, NewArticle};

const UNTITLED: &str = "Untitled";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    pub url: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// On-demand path: extract or accept content, enrich it, persist an article
/// and attach its tags.
pub struct ArticleAnalyzer {
    repository: Arc<Repository>,
    extractor: Arc<dyn Extractor>,
    enricher: Arc<dyn Enricher>,
    tags: TagResolver,
}

impl ArticleAnalyzer {
    pub fn new(
        repository: Arc<Repository>,
        extractor: Arc<dyn Extractor>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let tags = TagResolver::new(repository.clone());
        Self {
            repository,
            extractor,
            enricher,
            tags,
        }
    }

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<Article> {
        let url = request
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());
        let supplied = request
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let mut title = None;
        let mut content = None;

        if let Some(url) = url {
            // Extraction failure is reported, never silently replaced by `content`.
            let extracted = self.extractor.extract(url).await?;
            title = extracted.title;
            if !extracted.body.is_empty() {
                content = Some(extracted.body);
            }
        }

        let content = content
            .or_else(|| supplied.map(str::to_string))
            .ok_or_else(|| AppError::Validation("no content available".to_string()))?;

        let enrichment = enrich(self.enricher.as_ref(), &content).await?;

        let title = title.unwrap_or_else(|| UNTITLED.to_string());
        let article_id = self
            .repository
            .insert_article(NewArticle {
                title,
                content,
                summary: enrichment.summary,
                sentiment: enrichment.sentiment,
            })
            .await?;
        tracing::info!(article_id, sentiment = %enrichment.sentiment, "Article analyzed");

        // Tags are attached one by one after the article exists; a failure here
        // leaves the article with the tags attached so far.
        for name in dedup_tag_names(&request.tags) {
            let tag = self.tags.resolve(&name).await?;
            self.repository.attach_tag(article_id, tag.id).await?;
        }

        self.repository
            .get_article(article_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Article".to_string()))
    }
}

fn dedup_tag_names(names: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for name in names {
        if let Ok(name) = normalize_name(name) {
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
    }
    seen
}

use std::sync::Arc;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{Article, SavedArticle};

/// The user <-> article "save" relation.
#[derive(Clone)]
pub struct SavedArticles {
    repository: Arc<Repository>,
}

impl SavedArticles {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Saves `article_id` for `user_id`. A second save of the same pair is a
    /// conflict, whether caught by the existence check or by the unique index.
    pub async fn save(&self, user_id: i64, article_id: i64) -> Result<SavedArticle> {
        if self.repository.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("User".to_string()));
        }
        if self.repository.get_article(article_id).await?.is_none() {
            return Err(AppError::NotFound("Article".to_string()));
        }

        if self
            .repository
            .find_saved_article(user_id, article_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Article is already saved".to_string()));
        }

        let saved = self
            .repository
            .insert_saved_article(user_id, article_id)
            .await?;
        tracing::info!(user_id, article_id, "Article saved");
        Ok(saved)
    }

    /// Saved articles with their tags, most recently saved first.
    pub async fn list_saved(&self, user_id: i64) -> Result<Vec<Article>> {
        self.repository.get_saved_articles(user_id).await
    }
}

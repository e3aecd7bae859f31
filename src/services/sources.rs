use std::sync::Arc;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{NewUserSource, SourceKind, UserSource};

/// Per-user subscriptions polled by scheduled ingestion.
#[derive(Clone)]
pub struct SourceRegistry {
    repository: Arc<Repository>,
}

impl SourceRegistry {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub async fn add(
        &self,
        user_id: i64,
        url: &str,
        name: &str,
        kind: SourceKind,
    ) -> Result<UserSource> {
        if self.repository.get_user(user_id).await?.is_none() {
            return Err(AppError::NotFound("User".to_string()));
        }

        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::Validation("source URL must not be empty".to_string()));
        }

        let source = self
            .repository
            .insert_source(NewUserSource {
                user_id,
                url: url.to_string(),
                name: name.trim().to_string(),
                kind,
            })
            .await?;
        tracing::info!(user_id, source_id = source.id, kind = %kind, "Source added");
        Ok(source)
    }

    pub async fn remove(&self, user_id: i64, source_id: i64) -> Result<()> {
        if self.repository.delete_source(user_id, source_id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("Source".to_string()))
        }
    }

    /// All sources owned by the user, enabled or not.
    pub async fn list(&self, user_id: i64) -> Result<Vec<UserSource>> {
        self.repository.get_sources_for_user(user_id).await
    }

    pub async fn set_enabled(
        &self,
        user_id: i64,
        source_id: i64,
        enabled: bool,
    ) -> Result<UserSource> {
        if !self
            .repository
            .set_source_enabled(user_id, source_id, enabled)
            .await?
        {
            return Err(AppError::NotFound("Source".to_string()));
        }
        self.repository
            .get_source(user_id, source_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Source".to_string()))
    }
}

use std::sync::Arc;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{PopularTag, Tag};

pub const DEFAULT_POPULAR_LIMIT: usize = 10;

/// Find-or-create over tags by exact name.
#[derive(Clone)]
pub struct TagResolver {
    repository: Arc<Repository>,
}

impl TagResolver {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Returns the tag named `name`, creating it if absent. Losing a creation
    /// race to another caller is not an error: the winner's row is returned.
    pub async fn resolve(&self, name: &str) -> Result<Tag> {
        let name = normalize_name(name)?;
        if let Some(tag) = self.repository.find_tag_by_name(&name).await? {
            return Ok(tag);
        }

        match self.repository.insert_tag(&name).await {
            Ok(tag) => {
                tracing::debug!(tag = %tag.name, "Created tag");
                Ok(tag)
            }
            Err(AppError::Conflict(_)) => self
                .repository
                .find_tag_by_name(&name)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Tag '{}'", name))),
            Err(e) => Err(e),
        }
    }

    /// Explicit creation; an existing name is a conflict.
    pub async fn create(&self, name: &str) -> Result<Tag> {
        let name = normalize_name(name)?;
        self.repository.insert_tag(&name).await
    }

    pub async fn list(&self) -> Result<Vec<Tag>> {
        self.repository.get_all_tags().await
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        if self.repository.delete_tag(id).await? {
            Ok(())
        } else {
            Err(AppError::NotFound("Tag".to_string()))
        }
    }

    pub async fn popular(&self, limit: Option<usize>) -> Result<Vec<PopularTag>> {
        self.repository
            .get_popular_tags(limit.unwrap_or(DEFAULT_POPULAR_LIMIT))
            .await
    }
}

pub(crate) fn normalize_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("tag name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

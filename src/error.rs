use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Content extraction failed: {0}")]
    Extraction(String),

    #[error("Enrichment failed: {0}")]
    Enrichment(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    FeedParse(#[from] feed_rs::parser::ParseFeedError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Failures caused by the caller's input rather than by the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::Extraction(_)
                | AppError::Validation(_)
                | AppError::NotFound(_)
                | AppError::Conflict(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(AppError::Extraction("timeout".into()).is_client_error());
        assert!(AppError::Validation("no content".into()).is_client_error());
        assert!(AppError::NotFound("Article".into()).is_client_error());
        assert!(AppError::Conflict("already saved".into()).is_client_error());

        assert!(!AppError::Enrichment("provider down".into()).is_client_error());
        assert!(!AppError::Config("missing key".into()).is_client_error());
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(AppError::NotFound("Source".into()).to_string(), "Source not found");
    }
}

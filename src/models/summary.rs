use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Sentiment;

/// Enrichment result produced by a scheduled ingestion run. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSummary {
    pub id: i64,
    pub user_id: i64,
    pub article_title: String,
    pub article_url: String,
    pub summary: String,
    pub sentiment: Sentiment,
    pub source_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewScheduledSummary {
    pub user_id: i64,
    pub article_title: String,
    pub article_url: String,
    pub summary: String,
    pub sentiment: Sentiment,
    pub source_name: String,
}

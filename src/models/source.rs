use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "rss")]
    Feed,
    #[serde(rename = "scraping")]
    Scraped,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Feed => "rss",
            SourceKind::Scraped => "scraping",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rss" | "atom" | "feed" => Ok(SourceKind::Feed),
            "scraping" | "scraped" | "scrape" => Ok(SourceKind::Scraped),
            other => Err(AppError::Validation(format!("unknown source kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSource {
    pub id: i64,
    pub user_id: i64,
    pub url: String,
    pub name: String,
    pub kind: SourceKind,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUserSource {
    pub user_id: i64,
    pub url: String,
    pub name: String,
    pub kind: SourceKind,
}

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{
    Article, NewArticle, NewScheduledSummary, NewUser, NewUserSource, PopularTag, SavedArticle,
    ScheduledSummary, Sentiment, SourceKind, Tag, User, UserSource,
};

use super::schema::SCHEMA;

const ARTICLE_COLUMNS: &str = "a.id, a.title, a.content, a.summary, a.sentiment";
const SOURCE_COLUMNS: &str = "id, user_id, url, name, kind, enabled, created_at, updated_at";
const SUMMARY_COLUMNS: &str =
    "id, user_id, article_title, article_url, summary, sentiment, source_name, created_at";

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // User operations

    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        let email = user.email.clone();
        let created = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    "INSERT INTO users (email, password_hash) VALUES (?1, ?2)",
                    params![user.email, user.password_hash],
                ) {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
                let id = conn.last_insert_rowid();
                let user = conn.query_row(
                    "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
                    params![id],
                    user_from_row,
                )?;
                Ok(Some(user))
            })
            .await?;

        created.ok_or_else(|| AppError::Conflict(format!("user {} already exists", email)))
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, email, password_hash, created_at FROM users WHERE id = ?1",
                        params![id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    /// Every user paired with all of their sources, enabled or not.
    pub async fn get_users_with_sources(&self) -> Result<Vec<(User, Vec<UserSource>)>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, email, password_hash, created_at FROM users ORDER BY id",
                )?;
                let users = stmt
                    .query_map([], user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;

                let mut result = Vec::with_capacity(users.len());
                for user in users {
                    let sources = load_sources(conn, user.id)?;
                    result.push((user, sources));
                }
                Ok(result)
            })
            .await?;
        Ok(users)
    }

    // Article operations

    pub async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO articles (title, content, summary, sentiment) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        article.title,
                        article.content,
                        article.summary,
                        article.sentiment.as_str()
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| Ok(load_article(conn, id)?))
            .await?;
        Ok(article)
    }

    pub async fn attach_tag(&self, article_id: i64, tag_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO article_tags (article_id, tag_id) VALUES (?1, ?2)",
                    params![article_id, tag_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    #[cfg(test)]
    pub async fn count_articles(&self) -> Result<i64> {
        let count = self
            .conn
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?))
            .await?;
        Ok(count)
    }

    #[cfg(test)]
    pub async fn execute_raw(&self, sql: &'static str) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Tag operations

    pub async fn find_tag_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let name = name.to_string();
        let tag = self
            .conn
            .call(move |conn| {
                let tag = conn
                    .query_row(
                        "SELECT id, name FROM tags WHERE name = ?1",
                        params![name],
                        tag_from_row,
                    )
                    .optional()?;
                Ok(tag)
            })
            .await?;
        Ok(tag)
    }

    /// Inserts a tag; an existing name is reported as `AppError::Conflict`.
    pub async fn insert_tag(&self, name: &str) -> Result<Tag> {
        let owned = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                match conn.execute("INSERT INTO tags (name) VALUES (?1)", params![owned]) {
                    Ok(_) => Ok(Some(conn.last_insert_rowid())),
                    Err(e) if is_unique_violation(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        match id {
            Some(id) => Ok(Tag {
                id,
                name: name.to_string(),
            }),
            None => Err(AppError::Conflict(format!("tag '{}' already exists", name))),
        }
    }

    pub async fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let tags = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, name FROM tags ORDER BY name")?;
                let tags = stmt
                    .query_map([], tag_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    pub async fn delete_tag(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?))
            .await?;
        Ok(deleted > 0)
    }

    /// Tags ranked by number of distinct articles, ties broken by name.
    pub async fn get_popular_tags(&self, limit: usize) -> Result<Vec<PopularTag>> {
        let limit = limit as i64;
        let tags = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT t.id, t.name, COUNT(DISTINCT at.article_id) AS article_count
                       FROM tags t
                       LEFT JOIN article_tags at ON at.tag_id = t.id
                       GROUP BY t.id, t.name
                       ORDER BY article_count DESC, t.name ASC
                       LIMIT ?1"#,
                )?;
                let tags = stmt
                    .query_map(params![limit], |row| {
                        Ok(PopularTag {
                            tag: tag_from_row(row)?,
                            article_count: row.get(2)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    // Saved article operations

    pub async fn find_saved_article(
        &self,
        user_id: i64,
        article_id: i64,
    ) -> Result<Option<SavedArticle>> {
        let saved = self
            .conn
            .call(move |conn| {
                let saved = conn
                    .query_row(
                        "SELECT id, user_id, article_id, saved_at FROM saved_articles WHERE user_id = ?1 AND article_id = ?2",
                        params![user_id, article_id],
                        saved_from_row,
                    )
                    .optional()?;
                Ok(saved)
            })
            .await?;
        Ok(saved)
    }

    /// Inserts a save; a duplicate (user, article) pair is `AppError::Conflict`.
    pub async fn insert_saved_article(&self, user_id: i64, article_id: i64) -> Result<SavedArticle> {
        let saved = self
            .conn
            .call(move |conn| {
                match conn.execute(
                    "INSERT INTO saved_articles (user_id, article_id) VALUES (?1, ?2)",
                    params![user_id, article_id],
                ) {
                    Ok(_) => {}
                    Err(e) if is_unique_violation(&e) => return Ok(None),
                    Err(e) => return Err(e.into()),
                }
                let id = conn.last_insert_rowid();
                let saved = conn.query_row(
                    "SELECT id, user_id, article_id, saved_at FROM saved_articles WHERE id = ?1",
                    params![id],
                    saved_from_row,
                )?;
                Ok(Some(saved))
            })
            .await?;

        saved.ok_or_else(|| AppError::Conflict("Article is already saved".to_string()))
    }

    /// Articles saved by a user, most recently saved first.
    pub async fn get_saved_articles(&self, user_id: i64) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    r#"SELECT {ARTICLE_COLUMNS}
                       FROM saved_articles s
                       JOIN articles a ON a.id = s.article_id
                       WHERE s.user_id = ?1
                       ORDER BY s.saved_at DESC, s.id DESC"#
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut articles = stmt
                    .query_map(params![user_id], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for article in &mut articles {
                    article.tags = load_tags(conn, article.id)?;
                }
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    // Source operations

    pub async fn insert_source(&self, source: NewUserSource) -> Result<UserSource> {
        let source = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO user_sources (user_id, url, name, kind) VALUES (?1, ?2, ?3, ?4)",
                    params![source.user_id, source.url, source.name, source.kind.as_str()],
                )?;
                let id = conn.last_insert_rowid();
                let sql = format!("SELECT {SOURCE_COLUMNS} FROM user_sources WHERE id = ?1");
                let source = conn.query_row(&sql, params![id], source_from_row)?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    pub async fn get_source(&self, user_id: i64, source_id: i64) -> Result<Option<UserSource>> {
        let source = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {SOURCE_COLUMNS} FROM user_sources WHERE id = ?1 AND user_id = ?2"
                );
                let source = conn
                    .query_row(&sql, params![source_id, user_id], source_from_row)
                    .optional()?;
                Ok(source)
            })
            .await?;
        Ok(source)
    }

    pub async fn get_sources_for_user(&self, user_id: i64) -> Result<Vec<UserSource>> {
        let sources = self
            .conn
            .call(move |conn| Ok(load_sources(conn, user_id)?))
            .await?;
        Ok(sources)
    }

    /// Deletes a source only if it belongs to `user_id`.
    pub async fn delete_source(&self, user_id: i64, source_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM user_sources WHERE id = ?1 AND user_id = ?2",
                    params![source_id, user_id],
                )?)
            })
            .await?;
        Ok(deleted > 0)
    }

    pub async fn set_source_enabled(
        &self,
        user_id: i64,
        source_id: i64,
        enabled: bool,
    ) -> Result<bool> {
        let updated = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE user_sources SET enabled = ?1, updated_at = datetime('now') WHERE id = ?2 AND user_id = ?3",
                    params![enabled, source_id, user_id],
                )?)
            })
            .await?;
        Ok(updated > 0)
    }

    // Scheduled summary operations

    pub async fn insert_scheduled_summary(
        &self,
        summary: NewScheduledSummary,
    ) -> Result<ScheduledSummary> {
        let summary = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO scheduled_summaries
                           (user_id, article_title, article_url, summary, sentiment, source_name)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                    params![
                        summary.user_id,
                        summary.article_title,
                        summary.article_url,
                        summary.summary,
                        summary.sentiment.as_str(),
                        summary.source_name,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let sql = format!("SELECT {SUMMARY_COLUMNS} FROM scheduled_summaries WHERE id = ?1");
                let summary = conn.query_row(&sql, params![id], scheduled_summary_from_row)?;
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    /// A user's scheduled summaries, newest first.
    pub async fn get_scheduled_summaries(&self, user_id: i64) -> Result<Vec<ScheduledSummary>> {
        let summaries = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {SUMMARY_COLUMNS} FROM scheduled_summaries WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
                );
                let mut stmt = conn.prepare(&sql)?;
                let summaries = stmt
                    .query_map(params![user_id], scheduled_summary_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(summaries)
            })
            .await?;
        Ok(summaries)
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.extended_code,
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

fn load_article(conn: &SqliteConnection, id: i64) -> rusqlite::Result<Option<Article>> {
    let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles a WHERE a.id = ?1");
    let article = conn
        .query_row(&sql, params![id], article_from_row)
        .optional()?;

    match article {
        Some(mut article) => {
            article.tags = load_tags(conn, article.id)?;
            Ok(Some(article))
        }
        None => Ok(None),
    }
}

fn load_tags(conn: &SqliteConnection, article_id: i64) -> rusqlite::Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        r#"SELECT t.id, t.name FROM tags t
           JOIN article_tags at ON at.tag_id = t.id
           WHERE at.article_id = ?1
           ORDER BY t.name"#,
    )?;
    let tags = stmt
        .query_map(params![article_id], tag_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tags)
}

fn load_sources(conn: &SqliteConnection, user_id: i64) -> rusqlite::Result<Vec<UserSource>> {
    let sql = format!("SELECT {SOURCE_COLUMNS} FROM user_sources WHERE user_id = ?1 ORDER BY id");
    let mut stmt = conn.prepare(&sql)?;
    let sources = stmt
        .query_map(params![user_id], source_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(sources)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56+00:00")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unparseable timestamp '{}'", raw).into(),
        )
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: datetime_column(row, 3)?,
    })
}

fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        sentiment: Sentiment::from_response(&row.get::<_, String>(4)?),
        tags: Vec::new(),
    })
}

fn saved_from_row(row: &Row) -> rusqlite::Result<SavedArticle> {
    Ok(SavedArticle {
        id: row.get(0)?,
        user_id: row.get(1)?,
        article_id: row.get(2)?,
        saved_at: datetime_column(row, 3)?,
    })
}

fn source_from_row(row: &Row) -> rusqlite::Result<UserSource> {
    let kind: String = row.get(4)?;
    let kind = kind.parse::<SourceKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.to_string().into())
    })?;

    Ok(UserSource {
        id: row.get(0)?,
        user_id: row.get(1)?,
        url: row.get(2)?,
        name: row.get(3)?,
        kind,
        enabled: row.get(5)?,
        created_at: datetime_column(row, 6)?,
        updated_at: datetime_column(row, 7)?,
    })
}

fn scheduled_summary_from_row(row: &Row) -> rusqlite::Result<ScheduledSummary> {
    Ok(ScheduledSummary {
        id: row.get(0)?,
        user_id: row.get(1)?,
        article_title: row.get(2)?,
        article_url: row.get(3)?,
        summary: row.get(4)?,
        sentiment: Sentiment::from_response(&row.get::<_, String>(5)?),
        source_name: row.get(6)?,
        created_at: datetime_column(row, 7)?,
    })
}

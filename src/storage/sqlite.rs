//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CrawlStore trait.

use crate::model::{Article, ArticleStub, Comment, ImageRef};
use crate::state::{ArchiveStatus, ArticleStatus, SessionStatus, YearMonth};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CrawlStore, StorageError, StorageResult};
use crate::storage::{ArchiveMonthRecord, ArticleRecord, ImageRecord, SessionRecord, StoreStats};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

/// Fixed-width UTC timestamp so text ordering matches time ordering
fn now_string() -> String {
    timestamp_string(&Utc::now())
}

fn timestamp_string(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_string_list(s: Option<String>) -> StorageResult<Vec<String>> {
    match s {
        Some(s) if !s.is_empty() => Ok(serde_json::from_str(&s)?),
        _ => Ok(Vec::new()),
    }
}

/// Article row before status and list columns are decoded
struct ArticleRow {
    url: String,
    article_id: Option<String>,
    title: Option<String>,
    author: Option<String>,
    date_published: Option<String>,
    categories: Option<String>,
    tags: Option<String>,
    comment_count: Option<u32>,
    status: String,
    discovered_at: String,
    scraped_at: Option<String>,
    error_message: Option<String>,
    retry_count: u32,
}

const ARTICLE_COLUMNS: &str = "url, article_id, title, author, date_published, categories, tags,
     comment_count, status, discovered_at, scraped_at, error_message, retry_count";

impl ArticleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            article_id: row.get(1)?,
            title: row.get(2)?,
            author: row.get(3)?,
            date_published: row.get(4)?,
            categories: row.get(5)?,
            tags: row.get(6)?,
            comment_count: row.get(7)?,
            status: row.get(8)?,
            discovered_at: row.get(9)?,
            scraped_at: row.get(10)?,
            error_message: row.get(11)?,
            retry_count: row.get(12)?,
        })
    }

    fn into_record(self) -> StorageResult<ArticleRecord> {
        let status = ArticleStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::InvalidValue {
                column: "articles.status",
                value: self.status.clone(),
            }
        })?;
        Ok(ArticleRecord {
            url: self.url,
            article_id: self.article_id,
            title: self.title,
            author: self.author,
            date_published: self.date_published,
            categories: parse_string_list(self.categories)?,
            tags: parse_string_list(self.tags)?,
            comment_count: self.comment_count.unwrap_or(0),
            status,
            discovered_at: self.discovered_at,
            scraped_at: self.scraped_at,
            error_message: self.error_message,
            retry_count: self.retry_count,
        })
    }
}

const IMAGE_COLUMNS: &str =
    "original_url, local_path, filename, article_url, comment_id, downloaded, download_error";

fn image_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        original_url: row.get(0)?,
        local_path: row.get(1)?,
        filename: row.get(2)?,
        article_url: row.get(3)?,
        comment_id: row.get(4)?,
        downloaded: row.get(5)?,
        download_error: row.get(6)?,
    })
}

/// Comment row before the timestamp and image columns are decoded
struct CommentRow {
    id: String,
    article_url: String,
    author_name: Option<String>,
    author_url: Option<String>,
    timestamp: Option<String>,
    text_html: Option<String>,
    text_clean: Option<String>,
    upvotes: i64,
    downvotes: i64,
    vote_score: i64,
    parent_id: Option<String>,
    depth: u32,
    images: Option<String>,
}

impl CommentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            article_url: row.get(1)?,
            author_name: row.get(2)?,
            author_url: row.get(3)?,
            timestamp: row.get(4)?,
            text_html: row.get(5)?,
            text_clean: row.get(6)?,
            upvotes: row.get(7)?,
            downvotes: row.get(8)?,
            vote_score: row.get(9)?,
            parent_id: row.get(10)?,
            depth: row.get(11)?,
            images: row.get(12)?,
        })
    }

    fn into_comment(self) -> StorageResult<Comment> {
        let images: Vec<ImageRef> = match self.images {
            Some(json) if !json.is_empty() => serde_json::from_str(&json)?,
            _ => Vec::new(),
        };
        Ok(Comment {
            id: self.id,
            article_url: self.article_url,
            author_name: self.author_name.unwrap_or_default(),
            author_url: self.author_url,
            timestamp: parse_timestamp(self.timestamp),
            text_html: self.text_html.unwrap_or_default(),
            text_clean: self.text_clean.unwrap_or_default(),
            upvotes: self.upvotes,
            downvotes: self.downvotes,
            vote_score: self.vote_score,
            parent_id: self.parent_id,
            depth: self.depth,
            images,
        })
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<(SessionRecord, String)> {
    let status: String = row.get(5)?;
    Ok((
        SessionRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            ended_at: row.get(2)?,
            articles_scraped: row.get(3)?,
            comments_scraped: row.get(4)?,
            status: SessionStatus::Running,
        },
        status,
    ))
}

fn decode_session((mut record, status): (SessionRecord, String)) -> StorageResult<SessionRecord> {
    record.status =
        SessionStatus::from_db_string(&status).ok_or(StorageError::InvalidValue {
            column: "scrape_sessions.status",
            value: status,
        })?;
    Ok(record)
}

impl SqliteStore {
    /// Opens or creates the ledger database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
    }

    fn grouped_counts(&self, sql: &str) -> StorageResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn urls(&self, sql: &str, param: i64) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(sql)?;
        let urls = stmt
            .query_map(params![param], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }
}

impl CrawlStore for SqliteStore {
    // ===== Articles =====

    fn add_article_stubs(&mut self, stubs: &[ArticleStub]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut added = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO articles (url, title, comment_count, status, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for stub in stubs {
                added += stmt.execute(params![
                    stub.url,
                    stub.title,
                    stub.comment_count_hint.unwrap_or(0),
                    ArticleStatus::Pending.to_db_string(),
                    now_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(added)
    }

    fn get_article(&self, url: &str) -> StorageResult<Option<ArticleRecord>> {
        let sql = format!("SELECT {} FROM articles WHERE url = ?1", ARTICLE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![url], ArticleRow::from_row)
            .optional()?;
        row.map(ArticleRow::into_record).transpose()
    }

    fn article_status(&self, url: &str) -> StorageResult<Option<ArticleStatus>> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM articles WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;

        status
            .map(|s| {
                ArticleStatus::from_db_string(&s).ok_or(StorageError::InvalidValue {
                    column: "articles.status",
                    value: s,
                })
            })
            .transpose()
    }

    fn mark_scraped(&mut self, article: &Article) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let now = now_string();
        tx.execute(
            "INSERT INTO articles (url, article_id, title, author, date_published, categories,
                                   tags, comment_count, status, discovered_at, scraped_at,
                                   error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, NULL)
             ON CONFLICT(url) DO UPDATE SET
                 article_id = excluded.article_id,
                 title = excluded.title,
                 author = excluded.author,
                 date_published = excluded.date_published,
                 categories = excluded.categories,
                 tags = excluded.tags,
                 comment_count = excluded.comment_count,
                 status = excluded.status,
                 scraped_at = excluded.scraped_at,
                 error_message = NULL",
            params![
                article.url,
                article.id,
                article.title,
                article.author,
                article.date_published.as_ref().map(timestamp_string),
                serde_json::to_string(&article.categories)?,
                serde_json::to_string(&article.tags)?,
                article.comment_count,
                ArticleStatus::Scraped.to_db_string(),
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_failed(&mut self, url: &str, error: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE articles SET status = ?1, error_message = ?2, retry_count = retry_count + 1
             WHERE url = ?3",
            params![ArticleStatus::Failed.to_db_string(), error, url],
        )?;
        if changed == 0 {
            return Err(StorageError::ArticleNotFound(url.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn mark_unavailable(&mut self, url: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE articles SET status = ?1 WHERE url = ?2",
            params![ArticleStatus::Unavailable.to_db_string(), url],
        )?;
        if changed == 0 {
            return Err(StorageError::ArticleNotFound(url.to_string()));
        }
        tx.commit()?;
        Ok(())
    }

    fn pending_articles(&self, limit: usize) -> StorageResult<Vec<String>> {
        self.urls(
            "SELECT url FROM articles WHERE status = 'pending'
             ORDER BY discovered_at ASC, rowid ASC LIMIT ?1",
            limit as i64,
        )
    }

    fn failed_articles(&self, max_retries: u32) -> StorageResult<Vec<String>> {
        self.urls(
            "SELECT url FROM articles WHERE status = 'failed' AND retry_count < ?1
             ORDER BY discovered_at ASC, rowid ASC",
            i64::from(max_retries),
        )
    }

    fn scraped_articles(&self, limit: usize) -> StorageResult<Vec<String>> {
        self.urls(
            "SELECT url FROM articles WHERE status = 'scraped'
             ORDER BY scraped_at ASC, rowid ASC LIMIT ?1",
            limit as i64,
        )
    }

    // ===== Archive months =====

    fn add_archive_month(&mut self, month: YearMonth) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO archive_months (year_month, status) VALUES (?1, ?2)",
            params![month.to_string(), ArchiveStatus::Pending.to_db_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_archive_month_complete(
        &mut self,
        month: YearMonth,
        article_count: usize,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO archive_months (year_month, status, article_count, scraped_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(year_month) DO UPDATE SET
                 status = excluded.status,
                 article_count = excluded.article_count,
                 scraped_at = excluded.scraped_at",
            params![
                month.to_string(),
                ArchiveStatus::Complete.to_db_string(),
                article_count as i64,
                now_string(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn is_archive_month_complete(&self, month: YearMonth) -> StorageResult<bool> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM archive_months WHERE year_month = ?1",
                params![month.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status.as_deref() == Some(ArchiveStatus::Complete.to_db_string()))
    }

    fn get_archive_month(&self, month: YearMonth) -> StorageResult<Option<ArchiveMonthRecord>> {
        let row: Option<(String, i64, Option<String>)> = self
            .conn
            .query_row(
                "SELECT status, article_count, scraped_at FROM archive_months WHERE year_month = ?1",
                params![month.to_string()],
                |row| Ok((row.get(0)?, row.get::<_, Option<i64>>(1)?.unwrap_or(0), row.get(2)?)),
            )
            .optional()?;

        row.map(|(status, article_count, completed_at)| {
            let status = ArchiveStatus::from_db_string(&status).ok_or(StorageError::InvalidValue {
                column: "archive_months.status",
                value: status,
            })?;
            Ok(ArchiveMonthRecord {
                month,
                status,
                article_count: article_count.max(0) as u64,
                completed_at,
            })
        })
        .transpose()
    }

    fn pending_archive_months(&self) -> StorageResult<Vec<YearMonth>> {
        let mut stmt = self.conn.prepare(
            "SELECT year_month FROM archive_months WHERE status = 'pending'
             ORDER BY year_month ASC",
        )?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        keys.into_iter()
            .map(|key| {
                YearMonth::parse(&key).ok_or(StorageError::InvalidValue {
                    column: "archive_months.year_month",
                    value: key,
                })
            })
            .collect()
    }

    // ===== Comments =====

    fn save_comments(&mut self, article_url: &str, comments: &[Comment]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM comments WHERE article_url = ?1",
            params![article_url],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO comments (
                    comment_id, article_url, author_name, author_url, timestamp, text_html,
                    text_clean, upvotes, downvotes, vote_score, parent_id, depth, images,
                    scraped_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            )?;
            let now = now_string();
            for comment in comments {
                stmt.execute(params![
                    comment.id,
                    article_url,
                    comment.author_name,
                    comment.author_url,
                    comment.timestamp.as_ref().map(timestamp_string),
                    comment.text_html,
                    comment.text_clean,
                    comment.upvotes,
                    comment.downvotes,
                    comment.vote_score,
                    comment.parent_id,
                    comment.depth,
                    serde_json::to_string(&comment.images)?,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(comments.len())
    }

    fn comments_for_article(&self, article_url: &str) -> StorageResult<Vec<Comment>> {
        // Rows are inserted in canonical order, so rowid preserves it.
        let mut stmt = self.conn.prepare(
            "SELECT comment_id, article_url, author_name, author_url, timestamp, text_html,
                    text_clean, upvotes, downvotes, vote_score, parent_id, depth, images
             FROM comments WHERE article_url = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![article_url], CommentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(CommentRow::into_comment).collect()
    }

    // ===== Images =====

    fn add_image(
        &mut self,
        original_url: &str,
        article_url: &str,
        comment_id: &str,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO images (original_url, article_url, comment_id)
             VALUES (?1, ?2, ?3)",
            params![original_url, article_url, comment_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn mark_image_downloaded(
        &mut self,
        original_url: &str,
        local_path: &str,
        filename: &str,
    ) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE images SET local_path = ?1, filename = ?2, downloaded = 1,
                               download_error = NULL
             WHERE original_url = ?3 AND downloaded = 0",
            params![local_path, filename, original_url],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    fn mark_image_error(&mut self, original_url: &str, error: &str) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE images SET download_error = ?1 WHERE original_url = ?2 AND downloaded = 0",
            params![error, original_url],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_image(&self, original_url: &str) -> StorageResult<Option<ImageRecord>> {
        let image = self
            .conn
            .query_row(
                &format!("SELECT {} FROM images WHERE original_url = ?1", IMAGE_COLUMNS),
                params![original_url],
                image_from_row,
            )
            .optional()?;
        Ok(image)
    }

    // ===== Sessions =====

    fn start_session(&mut self) -> StorageResult<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO scrape_sessions (started_at, status) VALUES (?1, ?2)",
            params![now_string(), SessionStatus::Running.to_db_string()],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    fn end_session(
        &mut self,
        session_id: i64,
        articles_scraped: u64,
        comments_scraped: u64,
    ) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE scrape_sessions
             SET ended_at = ?1, articles_scraped = ?2, comments_scraped = ?3, status = ?4
             WHERE session_id = ?5 AND status = ?6",
            params![
                now_string(),
                articles_scraped as i64,
                comments_scraped as i64,
                SessionStatus::Completed.to_db_string(),
                session_id,
                SessionStatus::Running.to_db_string(),
            ],
        )?;
        if changed == 0 {
            let exists: Option<i64> = tx
                .query_row(
                    "SELECT session_id FROM scrape_sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(StorageError::SessionNotFound(session_id));
            }
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    fn get_session(&self, session_id: i64) -> StorageResult<SessionRecord> {
        let row = self
            .conn
            .query_row(
                "SELECT session_id, started_at, ended_at, articles_scraped, comments_scraped,
                        status
                 FROM scrape_sessions WHERE session_id = ?1",
                params![session_id],
                session_from_row,
            )
            .optional()?
            .ok_or(StorageError::SessionNotFound(session_id))?;
        decode_session(row)
    }

    fn latest_session(&self) -> StorageResult<Option<SessionRecord>> {
        self.conn
            .query_row(
                "SELECT session_id, started_at, ended_at, articles_scraped, comments_scraped,
                        status
                 FROM scrape_sessions ORDER BY session_id DESC LIMIT 1",
                [],
                session_from_row,
            )
            .optional()?
            .map(decode_session)
            .transpose()
    }

    // ===== Statistics =====

    fn stats(&self) -> StorageResult<StoreStats> {
        let articles_by_status: std::collections::BTreeMap<String, u64> = self
            .grouped_counts("SELECT status, COUNT(*) FROM articles GROUP BY status")?
            .into_iter()
            .collect();
        let months_by_status = self
            .grouped_counts("SELECT status, COUNT(*) FROM archive_months GROUP BY status")?
            .into_iter()
            .collect();

        Ok(StoreStats {
            total_articles: articles_by_status.values().sum(),
            articles_by_status,
            total_comments: self.count("SELECT COUNT(*) FROM comments")?,
            total_images: self.count("SELECT COUNT(*) FROM images")?,
            downloaded_images: self.count("SELECT COUNT(*) FROM images WHERE downloaded = 1")?,
            months_by_status,
            sessions: self.count("SELECT COUNT(*) FROM scrape_sessions")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> SqliteStore {
        SqliteStore::new_in_memory().unwrap()
    }

    fn stub(url: &str) -> ArticleStub {
        ArticleStub::new(url, "title")
    }

    fn article(url: &str) -> Article {
        Article {
            id: "20200314_post".to_string(),
            url: url.to_string(),
            title: "Post".to_string(),
            author: "Author".to_string(),
            date_published: Some(Utc.with_ymd_and_hms(2020, 3, 14, 12, 0, 0).unwrap()),
            categories: vec!["News".to_string()],
            tags: vec!["climate".to_string()],
            content_html: "<p>x</p>".to_string(),
            content_text: "x".to_string(),
            comment_count: 2,
        }
    }

    #[test]
    fn test_add_stubs_is_idempotent() {
        let mut store = store();
        let stubs = vec![stub("https://e.com/a/"), stub("https://e.com/b/")];

        assert_eq!(store.add_article_stubs(&stubs).unwrap(), 2);
        assert_eq!(store.add_article_stubs(&stubs).unwrap(), 0);
        assert_eq!(store.stats().unwrap().total_articles, 2);
    }

    #[test]
    fn test_pending_articles_fifo() {
        let mut store = store();
        store
            .add_article_stubs(&[stub("https://e.com/1/"), stub("https://e.com/2/")])
            .unwrap();
        store.add_article_stubs(&[stub("https://e.com/3/")]).unwrap();

        let pending = store.pending_articles(10).unwrap();
        assert_eq!(
            pending,
            vec!["https://e.com/1/", "https://e.com/2/", "https://e.com/3/"]
        );
        assert_eq!(store.pending_articles(1).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_failed_increments_retry_count() {
        let mut store = store();
        let url = "https://e.com/a/";
        store.add_article_stubs(&[stub(url)]).unwrap();

        store.mark_failed(url, "timeout").unwrap();
        store.mark_failed(url, "timeout again").unwrap();

        let record = store.get_article(url).unwrap().unwrap();
        assert_eq!(record.status, ArticleStatus::Failed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.error_message.as_deref(), Some("timeout again"));

        assert_eq!(store.failed_articles(3).unwrap(), vec![url]);
        assert!(store.failed_articles(2).unwrap().is_empty());
    }

    #[test]
    fn test_mark_scraped_clears_error() {
        let mut store = store();
        let url = "https://e.com/2020/03/14/post/";
        store.add_article_stubs(&[stub(url)]).unwrap();
        store.mark_failed(url, "boom").unwrap();

        store.mark_scraped(&article(url)).unwrap();

        let record = store.get_article(url).unwrap().unwrap();
        assert_eq!(record.status, ArticleStatus::Scraped);
        assert!(record.error_message.is_none());
        assert_eq!(record.categories, vec!["News"]);
        assert_eq!(record.tags, vec!["climate"]);
        assert_eq!(record.article_id.as_deref(), Some("20200314_post"));
        assert!(store.pending_articles(10).unwrap().is_empty());
        assert_eq!(store.scraped_articles(10).unwrap(), vec![url]);
    }

    #[test]
    fn test_mark_unknown_article_fails_without_side_effects() {
        let mut store = store();
        let result = store.mark_failed("https://e.com/missing/", "x");
        assert!(matches!(result, Err(StorageError::ArticleNotFound(_))));
        assert!(matches!(
            store.mark_unavailable("https://e.com/missing/"),
            Err(StorageError::ArticleNotFound(_))
        ));
        assert_eq!(store.stats().unwrap().total_articles, 0);
    }

    #[test]
    fn test_unavailable_is_terminal() {
        let mut store = store();
        let url = "https://e.com/gone/";
        store.add_article_stubs(&[stub(url)]).unwrap();
        store.mark_unavailable(url).unwrap();
        store.mark_unavailable(url).unwrap();

        assert_eq!(
            store.article_status(url).unwrap(),
            Some(ArticleStatus::Unavailable)
        );
        assert!(store.pending_articles(10).unwrap().is_empty());
        assert!(store.failed_articles(10).unwrap().is_empty());
    }

    #[test]
    fn test_archive_month_lifecycle() {
        let mut store = store();
        let march = YearMonth::new(2020, 3).unwrap();
        let april = YearMonth::new(2020, 4).unwrap();

        store.add_archive_month(march).unwrap();
        store.add_archive_month(april).unwrap();
        store.add_archive_month(march).unwrap();
        assert_eq!(store.pending_archive_months().unwrap(), vec![march, april]);

        store.mark_archive_month_complete(march, 2).unwrap();
        assert!(store.is_archive_month_complete(march).unwrap());
        assert!(!store.is_archive_month_complete(april).unwrap());
        assert_eq!(store.pending_archive_months().unwrap(), vec![april]);

        // Re-adding a completed month does not reset it
        store.add_archive_month(march).unwrap();
        assert!(store.is_archive_month_complete(march).unwrap());

        let record = store.get_archive_month(march).unwrap().unwrap();
        assert_eq!(record.status, ArchiveStatus::Complete);
        assert_eq!(record.article_count, 2);
        assert!(record.completed_at.is_some());
        let pending = store.get_archive_month(april).unwrap().unwrap();
        assert_eq!(pending.status, ArchiveStatus::Pending);
        assert!(store.get_archive_month(YearMonth::new(2021, 1).unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_save_comments_replaces_set() {
        let mut store = store();
        let url = "https://e.com/a/";
        store.add_article_stubs(&[stub(url)]).unwrap();

        let mut reply = Comment::new("9", url).with_parent("5");
        reply.depth = 1;
        reply.images.push(ImageRef::new("https://e.com/i.png"));
        let first = vec![Comment::new("5", url), reply];
        assert_eq!(store.save_comments(url, &first).unwrap(), 2);

        let loaded = store.comments_for_article(url).unwrap();
        assert_eq!(loaded, first);

        let second = vec![Comment::new("7", url)];
        store.save_comments(url, &second).unwrap();
        let loaded = store.comments_for_article(url).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "7");
    }

    #[test]
    fn test_failed_comment_save_rolls_back() {
        let mut store = store();
        let url = "https://e.com/a/";
        store.add_article_stubs(&[stub(url)]).unwrap();
        store
            .save_comments(url, &[Comment::new("1", url)])
            .unwrap();

        // Unknown article violates the foreign key and must not delete anything
        let orphan = "https://e.com/unknown/";
        assert!(store
            .save_comments(orphan, &[Comment::new("2", orphan)])
            .is_err());
        assert_eq!(store.comments_for_article(url).unwrap().len(), 1);
    }

    #[test]
    fn test_image_downloaded_exactly_once() {
        let mut store = store();
        let url = "https://e.com/a/";
        let img = "https://e.com/i.png";
        store.add_article_stubs(&[stub(url)]).unwrap();
        store.add_image(img, url, "5").unwrap();
        store.add_image(img, url, "5").unwrap();

        let record = store.get_image(img).unwrap().unwrap();
        assert!(!record.downloaded);
        assert_eq!(record.comment_id.as_deref(), Some("5"));

        assert!(store.mark_image_downloaded(img, "/tmp/x.png", "x.png").unwrap());
        assert!(!store.mark_image_downloaded(img, "/tmp/y.png", "y.png").unwrap());
        let record = store.get_image(img).unwrap().unwrap();
        assert_eq!(record.filename.as_deref(), Some("x.png"));
        assert!(store.get_image("https://e.com/none.png").unwrap().is_none());
        assert!(record.downloaded);
    }

    #[test]
    fn test_session_closes_once() {
        let mut store = store();
        let id = store.start_session().unwrap();
        assert_eq!(store.get_session(id).unwrap().status, SessionStatus::Running);

        assert!(store.end_session(id, 3, 40).unwrap());
        assert!(!store.end_session(id, 99, 99).unwrap());

        let session = store.get_session(id).unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.articles_scraped, 3);
        assert_eq!(session.comments_scraped, 40);
        assert!(session.ended_at.is_some());
        assert_eq!(store.latest_session().unwrap().unwrap().id, id);

        assert!(matches!(
            store.end_session(12345, 0, 0),
            Err(StorageError::SessionNotFound(12345))
        ));
    }

    #[test]
    fn test_stats_grouped() {
        let mut store = store();
        store
            .add_article_stubs(&[
                stub("https://e.com/a/"),
                stub("https://e.com/b/"),
                stub("https://e.com/c/"),
            ])
            .unwrap();
        store.mark_unavailable("https://e.com/a/").unwrap();
        store.mark_failed("https://e.com/b/", "x").unwrap();
        store.start_session().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.total_articles, 3);
        assert_eq!(stats.articles_with_status(ArticleStatus::Pending), 1);
        assert_eq!(stats.articles_with_status(ArticleStatus::Failed), 1);
        assert_eq!(stats.articles_with_status(ArticleStatus::Unavailable), 1);
        assert_eq!(stats.articles_with_status(ArticleStatus::Scraped), 0);
        assert_eq!(stats.sessions, 1);
    }
}

//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Archivist progress ledger.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per discovered article, keyed by canonical URL
CREATE TABLE IF NOT EXISTS articles (
    url TEXT PRIMARY KEY,
    article_id TEXT,
    title TEXT,
    author TEXT,
    date_published TEXT,
    categories TEXT,
    tags TEXT,
    comment_count INTEGER DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    discovered_at TEXT NOT NULL,
    scraped_at TEXT,
    error_message TEXT,
    retry_count INTEGER NOT NULL DEFAULT 0
);

-- Merged comment set per article
CREATE TABLE IF NOT EXISTS comments (
    comment_id TEXT PRIMARY KEY,
    article_url TEXT NOT NULL REFERENCES articles(url),
    author_name TEXT,
    author_url TEXT,
    timestamp TEXT,
    text_html TEXT,
    text_clean TEXT,
    upvotes INTEGER DEFAULT 0,
    downvotes INTEGER DEFAULT 0,
    vote_score INTEGER DEFAULT 0,
    parent_id TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    images TEXT,
    scraped_at TEXT
);

-- Comment images, keyed by remote URL
CREATE TABLE IF NOT EXISTS images (
    original_url TEXT PRIMARY KEY,
    local_path TEXT,
    filename TEXT,
    article_url TEXT REFERENCES articles(url),
    comment_id TEXT,
    downloaded INTEGER NOT NULL DEFAULT 0,
    download_error TEXT
);

-- Discovery progress per archive month (YYYY-MM)
CREATE TABLE IF NOT EXISTS archive_months (
    year_month TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    article_count INTEGER DEFAULT 0,
    scraped_at TEXT
);

-- One row per process run
CREATE TABLE IF NOT EXISTS scrape_sessions (
    session_id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    articles_scraped INTEGER DEFAULT 0,
    comments_scraped INTEGER DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'running'
);

CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);
CREATE INDEX IF NOT EXISTS idx_articles_discovered ON articles(discovered_at);
CREATE INDEX IF NOT EXISTS idx_articles_date ON articles(date_published);
CREATE INDEX IF NOT EXISTS idx_comments_article ON comments(article_url);
CREATE INDEX IF NOT EXISTS idx_images_downloaded ON images(downloaded);
CREATE INDEX IF NOT EXISTS idx_archive_status ON archive_months(status);
"#;

/// Initializes the database schema
///
/// Every statement is `IF NOT EXISTS`, so this is safe to run on every open.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

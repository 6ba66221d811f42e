//! Database schema initialization

use sqlx::{Executor, SqlitePool};

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(SCHEMA_SQL).await?;
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Items table (one row per uploaded document)
CREATE TABLE IF NOT EXISTS items (
    item_id TEXT PRIMARY KEY,
    page_count INTEGER NOT NULL DEFAULT 0,
    state TEXT NOT NULL DEFAULT 'uploaded',
    full_text TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_items_state ON items(state);

-- Word bounding boxes, one row per word occurrence on a page.
-- position is the 1-based word ordinal within the page.
CREATE TABLE IF NOT EXISTS page_boxes (
    item_id TEXT NOT NULL,
    page INTEGER NOT NULL,
    position INTEGER NOT NULL,
    top INTEGER NOT NULL,
    "left" INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    word TEXT NOT NULL,

    PRIMARY KEY (item_id, page, position)
);

CREATE INDEX IF NOT EXISTS idx_page_boxes_word ON page_boxes(item_id, word);

-- Hyperlink regions per page
CREATE TABLE IF NOT EXISTS page_links (
    item_id TEXT NOT NULL,
    page INTEGER NOT NULL,
    link TEXT NOT NULL,
    top INTEGER NOT NULL,
    "left" INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_page_links_item ON page_links(item_id, page);

-- Highlights, addressed by per-page ordinal
CREATE TABLE IF NOT EXISTS highlights (
    item_id TEXT NOT NULL,
    page INTEGER NOT NULL,
    position INTEGER NOT NULL,
    color TEXT NOT NULL,
    top INTEGER NOT NULL,
    "left" INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    snippet TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),

    PRIMARY KEY (item_id, page, position)
);

-- Free-standing and anchored notes
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL,
    page INTEGER,
    top INTEGER,
    "left" INTEGER,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_notes_item ON notes(item_id, page);
"#;

//! Item extraction-state records

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;
use crate::pdf::ExtractionState;

/// Extraction bookkeeping for one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub item_id: String,
    pub page_count: i64,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text: Option<String>,
    pub updated_at: String,
}

impl ItemRecord {
    pub fn extraction_state(&self) -> Result<ExtractionState> {
        ExtractionState::parse(&self.state)
    }
}

/// Item repository
pub struct ItemRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ItemRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, item_id: &str) -> Result<Option<ItemRecord>> {
        let record = sqlx::query_as::<_, ItemRecord>(
            r#"
            SELECT item_id, page_count, state, full_text, updated_at
            FROM items
            WHERE item_id = ?
            "#,
        )
        .bind(item_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(record)
    }

    /// Create or replace the record after upload-time extraction. Replaces
    /// any previous extraction result for the item.
    pub async fn import(
        &self,
        item_id: &str,
        page_count: i64,
        state: ExtractionState,
        full_text: Option<&str>,
    ) -> Result<ItemRecord> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO items (item_id, page_count, state, full_text, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                page_count = excluded.page_count,
                state = excluded.state,
                full_text = excluded.full_text,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item_id)
        .bind(page_count)
        .bind(state.as_str())
        .bind(full_text)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(ItemRecord {
            item_id: item_id.to_string(),
            page_count,
            state: state.as_str().to_string(),
            full_text: full_text.map(String::from),
            updated_at: now,
        })
    }

    pub async fn set_state(&self, item_id: &str, state: ExtractionState) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE items
            SET state = ?, updated_at = datetime('now')
            WHERE item_id = ?
            "#,
        )
        .bind(state.as_str())
        .bind(item_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Store recognized text (OCR output) and advance the state together.
    pub async fn set_full_text(
        &self,
        item_id: &str,
        full_text: &str,
        state: ExtractionState,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE items
            SET full_text = ?, state = ?, updated_at = datetime('now')
            WHERE item_id = ?
            "#,
        )
        .bind(full_text)
        .bind(state.as_str())
        .bind(item_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, item_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM items WHERE item_id = ?")
            .bind(item_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

//! Notes database operations
//!
//! Notes are either anchored to a point on a page (page/top/left set) or
//! free-standing per item (all anchor fields NULL).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Note record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub item_id: String,
    pub page: Option<i64>,
    pub top: Option<i64>,
    pub left: Option<i64>,
    pub body: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Create note request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNote {
    pub page: Option<i64>,
    pub top: Option<i64>,
    pub left: Option<i64>,
    pub body: String,
}

/// Note repository
pub struct NoteRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NoteRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, item_id: &str, data: &CreateNote) -> Result<Note> {
        if data.body.trim().is_empty() {
            return Err(AppError::Validation("note body is empty".to_string()));
        }
        // A page anchor needs coordinates; coordinates need a page
        let anchored = data.page.is_some();
        if anchored != (data.top.is_some() && data.left.is_some()) {
            return Err(AppError::Validation(
                "note anchor requires page, top and left together".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO notes (id, item_id, page, top, "left", body, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(item_id)
        .bind(data.page)
        .bind(data.top)
        .bind(data.left)
        .bind(&data.body)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(Note {
            id,
            item_id: item_id.to_string(),
            page: data.page,
            top: data.top,
            left: data.left,
            body: data.body.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<Note>> {
        let note = sqlx::query_as::<_, Note>(
            r#"
            SELECT id, item_id, page, top, "left", body, created_at, updated_at
            FROM notes
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(note)
    }

    pub async fn for_item(&self, item_id: &str) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(
            r#"
            SELECT id, item_id, page, top, "left", body, created_at, updated_at
            FROM notes
            WHERE item_id = ?
            ORDER BY page ASC, created_at ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(self.pool)
        .await?;

        Ok(notes)
    }

    pub async fn update_body(&self, id: &str, body: &str) -> Result<Note> {
        if body.trim().is_empty() {
            return Err(AppError::Validation("note body is empty".to_string()));
        }
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE notes
            SET body = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(body)
        .bind(&now)
        .bind(id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("note {}", id)));
        }
        self.get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("note {}", id)))
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM notes WHERE item_id = ?")
            .bind(item_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

//! Highlights database operations
//!
//! Highlights are addressed by (item, page, position) where position is a
//! server-allocated per-page ordinal, so clients never invent identifiers.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

/// Supported marker colors. Closed set; stored as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    Red,
    Green,
    Blue,
    Yellow,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Red => "red",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Yellow => "yellow",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "red" => Ok(HighlightColor::Red),
            "green" => Ok(HighlightColor::Green),
            "blue" => Ok(HighlightColor::Blue),
            "yellow" => Ok(HighlightColor::Yellow),
            other => Err(AppError::Validation(format!(
                "unknown highlight color '{}'",
                other
            ))),
        }
    }
}

/// Highlight record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub item_id: String,
    pub page: i64,
    pub position: i64,
    pub color: String,
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub created_at: String,
}

/// Create highlight request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateHighlight {
    pub page: i64,
    pub color: HighlightColor,
    pub top: i64,
    pub left: i64,
    pub width: i64,
    pub height: i64,
    pub snippet: Option<String>,
}

/// Highlight repository
pub struct HighlightRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> HighlightRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a highlight; the position ordinal is allocated within the
    /// insert so concurrent creates on the same page cannot collide.
    pub async fn create(&self, item_id: &str, data: &CreateHighlight) -> Result<Highlight> {
        if data.page < 1 {
            return Err(AppError::Validation(format!(
                "page {} out of range",
                data.page
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO highlights (item_id, page, position, color, top, "left", width, height, snippet)
            SELECT ?, ?, COALESCE(MAX(position), 0) + 1, ?, ?, ?, ?, ?, ?
            FROM highlights
            WHERE item_id = ? AND page = ?
            "#,
        )
        .bind(item_id)
        .bind(data.page)
        .bind(data.color.as_str())
        .bind(data.top)
        .bind(data.left)
        .bind(data.width)
        .bind(data.height)
        .bind(&data.snippet)
        .bind(item_id)
        .bind(data.page)
        .execute(self.pool)
        .await?;

        let created = sqlx::query_as::<_, Highlight>(
            r#"
            SELECT item_id, page, position, color, top, "left", width, height, snippet, created_at
            FROM highlights
            WHERE item_id = ? AND page = ?
            ORDER BY position DESC
            LIMIT 1
            "#,
        )
        .bind(item_id)
        .bind(data.page)
        .fetch_one(self.pool)
        .await?;

        Ok(created)
    }

    pub async fn for_page(&self, item_id: &str, page: i64) -> Result<Vec<Highlight>> {
        let highlights = sqlx::query_as::<_, Highlight>(
            r#"
            SELECT item_id, page, position, color, top, "left", width, height, snippet, created_at
            FROM highlights
            WHERE item_id = ? AND page = ?
            ORDER BY position ASC
            "#,
        )
        .bind(item_id)
        .bind(page)
        .fetch_all(self.pool)
        .await?;

        Ok(highlights)
    }

    pub async fn for_item(&self, item_id: &str) -> Result<Vec<Highlight>> {
        let highlights = sqlx::query_as::<_, Highlight>(
            r#"
            SELECT item_id, page, position, color, top, "left", width, height, snippet, created_at
            FROM highlights
            WHERE item_id = ?
            ORDER BY page ASC, position ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(self.pool)
        .await?;

        Ok(highlights)
    }

    pub async fn set_color(
        &self,
        item_id: &str,
        page: i64,
        position: i64,
        color: HighlightColor,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE highlights
            SET color = ?
            WHERE item_id = ? AND page = ? AND position = ?
            "#,
        )
        .bind(color.as_str())
        .bind(item_id)
        .bind(page)
        .bind(position)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "highlight {}/{}/{}",
                item_id, page, position
            )));
        }
        Ok(())
    }

    pub async fn delete(&self, item_id: &str, page: i64, position: i64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM highlights WHERE item_id = ? AND page = ? AND position = ?",
        )
        .bind(item_id)
        .bind(page)
        .bind(position)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM highlights WHERE item_id = ?")
            .bind(item_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::initialize_schema(&pool).await.unwrap();
        pool
    }

    fn request(page: i64, color: HighlightColor) -> CreateHighlight {
        CreateHighlight {
            page,
            color,
            top: 100,
            left: 100,
            width: 300,
            height: 20,
            snippet: Some("marked text".to_string()),
        }
    }

    #[tokio::test]
    async fn test_position_allocated_per_page() {
        let pool = pool().await;
        let repo = HighlightRepository::new(&pool);

        let a = repo
            .create("item-1", &request(1, HighlightColor::Yellow))
            .await
            .unwrap();
        let b = repo
            .create("item-1", &request(1, HighlightColor::Red))
            .await
            .unwrap();
        let c = repo
            .create("item-1", &request(2, HighlightColor::Blue))
            .await
            .unwrap();

        assert_eq!(a.position, 1);
        assert_eq!(b.position, 2);
        // Ordinals restart on a new page
        assert_eq!(c.position, 1);
    }

    #[tokio::test]
    async fn test_position_not_reused_after_gap() {
        let pool = pool().await;
        let repo = HighlightRepository::new(&pool);

        repo.create("item-1", &request(1, HighlightColor::Red))
            .await
            .unwrap();
        let second = repo
            .create("item-1", &request(1, HighlightColor::Red))
            .await
            .unwrap();
        // Deleting position 1 leaves MAX at 2, so the next is 3
        assert!(repo.delete("item-1", 1, 1).await.unwrap());
        let third = repo
            .create("item-1", &request(1, HighlightColor::Red))
            .await
            .unwrap();

        assert_eq!(second.position, 2);
        assert_eq!(third.position, 3);
    }

    #[tokio::test]
    async fn test_set_color_and_missing() {
        let pool = pool().await;
        let repo = HighlightRepository::new(&pool);

        repo.create("item-1", &request(1, HighlightColor::Red))
            .await
            .unwrap();
        repo.set_color("item-1", 1, 1, HighlightColor::Green)
            .await
            .unwrap();

        let page = repo.for_page("item-1", 1).await.unwrap();
        assert_eq!(page[0].color, "green");

        let err = repo
            .set_color("item-1", 1, 99, HighlightColor::Green)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_color_parse_round_trip() {
        for color in [
            HighlightColor::Red,
            HighlightColor::Green,
            HighlightColor::Blue,
            HighlightColor::Yellow,
        ] {
            assert_eq!(HighlightColor::parse(color.as_str()).unwrap(), color);
        }
        assert!(HighlightColor::parse("magenta").is_err());
    }

    #[tokio::test]
    async fn test_rejects_page_zero() {
        let pool = pool().await;
        let repo = HighlightRepository::new(&pool);
        let err = repo
            .create("item-1", &request(0, HighlightColor::Red))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}

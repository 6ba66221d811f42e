//! Word bounding-box persistence

use sqlx::SqlitePool;

use crate::error::Result;
use crate::pdf::PageBox;

/// Word-box repository. Writes happen page-at-a-time so an interrupted
/// extraction leaves whole pages either indexed or absent, never partial.
pub struct PageBoxRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PageBoxRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace all boxes for one page of an item.
    pub async fn replace_page(
        &self,
        item_id: &str,
        page: i64,
        boxes: &[PageBox],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM page_boxes WHERE item_id = ? AND page = ?")
            .bind(item_id)
            .bind(page)
            .execute(&mut *tx)
            .await?;

        for b in boxes {
            sqlx::query(
                r#"
                INSERT INTO page_boxes (item_id, page, position, top, "left", width, height, word)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item_id)
            .bind(page)
            .bind(b.position)
            .bind(b.top)
            .bind(b.left)
            .bind(b.width)
            .bind(b.height)
            .bind(&b.word)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace every box of an item (native text-layer indexing).
    pub async fn replace_item(&self, item_id: &str, boxes: &[PageBox]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM page_boxes WHERE item_id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        for b in boxes {
            sqlx::query(
                r#"
                INSERT INTO page_boxes (item_id, page, position, top, "left", width, height, word)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item_id)
            .bind(b.page)
            .bind(b.position)
            .bind(b.top)
            .bind(b.left)
            .bind(b.width)
            .bind(b.height)
            .bind(&b.word)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Boxes for one page, in reading order.
    pub async fn for_page(&self, item_id: &str, page: i64) -> Result<Vec<PageBox>> {
        let boxes = sqlx::query_as::<_, PageBox>(
            r#"
            SELECT item_id, page, position, top, "left", width, height, word
            FROM page_boxes
            WHERE item_id = ? AND page = ?
            ORDER BY position ASC
            "#,
        )
        .bind(item_id)
        .bind(page)
        .fetch_all(self.pool)
        .await?;

        Ok(boxes)
    }

    /// Boxes for every page of an item, in page then reading order.
    pub async fn for_item(&self, item_id: &str) -> Result<Vec<PageBox>> {
        let boxes = sqlx::query_as::<_, PageBox>(
            r#"
            SELECT item_id, page, position, top, "left", width, height, word
            FROM page_boxes
            WHERE item_id = ?
            ORDER BY page ASC, position ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(self.pool)
        .await?;

        Ok(boxes)
    }

    /// Boxes within an inclusive page window, in page then reading order.
    pub async fn for_pages(
        &self,
        item_id: &str,
        first_page: i64,
        last_page: i64,
    ) -> Result<Vec<PageBox>> {
        let boxes = sqlx::query_as::<_, PageBox>(
            r#"
            SELECT item_id, page, position, top, "left", width, height, word
            FROM page_boxes
            WHERE item_id = ? AND page BETWEEN ? AND ?
            ORDER BY page ASC, position ASC
            "#,
        )
        .bind(item_id)
        .bind(first_page)
        .bind(last_page)
        .fetch_all(self.pool)
        .await?;

        Ok(boxes)
    }

    /// Boxes whose word contains the term, within an inclusive page window.
    /// Matching is ASCII case-insensitive (SQLite LIKE semantics).
    pub async fn matching(
        &self,
        item_id: &str,
        first_page: i64,
        last_page: i64,
        term: &str,
    ) -> Result<Vec<PageBox>> {
        let pattern = format!("%{}%", escape_like(term));
        let boxes = sqlx::query_as::<_, PageBox>(
            r#"
            SELECT item_id, page, position, top, "left", width, height, word
            FROM page_boxes
            WHERE item_id = ? AND page BETWEEN ? AND ?
              AND word LIKE ? ESCAPE '\'
            ORDER BY page ASC, position ASC
            "#,
        )
        .bind(item_id)
        .bind(first_page)
        .bind(last_page)
        .bind(pattern)
        .fetch_all(self.pool)
        .await?;

        Ok(boxes)
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM page_boxes WHERE item_id = ?")
            .bind(item_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

/// Escape LIKE metacharacters in user-supplied terms.
pub(crate) fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
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

    fn word(page: i64, position: i64, word: &str) -> PageBox {
        PageBox {
            item_id: "item-1".to_string(),
            page,
            position,
            top: 100,
            left: 50,
            width: 80,
            height: 20,
            word: word.to_string(),
        }
    }

    #[tokio::test]
    async fn test_replace_page_is_atomic_per_page() {
        let pool = pool().await;
        let repo = PageBoxRepository::new(&pool);

        repo.replace_page("item-1", 1, &[word(1, 1, "alpha"), word(1, 2, "beta")])
            .await
            .unwrap();
        repo.replace_page("item-1", 2, &[word(2, 1, "gamma")])
            .await
            .unwrap();
        // Re-running page 1 replaces, not appends
        repo.replace_page("item-1", 1, &[word(1, 1, "delta")])
            .await
            .unwrap();

        let all = repo.for_item("item-1").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].word, "delta");
        assert_eq!(all[1].word, "gamma");
    }

    #[tokio::test]
    async fn test_for_page_ordering() {
        let pool = pool().await;
        let repo = PageBoxRepository::new(&pool);

        repo.replace_page(
            "item-1",
            1,
            &[word(1, 2, "second"), word(1, 1, "first"), word(1, 3, "third")],
        )
        .await
        .unwrap();

        let boxes = repo.for_page("item-1", 1).await.unwrap();
        let words: Vec<&str> = boxes.iter().map(|b| b.word.as_str()).collect();
        assert_eq!(words, ["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_for_pages_window() {
        let pool = pool().await;
        let repo = PageBoxRepository::new(&pool);

        repo.replace_item(
            "item-1",
            &[word(1, 1, "a"), word(3, 1, "b"), word(5, 1, "c")],
        )
        .await
        .unwrap();

        let boxes = repo.for_pages("item-1", 2, 4).await.unwrap();
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].page, 3);
    }

    #[tokio::test]
    async fn test_matching_window_and_case() {
        let pool = pool().await;
        let repo = PageBoxRepository::new(&pool);

        repo.replace_item(
            "item-1",
            &[
                word(1, 1, "Entropy"),
                word(2, 1, "entropic"),
                word(9, 1, "entropy"),
                word(2, 2, "order"),
            ],
        )
        .await
        .unwrap();

        let hits = repo.matching("item-1", 1, 5, "entrop").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page, 1);
        assert_eq!(hits[1].page, 2);
    }

    #[tokio::test]
    async fn test_matching_escapes_metacharacters() {
        let pool = pool().await;
        let repo = PageBoxRepository::new(&pool);

        repo.replace_page("item-1", 1, &[word(1, 1, "100%"), word(1, 2, "100x")])
            .await
            .unwrap();

        let hits = repo.matching("item-1", 1, 1, "0%").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].word, "100%");
    }
}

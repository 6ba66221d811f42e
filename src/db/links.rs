//! Hyperlink-region persistence

use sqlx::SqlitePool;

use crate::error::Result;
use crate::pdf::PageLink;

pub struct PageLinkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PageLinkRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace every link region of an item.
    pub async fn replace_item(&self, item_id: &str, links: &[PageLink]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM page_links WHERE item_id = ?")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        for l in links {
            sqlx::query(
                r#"
                INSERT INTO page_links (item_id, page, link, top, "left", width, height)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(item_id)
            .bind(l.page)
            .bind(&l.link)
            .bind(l.top)
            .bind(l.left)
            .bind(l.width)
            .bind(l.height)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn for_page(&self, item_id: &str, page: i64) -> Result<Vec<PageLink>> {
        let links = sqlx::query_as::<_, PageLink>(
            r#"
            SELECT item_id, page, link, top, "left", width, height
            FROM page_links
            WHERE item_id = ? AND page = ?
            ORDER BY top ASC, "left" ASC
            "#,
        )
        .bind(item_id)
        .bind(page)
        .fetch_all(self.pool)
        .await?;

        Ok(links)
    }

    pub async fn for_pages(
        &self,
        item_id: &str,
        first_page: i64,
        last_page: i64,
    ) -> Result<Vec<PageLink>> {
        let links = sqlx::query_as::<_, PageLink>(
            r#"
            SELECT item_id, page, link, top, "left", width, height
            FROM page_links
            WHERE item_id = ? AND page BETWEEN ? AND ?
            ORDER BY page ASC, top ASC, "left" ASC
            "#,
        )
        .bind(item_id)
        .bind(first_page)
        .bind(last_page)
        .fetch_all(self.pool)
        .await?;

        Ok(links)
    }

    pub async fn for_item(&self, item_id: &str) -> Result<Vec<PageLink>> {
        let links = sqlx::query_as::<_, PageLink>(
            r#"
            SELECT item_id, page, link, top, "left", width, height
            FROM page_links
            WHERE item_id = ?
            ORDER BY page ASC, top ASC, "left" ASC
            "#,
        )
        .bind(item_id)
        .fetch_all(self.pool)
        .await?;

        Ok(links)
    }

    pub async fn delete_item(&self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM page_links WHERE item_id = ?")
            .bind(item_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

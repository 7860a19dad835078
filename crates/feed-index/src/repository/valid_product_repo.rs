//! 有效商品索引仓储
//!
//! 每次写入都在单个事务内完成，并以 feed_id 为键持有事务级 advisory lock，
//! 同一 feed 的并发写入串行执行，导出阶段读到的要么是旧结果要么是新结果。

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeSet;
use tracing::debug;

use super::traits::{IndexScope, ValidProductIndex};
use crate::error::Result;
use crate::models::{FeedId, ProductId};

pub struct PgValidProductIndex {
    pool: PgPool,
}

impl PgValidProductIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_feed(conn: &mut PgConnection, feed_id: FeedId) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(feed_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    async fn insert_in_tx(
        conn: &mut PgConnection,
        feed_id: FeedId,
        product_ids: &BTreeSet<ProductId>,
    ) -> Result<usize> {
        if product_ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<ProductId> = product_ids.iter().copied().collect();
        let result = sqlx::query(
            r#"
            INSERT INTO feed_valid_products (feed_id, valid_product_id)
            SELECT $1, UNNEST($2::bigint[])
            "#,
        )
        .bind(feed_id)
        .bind(&ids)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() as usize)
    }
}

#[async_trait]
impl ValidProductIndex for PgValidProductIndex {
    async fn replace(
        &self,
        feed_id: FeedId,
        scope: &IndexScope,
        product_ids: &BTreeSet<ProductId>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        Self::lock_feed(&mut tx, feed_id).await?;

        let deleted = match scope {
            IndexScope::Full => {
                sqlx::query("DELETE FROM feed_valid_products WHERE feed_id = $1")
                    .bind(feed_id)
                    .execute(&mut *tx)
                    .await?
            }
            IndexScope::Products(ids) => {
                sqlx::query(
                    "DELETE FROM feed_valid_products WHERE feed_id = $1 AND valid_product_id = ANY($2)",
                )
                .bind(feed_id)
                .bind(ids)
                .execute(&mut *tx)
                .await?
            }
        };

        let inserted = Self::insert_in_tx(&mut tx, feed_id, product_ids).await?;
        tx.commit().await?;

        debug!(
            feed_id,
            deleted = deleted.rows_affected(),
            inserted,
            "有效商品索引已替换"
        );
        Ok(inserted)
    }

    async fn append(&self, feed_id: FeedId, product_ids: &BTreeSet<ProductId>) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        Self::lock_feed(&mut tx, feed_id).await?;
        let inserted = Self::insert_in_tx(&mut tx, feed_id, product_ids).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn product_ids(&self, feed_id: FeedId) -> Result<Vec<ProductId>> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT valid_product_id
            FROM feed_valid_products
            WHERE feed_id = $1
            ORDER BY valid_product_id
            "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

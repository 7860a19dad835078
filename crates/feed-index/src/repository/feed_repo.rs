//! Feed 仓储

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use super::traits::FeedRepository;
use crate::error::Result;
use crate::models::{Feed, FeedId, StoreId};

#[derive(Debug, FromRow)]
struct FeedRow {
    entity_id: FeedId,
    store_id: StoreId,
    conditions_serialized: Option<String>,
    exclude_disabled: bool,
    exclude_not_visible: bool,
    exclude_out_of_stock: bool,
}

impl From<FeedRow> for Feed {
    fn from(row: FeedRow) -> Self {
        Feed {
            exclude_disabled: row.exclude_disabled,
            exclude_not_visible: row.exclude_not_visible,
            exclude_out_of_stock: row.exclude_out_of_stock,
            ..Feed::new(
                row.entity_id,
                row.store_id,
                row.conditions_serialized.unwrap_or_default(),
            )
        }
    }
}

pub struct PgFeedRepository {
    pool: PgPool,
}

impl PgFeedRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FeedRepository for PgFeedRepository {
    async fn get(&self, feed_id: FeedId) -> Result<Option<Feed>> {
        let row = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT entity_id, store_id, conditions_serialized,
                   exclude_disabled, exclude_not_visible, exclude_out_of_stock
            FROM feeds
            WHERE entity_id = $1
            "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Feed::from))
    }

    /// 列出所有启用的 feed
    async fn list_active(&self) -> Result<Vec<Feed>> {
        let rows = sqlx::query_as::<_, FeedRow>(
            r#"
            SELECT entity_id, store_id, conditions_serialized,
                   exclude_disabled, exclude_not_visible, exclude_out_of_stock
            FROM feeds
            WHERE is_active = TRUE
            ORDER BY entity_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Feed::from).collect())
    }
}

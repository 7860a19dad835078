//! 商品目录仓储
//!
//! 把候选集查询翻译为一条 PostgreSQL 查询：store 关联、排除过滤、显式 ID 和规则谓词。

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::CatalogSource;
use crate::candidate::CandidateQuery;
use crate::error::Result;
use crate::exclusion::CandidateFilter;
use crate::models::{ProductId, ProductStatus, StoreId, Visibility};
use crate::predicate::Predicate;
use crate::schema::{AttributeDescriptor, AttributeKind, AttributeSchema};

/// 构建候选集查询语句
///
/// 商品主表别名 `e`，store 关联表别名 `ps`，库存表别名 `s`。
/// 缺货排除使用内连接，没有库存记录的商品同样被排除。
pub fn build_candidate_select(query: &CandidateQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(
        "SELECT DISTINCT e.entity_id FROM catalog_products e \
         INNER JOIN catalog_product_store ps ON ps.product_id = e.entity_id AND ps.store_id = ",
    );
    qb.push_bind(query.store_id);

    if query.filters.contains(&CandidateFilter::InStockOnly) {
        qb.push(
            " INNER JOIN catalog_stock_items s ON s.product_id = e.entity_id AND s.is_in_stock = TRUE",
        );
    }

    qb.push(" WHERE TRUE");

    if !query.explicit_ids.is_empty() {
        qb.push(" AND e.entity_id = ANY(")
            .push_bind(query.explicit_ids.clone())
            .push(")");
    }

    for filter in &query.filters {
        match filter {
            CandidateFilter::EnabledOnly => {
                qb.push(" AND e.status = ")
                    .push_bind(ProductStatus::Enabled.code());
            }
            CandidateFilter::VisibleOnly => {
                qb.push(" AND e.visibility <> ")
                    .push_bind(Visibility::NotVisible.code());
            }
            CandidateFilter::InStockOnly => {}
        }
    }

    if query.predicate != Predicate::True {
        qb.push(" AND ");
        query.predicate.push_sql(&mut qb, query.store_id);
    }

    qb.push(" ORDER BY e.entity_id");
    qb
}

/// PostgreSQL 商品目录
pub struct PgCatalog {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: Duration::from_secs(300),
        }
    }

    /// 设置选品查询的语句超时
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

#[async_trait]
impl CatalogSource for PgCatalog {
    async fn store_exists(&self, store_id: StoreId) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM stores WHERE store_id = $1)")
                .bind(store_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn attribute_schema(&self, store_id: StoreId) -> Result<AttributeSchema> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT a.attribute_code, a.kind
            FROM catalog_attributes a
            WHERE a.is_filterable = TRUE
              AND (
                NOT EXISTS (
                    SELECT 1 FROM catalog_attribute_scopes s
                    WHERE s.attribute_code = a.attribute_code
                )
                OR EXISTS (
                    SELECT 1 FROM catalog_attribute_scopes s
                    WHERE s.attribute_code = a.attribute_code AND s.store_id = $1
                )
              )
            ORDER BY a.attribute_code
            "#,
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        let mut schema = AttributeSchema::new(store_id);
        for (code, kind) in rows {
            match AttributeKind::from_code(&kind) {
                Some(kind) => schema.register(AttributeDescriptor::indexed(code, kind)),
                None => debug!(attribute = %code, kind = %kind, "跳过不支持条件过滤的属性类型"),
            }
        }

        Ok(schema)
    }

    async fn fetch_product_ids(&self, query: &CandidateQuery) -> Result<Vec<ProductId>> {
        let mut qb = build_candidate_select(query);
        let timeout_ms = self.statement_timeout.as_millis().to_string();

        // 超时设置仅在当前事务内生效
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT set_config('statement_timeout', $1, true)")
            .bind(&timeout_ms)
            .execute(&mut *tx)
            .await?;

        let ids: Vec<ProductId> = match qb.build_query_scalar().fetch_all(&mut *tx).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(store_id = query.store_id, error = %e, "候选集查询失败");
                return Err(e.into());
            }
        };
        tx.commit().await?;

        Ok(ids)
    }
}

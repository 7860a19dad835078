//! PostgreSQL 适配器集成测试
//!
//! 需要可用的数据库，运行方式：
//! TEST_DATABASE_URL=postgres://... cargo test -p feed-index --test postgres_test -- --ignored

use feed_index::repository::{
    CatalogSource, PgCatalog, PgFeedRepository, PgValidProductIndex, ValidProductIndex,
};
use feed_index::{FeedIndexer, IndexScope};
use feed_shared::config::{IndexWriteMode, IndexerConfig};
use feed_shared::database::Database;
use feed_shared::test_utils::test_database_config;
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeSet;
use std::sync::Arc;

const STORE_ID: i64 = 9001;
const FEED_ID: i64 = 9001;
const OTHER_STORE_ID: i64 = 9002;

async fn setup() -> PgPool {
    let db = Database::connect(&test_database_config())
        .await
        .expect("数据库连接失败");
    db.run_migrations().await.expect("迁移失败");
    let pool = db.pool().clone();

    cleanup(&pool).await;
    seed(&pool).await;
    pool
}

async fn cleanup(pool: &PgPool) {
    for sql in [
        "DELETE FROM feed_valid_products WHERE feed_id = $1",
        "DELETE FROM feeds WHERE entity_id = $1",
        "DELETE FROM catalog_products WHERE entity_id BETWEEN $1 AND $1 + 100",
        "DELETE FROM stores WHERE store_id IN ($1, $1 + 1)",
    ] {
        sqlx::query(sql).bind(STORE_ID).execute(pool).await.unwrap();
    }
}

async fn seed(pool: &PgPool) {
    sqlx::query("INSERT INTO stores (store_id, code, name) VALUES ($1, 'it_store', 'IT Store')")
        .bind(STORE_ID)
        .execute(pool)
        .await
        .unwrap();

    for (code, kind) in [("color", "select"), ("size", "multiselect")] {
        sqlx::query(
            "INSERT INTO catalog_attributes (attribute_code, kind) VALUES ($1, $2) \
             ON CONFLICT (attribute_code) DO UPDATE SET kind = EXCLUDED.kind, is_filterable = TRUE",
        )
        .bind(code)
        .bind(kind)
        .execute(pool)
        .await
        .unwrap();
    }

    // (偏移, 状态, 有库存)
    let products = [(10, 1_i16, Some(true)), (11, 2, Some(true)), (12, 1, Some(true)), (13, 1, None)];
    for (offset, status, stock) in products {
        let id = STORE_ID + offset;
        sqlx::query("INSERT INTO catalog_products (entity_id, sku, status) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(format!("IT-{}", id))
            .bind(status)
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO catalog_product_store (product_id, store_id) VALUES ($1, $2)")
            .bind(id)
            .bind(STORE_ID)
            .execute(pool)
            .await
            .unwrap();
        if let Some(in_stock) = stock {
            sqlx::query("INSERT INTO catalog_stock_items (product_id, qty, is_in_stock) VALUES ($1, 10, $2)")
                .bind(id)
                .bind(in_stock)
                .execute(pool)
                .await
                .unwrap();
        }
    }

    let values = [
        (10, "color", "red"),
        (11, "color", "red"),
        (12, "size", "M"),
        (12, "size", "L"),
        (13, "color", "red"),
    ];
    for (offset, code, value) in values {
        sqlx::query(
            "INSERT INTO catalog_product_index_attribute (product_id, store_id, attribute_code, value_text) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(STORE_ID + offset)
        .bind(STORE_ID)
        .bind(code)
        .bind(value)
        .execute(pool)
        .await
        .unwrap();
    }

    let conditions = json!({
        "type": "group",
        "operator": "OR",
        "children": [
            {"type": "condition", "attribute": "color", "operator": "eq", "value": "red"},
            {"type": "condition", "attribute": "size", "operator": "in", "value": ["M", "L"]}
        ]
    });
    sqlx::query(
        "INSERT INTO feeds (entity_id, store_id, conditions_serialized, exclude_disabled) \
         VALUES ($1, $2, $3, TRUE)",
    )
    .bind(FEED_ID)
    .bind(STORE_ID)
    .bind(conditions.to_string())
    .execute(pool)
    .await
    .unwrap();
}

fn indexer(pool: &PgPool, mode: IndexWriteMode) -> FeedIndexer {
    let config = IndexerConfig {
        write_mode: mode,
        ..IndexerConfig::default()
    };
    FeedIndexer::new(
        Arc::new(PgCatalog::new(pool.clone())),
        Arc::new(PgValidProductIndex::new(pool.clone())),
        Arc::new(PgFeedRepository::new(pool.clone())),
        &config,
    )
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_reindex_feed_against_postgres() {
    let pool = setup().await;
    let indexer = indexer(&pool, IndexWriteMode::Replace);

    let report = indexer.reindex_feed(FEED_ID, &[]).await.unwrap();
    assert_eq!(report.product_count, 3);

    indexer.reindex_feed(FEED_ID, &[]).await.unwrap();
    let ids = indexer.valid_products(FEED_ID).await.unwrap();
    assert_eq!(ids, vec![STORE_ID + 10, STORE_ID + 12, STORE_ID + 13]);

    cleanup(&pool).await;
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_partial_replace_against_postgres() {
    let pool = setup().await;
    let index = PgValidProductIndex::new(pool.clone());

    index
        .replace(FEED_ID, &IndexScope::Full, &BTreeSet::from([1, 2, 3]))
        .await
        .unwrap();
    index
        .replace(FEED_ID, &IndexScope::Products(vec![2, 4]), &BTreeSet::from([4]))
        .await
        .unwrap();

    assert_eq!(index.product_ids(FEED_ID).await.unwrap(), vec![1, 3, 4]);
    cleanup(&pool).await;
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_catalog_schema_and_scope() {
    let pool = setup().await;
    let catalog = PgCatalog::new(pool.clone());

    assert!(catalog.store_exists(STORE_ID).await.unwrap());
    assert!(!catalog.store_exists(-1).await.unwrap());

    let schema = catalog.attribute_schema(STORE_ID).await.unwrap();
    assert!(schema.contains("color"));
    assert!(schema.contains("sku"));

    cleanup(&pool).await;
}

#[tokio::test]
#[ignore = "需要 PostgreSQL"]
async fn test_store_scoped_attribute_schema() {
    let pool = setup().await;
    let catalog = PgCatalog::new(pool.clone());

    sqlx::query("INSERT INTO stores (store_id, code, name) VALUES ($1, 'it_other', 'IT Other')")
        .bind(OTHER_STORE_ID)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO catalog_attributes (attribute_code, kind) VALUES ('it_engraving', 'text') \
         ON CONFLICT (attribute_code) DO UPDATE SET kind = EXCLUDED.kind, is_filterable = TRUE",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO catalog_attribute_scopes (attribute_code, store_id) VALUES ('it_engraving', $1)")
        .bind(STORE_ID)
        .execute(&pool)
        .await
        .unwrap();

    let own = catalog.attribute_schema(STORE_ID).await.unwrap();
    assert!(own.contains("it_engraving"));
    assert!(own.contains("color"));

    let other = catalog.attribute_schema(OTHER_STORE_ID).await.unwrap();
    assert!(!other.contains("it_engraving"));
    assert!(other.contains("color"));

    sqlx::query("DELETE FROM catalog_attributes WHERE attribute_code = 'it_engraving'")
        .execute(&pool)
        .await
        .unwrap();
    cleanup(&pool).await;
}

//! 内存实现
//!
//! 商品目录、有效商品索引和 feed 来源的内存版本，用于测试和基准。
//! 商品目录模拟关系型连接的行为：多值属性每个值产生一行，结果中可能出现重复 ID。

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::candidate::CandidateQuery;
use crate::error::Result;
use crate::models::{Feed, FeedId, ProductId, ProductRecord, StoreId};
use crate::repository::{CatalogSource, FeedRepository, IndexScope, ValidProductIndex};
use crate::schema::{AttributeKind, AttributeSchema};

#[derive(Default)]
struct CatalogState {
    stores: HashSet<StoreId>,
    schemas: HashMap<StoreId, AttributeSchema>,
    products: Vec<ProductRecord>,
}

/// 内存商品目录
#[derive(Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_store(&self, store_id: StoreId) {
        let mut state = self.state.write();
        state.stores.insert(store_id);
        state
            .schemas
            .entry(store_id)
            .or_insert_with(|| AttributeSchema::new(store_id));
    }

    /// 在 store 下注册索引属性
    pub fn register_attribute(&self, store_id: StoreId, code: &str, kind: AttributeKind) {
        let mut state = self.state.write();
        let schema = state
            .schemas
            .entry(store_id)
            .or_insert_with(|| AttributeSchema::new(store_id));
        *schema = schema.clone().with_attribute(code, kind);
    }

    pub fn add_product(&self, product: ProductRecord) {
        self.state.write().products.push(product);
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn store_exists(&self, store_id: StoreId) -> Result<bool> {
        Ok(self.state.read().stores.contains(&store_id))
    }

    async fn attribute_schema(&self, store_id: StoreId) -> Result<AttributeSchema> {
        let state = self.state.read();
        Ok(state
            .schemas
            .get(&store_id)
            .cloned()
            .unwrap_or_else(|| AttributeSchema::new(store_id)))
    }

    async fn fetch_product_ids(&self, query: &CandidateQuery) -> Result<Vec<ProductId>> {
        let state = self.state.read();
        let schema = state.schemas.get(&query.store_id);

        let mut ids = Vec::new();
        for product in state.products.iter().filter(|p| query.admits(p)) {
            // 引用的多值属性按值数展开
            let fan_out = query
                .attributes
                .iter()
                .filter(|code| {
                    schema
                        .and_then(|s| s.get(code))
                        .is_some_and(|d| d.is_multi_valued())
                })
                .map(|code| product.values_of(code).len().max(1))
                .product::<usize>();
            ids.extend(std::iter::repeat_n(product.entity_id, fan_out));
        }

        Ok(ids)
    }
}

/// 内存有效商品索引
///
/// 按 feed 保存行列表，保留追加模式下的重复行。
#[derive(Default)]
pub struct InMemoryValidProductIndex {
    rows: DashMap<FeedId, Vec<ProductId>>,
}

impl InMemoryValidProductIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置已有记录
    pub fn seed(&self, feed_id: FeedId, product_ids: &[ProductId]) {
        self.rows
            .entry(feed_id)
            .or_default()
            .extend_from_slice(product_ids);
    }

    pub fn row_count(&self, feed_id: FeedId) -> usize {
        self.rows.get(&feed_id).map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ValidProductIndex for InMemoryValidProductIndex {
    async fn replace(
        &self,
        feed_id: FeedId,
        scope: &IndexScope,
        product_ids: &BTreeSet<ProductId>,
    ) -> Result<usize> {
        // entry 持有分片写锁，删除和插入对读者原子可见
        let mut rows = self.rows.entry(feed_id).or_default();
        rows.retain(|id| !scope.covers(*id));
        rows.extend(product_ids.iter().copied());
        Ok(product_ids.len())
    }

    async fn append(&self, feed_id: FeedId, product_ids: &BTreeSet<ProductId>) -> Result<usize> {
        self.rows
            .entry(feed_id)
            .or_default()
            .extend(product_ids.iter().copied());
        Ok(product_ids.len())
    }

    async fn product_ids(&self, feed_id: FeedId) -> Result<Vec<ProductId>> {
        let mut ids = self
            .rows
            .get(&feed_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// 内存 feed 来源
#[derive(Default)]
pub struct InMemoryFeedRepository {
    feeds: RwLock<Vec<Feed>>,
}

impl InMemoryFeedRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, feed: Feed) {
        let mut feeds = self.feeds.write();
        feeds.retain(|f| f.entity_id != feed.entity_id);
        feeds.push(feed);
        feeds.sort_by_key(|f| f.entity_id);
    }
}

#[async_trait]
impl FeedRepository for InMemoryFeedRepository {
    async fn get(&self, feed_id: FeedId) -> Result<Option<Feed>> {
        Ok(self
            .feeds
            .read()
            .iter()
            .find(|f| f.entity_id == feed_id)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<Feed>> {
        Ok(self.feeds.read().clone())
    }
}

//! 仓储 Trait 定义
//!
//! 选品和索引写入依赖抽象而非具体实现，支持 mock 测试和内存实现

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::candidate::CandidateQuery;
use crate::error::Result;
use crate::models::{Feed, FeedId, ProductId, StoreId};
use crate::schema::AttributeSchema;

/// 索引写入范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexScope {
    /// 整个 feed 的记录
    Full,
    /// 只涉及给定商品的记录（增量重新校验）
    Products(Vec<ProductId>),
}

impl IndexScope {
    pub fn from_explicit_ids(ids: &[ProductId]) -> Self {
        if ids.is_empty() {
            Self::Full
        } else {
            Self::Products(ids.to_vec())
        }
    }

    /// 商品是否落在范围内
    pub fn covers(&self, product_id: ProductId) -> bool {
        match self {
            Self::Full => true,
            Self::Products(ids) => ids.contains(&product_id),
        }
    }
}

/// 商品目录接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn store_exists(&self, store_id: StoreId) -> Result<bool>;

    /// 该 store 下可用于条件的属性
    async fn attribute_schema(&self, store_id: StoreId) -> Result<AttributeSchema>;

    /// 执行候选集查询，返回的 ID 可能重复
    async fn fetch_product_ids(&self, query: &CandidateQuery) -> Result<Vec<ProductId>>;
}

/// 有效商品索引接口
///
/// 导出阶段按 feed_id 读取；写入必须是原子的，读者不会看到写了一半的结果。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ValidProductIndex: Send + Sync {
    /// 用 `product_ids` 原子替换 feed 在 `scope` 范围内的记录，返回写入行数
    async fn replace(
        &self,
        feed_id: FeedId,
        scope: &IndexScope,
        product_ids: &BTreeSet<ProductId>,
    ) -> Result<usize>;

    /// 只追加记录，不删除旧记录，返回写入行数
    async fn append(&self, feed_id: FeedId, product_ids: &BTreeSet<ProductId>) -> Result<usize>;

    /// 读取 feed 当前的有效商品（可能含重复，取决于写入模式）
    async fn product_ids(&self, feed_id: FeedId) -> Result<Vec<ProductId>>;
}

/// feed 来源接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedRepository: Send + Sync {
    async fn get(&self, feed_id: FeedId) -> Result<Option<Feed>>;
    async fn list_active(&self) -> Result<Vec<Feed>>;
}

//! 有效商品索引写入
//!
//! 把选品结果写入 feed 的有效商品索引。默认是原子替换；
//! `LegacyAppend` 只追加，重复运行会累积旧记录。

use feed_shared::config::IndexWriteMode;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;
use crate::models::{FeedId, ProductId};
use crate::repository::{IndexScope, ValidProductIndex};

pub struct ValidProductIndexWriter<I = crate::repository::PgValidProductIndex>
where
    I: ValidProductIndex,
{
    index: Arc<I>,
    mode: IndexWriteMode,
}

impl<I> ValidProductIndexWriter<I>
where
    I: ValidProductIndex,
{
    pub fn new(index: Arc<I>, mode: IndexWriteMode) -> Self {
        Self { index, mode }
    }

    pub fn mode(&self) -> IndexWriteMode {
        self.mode
    }

    pub fn index(&self) -> &Arc<I> {
        &self.index
    }

    /// 写入 feed 的有效商品，返回写入行数
    ///
    /// 替换模式下调用返回后，`scope` 范围内的记录恰好等于 `product_ids`；
    /// 写入失败时索引保持调用前的状态。
    pub async fn update_index(
        &self,
        feed_id: FeedId,
        scope: &IndexScope,
        product_ids: &BTreeSet<ProductId>,
    ) -> Result<usize> {
        let written = match self.mode {
            IndexWriteMode::Replace => self.index.replace(feed_id, scope, product_ids).await?,
            IndexWriteMode::LegacyAppend => self.index.append(feed_id, product_ids).await?,
        };

        debug!(feed_id, written, mode = ?self.mode, "有效商品索引已写入");
        Ok(written)
    }
}

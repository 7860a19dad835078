//! 排除过滤
//!
//! 根据 feed 的三个开关（排除禁用 / 不可见 / 缺货商品）给候选集追加过滤条件。
//! 各过滤条件之间以及与规则谓词之间都是 AND 关系。

use crate::candidate::CandidateQuery;
use crate::models::{Feed, ProductRecord, ProductStatus, Visibility};

/// 候选集过滤条件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateFilter {
    /// 只保留启用的商品
    EnabledOnly,
    /// 去掉 "不可见" 的商品，保留 catalog / search / catalog & search
    VisibleOnly,
    /// 内连接库存记录且要求有货；没有库存记录的商品同样被排除
    InStockOnly,
}

impl CandidateFilter {
    /// 商品记录是否通过过滤
    pub fn admits(self, product: &ProductRecord) -> bool {
        match self {
            Self::EnabledOnly => product.status == ProductStatus::Enabled,
            Self::VisibleOnly => product.visibility != Visibility::NotVisible,
            Self::InStockOnly => product.in_stock == Some(true),
        }
    }
}

/// feed 级别的排除开关
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    pub exclude_disabled: bool,
    pub exclude_not_visible: bool,
    pub exclude_out_of_stock: bool,
}

impl ExclusionFilter {
    pub fn from_feed(feed: &Feed) -> Self {
        Self {
            exclude_disabled: feed.exclude_disabled,
            exclude_not_visible: feed.exclude_not_visible,
            exclude_out_of_stock: feed.exclude_out_of_stock,
        }
    }

    /// 开关对应的过滤条件，顺序固定
    pub fn filters(&self) -> Vec<CandidateFilter> {
        let mut filters = Vec::with_capacity(3);
        if self.exclude_disabled {
            filters.push(CandidateFilter::EnabledOnly);
        }
        if self.exclude_not_visible {
            filters.push(CandidateFilter::VisibleOnly);
        }
        if self.exclude_out_of_stock {
            filters.push(CandidateFilter::InStockOnly);
        }
        filters
    }

    /// 把过滤条件追加到候选集查询
    pub fn apply(&self, query: &mut CandidateQuery) {
        for filter in self.filters() {
            if !query.filters.contains(&filter) {
                query.filters.push(filter);
            }
        }
    }
}

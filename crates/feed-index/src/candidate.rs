//! 候选集查询
//!
//! 描述一次选品要对商品目录发起的查询：store 范围、显式商品 ID、排除过滤、
//! 规则引用的属性和规则谓词。由商品目录适配器执行。

use crate::exclusion::CandidateFilter;
use crate::models::{ProductId, ProductRecord, StoreId};
use crate::predicate::Predicate;
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub store_id: StoreId,
    /// 为空表示不按 ID 限制
    pub explicit_ids: Vec<ProductId>,
    pub filters: Vec<CandidateFilter>,
    /// 规则引用的属性，适配器据此准备需要关联的属性数据
    pub attributes: BTreeSet<String>,
    pub predicate: Predicate,
}

impl CandidateQuery {
    pub fn new(store_id: StoreId) -> Self {
        Self {
            store_id,
            explicit_ids: Vec::new(),
            filters: Vec::new(),
            attributes: BTreeSet::new(),
            predicate: Predicate::True,
        }
    }

    /// 限制在给定的商品 ID 内；空列表不做限制
    pub fn restrict_to(&mut self, ids: &[ProductId]) {
        if ids.is_empty() {
            return;
        }
        let unique: BTreeSet<ProductId> = ids.iter().copied().collect();
        self.explicit_ids = unique.into_iter().collect();
    }

    /// 以 AND 关系附加谓词
    pub fn attach_predicate(&mut self, predicate: Predicate) {
        let current = std::mem::replace(&mut self.predicate, Predicate::True);
        self.predicate = Predicate::and(vec![current, predicate]);
    }

    pub fn register_attributes(&mut self, attributes: impl IntoIterator<Item = String>) {
        self.attributes.extend(attributes);
    }

    /// 查询结果必然为空（谓词恒假）
    pub fn is_unsatisfiable(&self) -> bool {
        self.predicate == Predicate::False
    }

    /// 商品记录是否属于候选集并满足全部条件
    pub fn admits(&self, product: &ProductRecord) -> bool {
        product.store_ids.contains(&self.store_id)
            && (self.explicit_ids.is_empty() || self.explicit_ids.contains(&product.entity_id))
            && self.filters.iter().all(|f| f.admits(product))
            && self.predicate.matches(product)
    }
}

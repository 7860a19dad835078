//! 商品选择器
//!
//! 按 feed 的 store、显式 ID、排除开关和规则谓词构建候选集查询，
//! 交给商品目录执行并去重。

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::aggregator::RuleAggregator;
use crate::candidate::CandidateQuery;
use crate::error::{FeedIndexError, Result};
use crate::evaluator::ConditionEvaluator;
use crate::exclusion::ExclusionFilter;
use crate::models::{Feed, ProductId};
use crate::repository::CatalogSource;

/// 商品选择器
pub struct ProductSelector<C = crate::repository::PgCatalog>
where
    C: CatalogSource,
{
    catalog: Arc<C>,
    aggregator: RuleAggregator,
}

impl<C> ProductSelector<C>
where
    C: CatalogSource,
{
    pub fn new(catalog: Arc<C>, aggregator: RuleAggregator) -> Self {
        Self {
            catalog,
            aggregator,
        }
    }

    /// 选出 feed 的有效商品
    ///
    /// 1. 构建规则（feed 上挂载的运行时规则与当前 store 和条件一致时直接使用）
    /// 2. 确认 store 存在
    /// 3. 限定 store 和显式 ID
    /// 4. 追加排除过滤
    /// 5. 校验属性并附加规则谓词
    /// 6. 执行查询并去重
    ///
    /// 没有匹配商品时返回空集合，不视为错误。
    #[instrument(skip(self, feed), fields(feed_id = feed.entity_id, store_id = feed.store_id))]
    pub async fn select(
        &self,
        feed: &Feed,
        explicit_ids: &[ProductId],
    ) -> Result<BTreeSet<ProductId>> {
        // 1. 条件格式错误在任何查询之前失败
        let rule = match &feed.rule {
            Some(rule)
                if rule.store_id == feed.store_id
                    && rule.conditions_serialized == feed.conditions_serialized =>
            {
                Cow::Borrowed(rule)
            }
            _ => Cow::Owned(self.aggregator.build_rule(feed)?),
        };

        // 2. store 范围
        if !self.catalog.store_exists(rule.store_id).await? {
            return Err(FeedIndexError::ScopeNotFound(rule.store_id));
        }

        // 3. 候选集
        let mut query = CandidateQuery::new(rule.store_id);
        query.restrict_to(explicit_ids);

        // 4. 排除过滤
        ExclusionFilter::from_feed(feed).apply(&mut query);

        // 5. 规则
        let schema = self.catalog.attribute_schema(rule.store_id).await?;
        let evaluator = ConditionEvaluator::new(&schema);
        query.register_attributes(evaluator.collect_validated_attributes(&rule.root)?);
        query.attach_predicate(evaluator.compile_to_predicate(&rule.root)?);

        if query.is_unsatisfiable() {
            debug!("规则谓词恒为假，跳过查询");
            return Ok(BTreeSet::new());
        }

        // 6. 多值属性可能让同一商品出现多次
        let rows = self.catalog.fetch_product_ids(&query).await?;
        let row_count = rows.len();
        let products: BTreeSet<ProductId> = rows.into_iter().collect();

        debug!(rows = row_count, products = products.len(), "选品完成");
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleNode;
    use crate::predicate::Predicate;
    use crate::repository::MockCatalogSource;
    use crate::schema::{AttributeKind, AttributeSchema};
    use serde_json::json;

    fn color_schema() -> AttributeSchema {
        AttributeSchema::new(1).with_attribute("color", AttributeKind::Select)
    }

    fn color_feed(value: serde_json::Value) -> Feed {
        let conditions = json!({
            "type": "condition", "attribute": "color", "operator": "eq", "value": value
        });
        Feed::new(1, 1, conditions.to_string())
    }

    #[tokio::test]
    async fn test_unknown_store_fails() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(false));
        catalog.expect_attribute_schema().never();
        catalog.expect_fetch_product_ids().never();

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        let err = selector.select(&Feed::new(1, 9, ""), &[]).await.unwrap_err();
        assert!(matches!(err, FeedIndexError::ScopeNotFound(9)));
    }

    #[tokio::test]
    async fn test_malformed_conditions_fail_before_any_query() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().never();
        catalog.expect_fetch_product_ids().never();

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        let err = selector
            .select(&Feed::new(1, 1, "[1, 2"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, FeedIndexError::MalformedConditions(_)));
    }

    #[tokio::test]
    async fn test_invalid_attribute_fails_before_fetch() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(true));
        catalog
            .expect_attribute_schema()
            .returning(|store_id| Ok(AttributeSchema::new(store_id)));
        catalog.expect_fetch_product_ids().never();

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        let err = selector.select(&color_feed(json!("red")), &[]).await.unwrap_err();
        assert!(matches!(
            err,
            FeedIndexError::InvalidAttribute { ref attribute, store_id: 1 } if attribute == "color"
        ));
    }

    #[tokio::test]
    async fn test_builds_query_and_dedupes() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(true));
        catalog.expect_attribute_schema().returning(|_| Ok(color_schema()));
        catalog
            .expect_fetch_product_ids()
            .withf(|query| {
                query.explicit_ids == vec![10, 11]
                    && query.attributes.contains("color")
                    && !query.predicate.is_constant()
            })
            .times(1)
            .returning(|_| Ok(vec![11, 10, 11]));

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        let products = selector
            .select(&color_feed(json!("red")), &[11, 10])
            .await
            .unwrap();
        assert_eq!(products, BTreeSet::from([10, 11]));
    }

    #[tokio::test]
    async fn test_unsatisfiable_rule_skips_fetch() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(true));
        catalog.expect_attribute_schema().returning(|_| Ok(color_schema()));
        catalog.expect_fetch_product_ids().never();

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        // eq 空值恒为假
        let products = selector.select(&color_feed(json!("")), &[]).await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn test_empty_rule_attaches_true_predicate() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(true));
        catalog
            .expect_attribute_schema()
            .returning(|store_id| Ok(AttributeSchema::new(store_id)));
        catalog
            .expect_fetch_product_ids()
            .withf(|query| query.predicate == Predicate::True && query.attributes.is_empty())
            .returning(|_| Ok(vec![1, 2, 3]));

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        let products = selector.select(&Feed::new(1, 1, ""), &[]).await.unwrap();
        assert_eq!(products.len(), 3);
    }

    #[tokio::test]
    async fn test_catalog_error_propagates() {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(true));
        catalog
            .expect_attribute_schema()
            .returning(|store_id| Ok(AttributeSchema::new(store_id)));
        catalog
            .expect_fetch_product_ids()
            .returning(|_| Err(FeedIndexError::Persistence(sqlx::Error::PoolTimedOut)));

        let selector = ProductSelector::new(Arc::new(catalog), RuleAggregator::default());
        let err = selector.select(&Feed::new(1, 1, ""), &[]).await.unwrap_err();
        assert!(err.is_retryable());
    }

    fn match_all_catalog() -> MockCatalogSource {
        let mut catalog = MockCatalogSource::new();
        catalog.expect_store_exists().returning(|_| Ok(true));
        catalog.expect_attribute_schema().returning(|_| Ok(color_schema()));
        catalog
            .expect_fetch_product_ids()
            .withf(|query| query.predicate == Predicate::True && query.attributes.is_empty())
            .times(1)
            .returning(|_| Ok(vec![1, 2]));
        catalog
    }

    #[tokio::test]
    async fn test_stale_runtime_rule_is_rebuilt() {
        let aggregator = RuleAggregator::default();
        let mut feed = color_feed(json!("red"));
        aggregator.build_runtime_rule(&mut feed).unwrap();
        // 条件在挂载规则之后被改为空
        feed.conditions_serialized = String::new();

        let selector = ProductSelector::new(Arc::new(match_all_catalog()), aggregator);
        let products = selector.select(&feed, &[]).await.unwrap();
        assert_eq!(products, BTreeSet::from([1, 2]));
    }

    #[tokio::test]
    async fn test_current_runtime_rule_is_reused() {
        let aggregator = RuleAggregator::default();
        let mut feed = color_feed(json!("red"));
        aggregator.build_runtime_rule(&mut feed).unwrap();
        // 条件文本未变时不重新解析，直接使用挂载的规则
        feed.rule.as_mut().unwrap().root = RuleNode::empty();

        let selector = ProductSelector::new(Arc::new(match_all_catalog()), aggregator);
        let products = selector.select(&feed, &[]).await.unwrap();
        assert_eq!(products, BTreeSet::from([1, 2]));
    }
}

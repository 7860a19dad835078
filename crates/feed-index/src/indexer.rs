//! Feed 索引编排
//!
//! 串联规则聚合、选品和索引写入：构建运行时规则 → 选出有效商品 → 写入索引。
//! 所有错误都返回给调用方，失败前记录 warn 日志和失败指标。

use chrono::{DateTime, Utc};
use feed_shared::config::IndexerConfig;
use feed_shared::observability::metrics::record_index_run;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::RuleAggregator;
use crate::error::{FeedIndexError, Result};
use crate::index_writer::ValidProductIndexWriter;
use crate::models::{Feed, FeedId, ProductId, StoreId};
use crate::repository::{
    CatalogSource, FeedRepository, IndexScope, PgCatalog, PgFeedRepository, PgValidProductIndex,
    ValidProductIndex,
};
use crate::selector::ProductSelector;

/// 单个 feed 的索引更新结果
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    pub run_id: Uuid,
    pub feed_id: FeedId,
    pub store_id: StoreId,
    /// 本次选出的商品数
    pub product_count: usize,
    /// 写入的行数
    pub rows_written: usize,
    /// 是否为增量重新校验
    pub partial: bool,
    pub elapsed_ms: u64,
    pub indexed_at: DateTime<Utc>,
}

/// 批量重建结果
///
/// 各 feed 相互独立，一个 feed 失败不影响其他 feed。
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<IndexReport>,
    pub failed: Vec<(FeedId, FeedIndexError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Feed 索引器
pub struct FeedIndexer<C = PgCatalog, I = PgValidProductIndex, F = PgFeedRepository>
where
    C: CatalogSource,
    I: ValidProductIndex,
    F: FeedRepository,
{
    aggregator: RuleAggregator,
    selector: ProductSelector<C>,
    writer: ValidProductIndexWriter<I>,
    feeds: Arc<F>,
    concurrency: usize,
}

impl<C, I, F> FeedIndexer<C, I, F>
where
    C: CatalogSource,
    I: ValidProductIndex,
    F: FeedRepository,
{
    pub fn new(catalog: Arc<C>, index: Arc<I>, feeds: Arc<F>, config: &IndexerConfig) -> Self {
        let aggregator = RuleAggregator::new(config.max_condition_depth);
        Self {
            aggregator,
            selector: ProductSelector::new(catalog, aggregator),
            writer: ValidProductIndexWriter::new(index, config.write_mode),
            feeds,
            concurrency: config.reindex_concurrency.max(1),
        }
    }

    /// 选出 feed 的有效商品并写入索引
    ///
    /// `explicit_ids` 非空时只重新校验这些商品，索引中其他商品的记录保持不变。
    #[instrument(
        skip(self, feed, explicit_ids),
        fields(feed_id = feed.entity_id, store_id = feed.store_id, run_id = tracing::field::Empty)
    )]
    pub async fn update_index(
        &self,
        feed: &mut Feed,
        explicit_ids: &[ProductId],
    ) -> Result<IndexReport> {
        let run_id = Uuid::now_v7();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let start = Instant::now();

        match self.execute(feed, explicit_ids).await {
            Ok((product_count, rows_written)) => {
                let elapsed = start.elapsed();
                record_index_run(
                    feed.entity_id,
                    "success",
                    product_count,
                    elapsed.as_secs_f64(),
                );
                info!(
                    product_count,
                    rows_written,
                    mode = ?self.writer.mode(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "feed 索引更新完成"
                );

                Ok(IndexReport {
                    run_id,
                    feed_id: feed.entity_id,
                    store_id: feed.store_id,
                    product_count,
                    rows_written,
                    partial: !explicit_ids.is_empty(),
                    elapsed_ms: elapsed.as_millis() as u64,
                    indexed_at: Utc::now(),
                })
            }
            Err(e) => {
                record_index_run(feed.entity_id, "failure", 0, start.elapsed().as_secs_f64());
                warn!(error = %e, code = e.code(), "feed 索引更新失败");
                Err(e)
            }
        }
    }

    async fn execute(&self, feed: &mut Feed, explicit_ids: &[ProductId]) -> Result<(usize, usize)> {
        self.aggregator.build_runtime_rule(feed)?;
        let selected = self.selector.select(feed, explicit_ids).await;
        // 运行时规则只在本次运行内有效
        feed.rule = None;
        let products = selected?;

        let scope = IndexScope::from_explicit_ids(explicit_ids);
        let written = self
            .writer
            .update_index(feed.entity_id, &scope, &products)
            .await?;

        Ok((products.len(), written))
    }

    /// 按 ID 重建单个 feed
    pub async fn reindex_feed(
        &self,
        feed_id: FeedId,
        explicit_ids: &[ProductId],
    ) -> Result<IndexReport> {
        let mut feed = self
            .feeds
            .get(feed_id)
            .await?
            .ok_or(FeedIndexError::FeedNotFound(feed_id))?;

        self.update_index(&mut feed, explicit_ids).await
    }

    /// 重建全部启用的 feed
    ///
    /// 最多同时处理 `reindex_concurrency` 个 feed。读取 feed 列表失败时直接返回错误；
    /// 单个 feed 的失败记录在结果中，结果按 feed ID 排序。
    #[instrument(skip(self), fields(concurrency = self.concurrency))]
    pub async fn reindex_all(&self) -> Result<BatchReport> {
        let feeds = self.feeds.list_active().await?;

        let outcomes: Vec<(FeedId, Result<IndexReport>)> = stream::iter(feeds)
            .map(|mut feed| async move {
                let feed_id = feed.entity_id;
                (feed_id, self.update_index(&mut feed, &[]).await)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (feed_id, outcome) in outcomes {
            match outcome {
                Ok(r) => report.succeeded.push(r),
                Err(e) => report.failed.push((feed_id, e)),
            }
        }
        report.succeeded.sort_by_key(|r| r.feed_id);
        report.failed.sort_by_key(|(feed_id, _)| *feed_id);

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "全部 feed 重建完成"
        );
        Ok(report)
    }

    /// 读取 feed 当前的有效商品
    pub async fn valid_products(&self, feed_id: FeedId) -> Result<Vec<ProductId>> {
        if self.feeds.get(feed_id).await?.is_none() {
            return Err(FeedIndexError::FeedNotFound(feed_id));
        }
        self.writer.index().product_ids(feed_id).await
    }
}

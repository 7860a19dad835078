//! Feed 有效商品索引
//!
//! 按 feed 配置的条件树从商品目录中选出有效商品，写入供导出阶段读取的索引：
//! - 条件树解析和结构校验（规则聚合）
//! - 基于属性 schema 的条件校验和谓词编译
//! - 排除过滤（禁用 / 不可见 / 缺货）
//! - 选品去重和索引原子替换

pub mod aggregator;
pub mod candidate;
pub mod cli;
pub mod error;
pub mod evaluator;
pub mod exclusion;
pub mod index_writer;
pub mod indexer;
pub mod memory;
pub mod models;
pub mod operators;
pub mod predicate;
pub mod repository;
pub mod schema;
pub mod selector;

pub use aggregator::RuleAggregator;
pub use candidate::CandidateQuery;
pub use error::{FeedIndexError, Result};
pub use evaluator::ConditionEvaluator;
pub use exclusion::{CandidateFilter, ExclusionFilter};
pub use index_writer::ValidProductIndexWriter;
pub use indexer::{BatchReport, FeedIndexer, IndexReport};
pub use models::{Condition, Feed, LogicalGroup, ProductRecord, Rule, RuleNode};
pub use operators::{LogicalOperator, Operator};
pub use predicate::Predicate;
pub use repository::{CatalogSource, FeedRepository, IndexScope, ValidProductIndex};
pub use schema::{AttributeKind, AttributeSchema};
pub use selector::ProductSelector;

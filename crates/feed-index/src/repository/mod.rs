//! 数据库仓储层
//!
//! 定义选品和索引写入依赖的外部接口（商品目录、有效商品索引、feed 来源），
//! 并提供基于 PostgreSQL 的实现。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据访问，选品逻辑在 selector / indexer 中
//! - 使用 SQLx 运行时查询，比较值全部参数绑定
//! - 定义 trait 接口以支持 mock 和内存实现

mod catalog_repo;
mod feed_repo;
mod traits;
mod valid_product_repo;

pub use catalog_repo::{PgCatalog, build_candidate_select};
pub use feed_repo::PgFeedRepository;
pub use traits::*;
pub use valid_product_repo::PgValidProductIndex;

//! CLI 命令定义

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::future::Future;
use tracing::warn;

/// Feed 有效商品索引工具
#[derive(Parser, Debug)]
#[command(name = "feed-indexer")]
#[command(version, about = "按 feed 规则重建有效商品索引")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 启动前执行数据库迁移
    #[arg(long)]
    pub migrate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 重建指定 feed 的索引
    ///
    /// 指定 --products 时只重新校验这些商品，其他商品的索引记录保持不变。
    Reindex {
        /// feed ID，可重复
        #[arg(short, long = "feed", required = true)]
        feeds: Vec<i64>,

        /// 只重新校验的商品 ID，可重复
        #[arg(short, long = "products", num_args = 1..)]
        products: Vec<i64>,
    },

    /// 重建全部启用的 feed
    ReindexAll,

    /// 输出 feed 当前的有效商品
    Show {
        #[arg(short, long)]
        feed: i64,
    },
}

/// 执行命令，直到完成或收到取消信号
///
/// 取消时丢弃正在执行的 future，未提交的事务随之回滚。
/// 取消以错误返回，进程退出码非零。
pub async fn run_until_cancelled<T, F, S>(operation: F, shutdown: S) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>>,
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = operation => result,
        signalled = shutdown => {
            signalled?;
            warn!("Received Ctrl+C, operation cancelled");
            bail!("operation cancelled")
        }
    }
}

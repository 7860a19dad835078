//! Feed 索引工具入口
//!
//! 加载配置、初始化可观测性、连接数据库后执行子命令。
//! Ctrl+C 会取消正在进行的操作，未提交的事务随之回滚，进程以非零状态退出。

use anyhow::{Result, bail};
use clap::Parser;
use feed_index::cli::{Cli, Commands, run_until_cancelled};
use feed_index::repository::{PgCatalog, PgFeedRepository, PgValidProductIndex};
use feed_index::FeedIndexer;
use feed_shared::config::AppConfig;
use feed_shared::database::Database;
use feed_shared::error::SharedError;
use feed_shared::observability;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load("feed-indexer").unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    let db = Database::connect(&config.database)
        .await
        .inspect_err(|e| log_bootstrap_failure("connect", e))?;
    if cli.migrate {
        db.run_migrations()
            .await
            .inspect_err(|e| log_bootstrap_failure("migrate", e))?;
    }

    let pool = db.pool().clone();
    let catalog = PgCatalog::new(pool.clone())
        .with_statement_timeout(Duration::from_secs(config.indexer.statement_timeout_seconds));
    let indexer = FeedIndexer::new(
        Arc::new(catalog),
        Arc::new(PgValidProductIndex::new(pool.clone())),
        Arc::new(PgFeedRepository::new(pool)),
        &config.indexer,
    );

    let outcome = run_until_cancelled(run(&indexer, cli.command), signal::ctrl_c()).await;

    db.close().await;
    outcome
}

fn log_bootstrap_failure(stage: &str, e: &SharedError) {
    error!(
        stage,
        code = e.code(),
        retryable = e.is_retryable(),
        error = %e,
        "database bootstrap failed"
    );
}

async fn run(indexer: &FeedIndexer, command: Commands) -> Result<()> {
    match command {
        Commands::Reindex { feeds, products } => {
            for feed_id in feeds {
                let report = indexer.reindex_feed(feed_id, &products).await?;
                println!("{}", serde_json::to_string(&report)?);
            }
        }
        Commands::ReindexAll => {
            let report = indexer.reindex_all().await?;
            for r in &report.succeeded {
                println!("{}", serde_json::to_string(r)?);
            }
            for (feed_id, e) in &report.failed {
                error!(feed_id, error = %e, code = e.code(), "feed reindex failed");
            }
            if !report.is_success() {
                bail!("{} feed(s) failed to reindex", report.failed.len());
            }
            info!(count = report.succeeded.len(), "All feeds reindexed");
        }
        Commands::Show { feed } => {
            for product_id in indexer.valid_products(feed).await? {
                println!("{}", product_id);
            }
        }
    }

    Ok(())
}

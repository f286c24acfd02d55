use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

use crate::error::Result;

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

/// 打开元数据库并执行迁移，文件不存在时自动创建
pub async fn init_db(filename: impl AsRef<Path>) -> Result<Database> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    if let Some(parent) = filename.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await?;

    info!("检查数据库迁移");
    sqlx::migrate!().run(&pool).await.map_err(sqlx::Error::from)?;

    Ok(pool)
}

use std::sync::Arc;

use config::DatabaseConfig;
use domain::ChatMessageRepository;
use thiserror::Error;
use tracing::warn;

use crate::{
    memory::InMemoryChatMessageRepository,
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgChatMessageRepository},
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub repository: Arc<dyn ChatMessageRepository>,
}

impl Infrastructure {
    /// 根据配置选择存储：有数据库地址时连接 PostgreSQL 并执行迁移，否则使用内存存储
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, InfrastructureError> {
        let Some(url) = config.url.as_deref() else {
            warn!("未配置 database.url，聊天消息仅保存在内存中");
            return Ok(Self::in_memory());
        };

        let pool = create_pg_pool(config, url).await?;
        MIGRATOR.run(&pool).await?;

        Ok(Self {
            repository: Arc::new(PgChatMessageRepository::new(pool)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            repository: Arc::new(InMemoryChatMessageRepository::new()),
        }
    }
}

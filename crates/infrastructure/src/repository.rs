use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::DatabaseConfig;
use domain::{
    ChatMessageRepository, MessageId, RepositoryError, RepositoryResult, StoredMessage, Timestamp,
    UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use tracing::info;

use crate::retry::{retry_async, RetryPolicy};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

#[derive(Debug, FromRow)]
struct ChatMessageRecord {
    id: i64,
    author_id: i64,
    content: String,
    created_at: DateTime<Utc>,
    author_name: Option<String>,
}

impl TryFrom<ChatMessageRecord> for StoredMessage {
    type Error = RepositoryError;

    fn try_from(value: ChatMessageRecord) -> Result<Self, Self::Error> {
        let author_id =
            UserId::parse(value.author_id).map_err(|err| invalid_data(err.to_string()))?;
        Ok(StoredMessage {
            id: MessageId(value.id),
            author_id,
            content: value.content,
            created_at: value.created_at,
            author_name: value.author_name,
        })
    }
}

/// 创建 PostgreSQL 连接池，启动时数据库可能尚未就绪，按配置重试
pub async fn create_pg_pool(config: &DatabaseConfig, url: &str) -> Result<PgPool, sqlx::Error> {
    let policy = RetryPolicy::new(config.connect_attempts, config.connect_backoff());
    let pool = retry_async(&policy, "connect_postgres", || {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
    })
    .await?;
    info!(max_connections = config.max_connections, "数据库连接池已建立");
    Ok(pool)
}

#[derive(Clone)]
pub struct PgChatMessageRepository {
    pool: PgPool,
}

impl PgChatMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatMessageRepository for PgChatMessageRepository {
    async fn create_message(
        &self,
        author_id: UserId,
        content: &str,
    ) -> RepositoryResult<StoredMessage> {
        let record = sqlx::query_as::<_, ChatMessageRecord>(
            r#"
            INSERT INTO chat_messages (author_id, content, created_at)
            VALUES ($1, $2, CURRENT_TIMESTAMP)
            RETURNING id, author_id, content, created_at, NULL::TEXT AS author_name
            "#,
        )
        .bind(author_id.value())
        .bind(content)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        StoredMessage::try_from(record)
    }

    async fn list_messages(&self) -> RepositoryResult<Vec<StoredMessage>> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            r#"
            SELECT m.id, m.author_id, m.content, m.created_at, u.username AS author_name
            FROM chat_messages m
            LEFT JOIN users u ON u.id = m.author_id
            ORDER BY m.created_at ASC, m.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(StoredMessage::try_from).collect()
    }

    async fn delete_older_than(&self, cutoff: Timestamp) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        Ok(result.rows_affected())
    }
}

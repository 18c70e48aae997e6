//! 进程内消息存储，未配置数据库时使用，同时用于集成测试

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use domain::{
    ChatMessageRepository, MessageId, RepositoryError, RepositoryResult, StoredMessage, Timestamp,
    UserId,
};
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    next_id: i64,
    messages: Vec<StoredMessage>,
    usernames: HashMap<UserId, String>,
}

#[derive(Default)]
pub struct InMemoryChatMessageRepository {
    inner: RwLock<Inner>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryChatMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记用户名，供历史查询联表使用
    pub async fn register_user(&self, user_id: UserId, username: impl Into<String>) {
        self.inner
            .write()
            .await
            .usernames
            .insert(user_id, username.into());
    }

    /// 打开后所有写入都返回存储错误
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 打开后历史查询返回存储错误
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 直接插入一条指定时间的记录
    pub async fn insert_at(
        &self,
        author_id: UserId,
        content: impl Into<String>,
        created_at: Timestamp,
    ) -> StoredMessage {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let stored = StoredMessage {
            id: MessageId(inner.next_id),
            author_id,
            content: content.into(),
            created_at,
            author_name: None,
        };
        inner.messages.push(stored.clone());
        stored
    }
}

#[async_trait]
impl ChatMessageRepository for InMemoryChatMessageRepository {
    async fn create_message(
        &self,
        author_id: UserId,
        content: &str,
    ) -> RepositoryResult<StoredMessage> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("in-memory store rejected write"));
        }
        Ok(self.insert_at(author_id, content, Utc::now()).await)
    }

    async fn list_messages(&self) -> RepositoryResult<Vec<StoredMessage>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::storage("in-memory store rejected read"));
        }
        let inner = self.inner.read().await;
        let mut messages: Vec<StoredMessage> = inner
            .messages
            .iter()
            .cloned()
            .map(|mut message| {
                message.author_name = inner.usernames.get(&message.author_id).cloned();
                message
            })
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)));
        Ok(messages)
    }

    async fn delete_older_than(&self, cutoff: Timestamp) -> RepositoryResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner.messages.retain(|message| message.created_at >= cutoff);
        Ok((before - inner.messages.len()) as u64)
    }
}

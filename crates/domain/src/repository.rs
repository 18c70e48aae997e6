use async_trait::async_trait;

use crate::errors::RepositoryResult;
use crate::message::StoredMessage;
use crate::value_objects::{Timestamp, UserId};

/// 聊天消息持久化网关
///
/// `create_message` 返回成功即代表消息已持久化，广播只能在此之后发生。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatMessageRepository: Send + Sync {
    /// 追加一条消息，返回带 id 与创建时间的规范记录
    async fn create_message(&self, author_id: UserId, content: &str)
        -> RepositoryResult<StoredMessage>;

    /// 按创建时间升序返回全部历史消息
    async fn list_messages(&self) -> RepositoryResult<Vec<StoredMessage>>;

    /// 删除早于 `cutoff` 的消息，返回删除条数
    async fn delete_older_than(&self, cutoff: Timestamp) -> RepositoryResult<u64>;
}

//! 聊天用例服务
//!
//! 负责把上行帧变成已持久化、可广播的消息：先持久化，成功后才交给广播中心；
//! 持久化失败只给发送者回一条错误消息。

use std::sync::Arc;

use domain::{ChatMessage, ChatMessageRepository, Identity, InboundFrame};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::connection::{ConnectionId, OutboundFrame};
use crate::error::ApplicationError;
use crate::hub::HubHandle;

/// 持久化失败时返回给发送者的提示
pub const PERSIST_FAILED_NOTICE: &str = "failed to save message";

/// 上行帧的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// 已持久化并提交广播
    Broadcast(ChatMessage),
    /// 持久化失败，错误消息已私发给发送者
    Rejected(ChatMessage),
    /// 帧被丢弃，连接保持
    Discarded(DiscardReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    Malformed,
    EmptyContent,
}

pub struct ChatServiceDependencies {
    pub repository: Arc<dyn ChatMessageRepository>,
    pub hub: HubHandle,
    pub clock: Arc<dyn Clock>,
}

pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn hub(&self) -> &HubHandle {
        &self.deps.hub
    }

    /// 处理某个连接收到的一条文本帧
    ///
    /// 只有广播中心不可用时才返回错误，调用方应据此结束连接。
    pub async fn handle_inbound(
        &self,
        connection_id: ConnectionId,
        author: &Identity,
        raw: &str,
    ) -> Result<InboundOutcome, ApplicationError> {
        let frame = match InboundFrame::decode(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(connection_id = %connection_id, error = %err, "无法解析客户端消息，已丢弃");
                return Ok(InboundOutcome::Discarded(DiscardReason::Malformed));
            }
        };

        if frame.is_empty() {
            debug!(connection_id = %connection_id, user_id = %author.user_id, "收到空消息，已忽略");
            return Ok(InboundOutcome::Discarded(DiscardReason::EmptyContent));
        }

        match self.persist(author, &frame.content).await {
            Ok(message) => {
                self.deps.hub.broadcast(encode(&message)?).await?;
                Ok(InboundOutcome::Broadcast(message))
            }
            Err(err) => {
                error!(
                    connection_id = %connection_id,
                    author_id = %author.user_id,
                    error = %err,
                    "保存聊天消息失败"
                );
                let notice = ChatMessage::error(author, PERSIST_FAILED_NOTICE, self.deps.clock.now());
                self.deps.hub.send_to(connection_id, encode(&notice)?).await?;
                Ok(InboundOutcome::Rejected(notice))
            }
        }
    }

    /// 通过 REST 发布消息：持久化后广播给所有在线连接
    pub async fn post_message(
        &self,
        author: &Identity,
        content: &str,
    ) -> Result<ChatMessage, ApplicationError> {
        if content.is_empty() {
            return Err(ApplicationError::EmptyContent);
        }
        let message = self.persist(author, content).await?;
        self.deps.hub.broadcast(encode(&message)?).await?;
        Ok(message)
    }

    /// 历史消息，按创建时间升序
    pub async fn history(&self) -> Result<Vec<ChatMessage>, ApplicationError> {
        let stored = self.deps.repository.list_messages().await?;
        Ok(stored.into_iter().map(ChatMessage::from_history).collect())
    }

    /// 当前在线用户，同一用户多个连接只出现一次
    pub async fn online_users(&self) -> Result<Vec<Identity>, ApplicationError> {
        let mut users: Vec<Identity> = self
            .deps
            .hub
            .snapshot()
            .await?
            .into_iter()
            .map(|live| live.identity)
            .collect();
        users.sort_by_key(|identity| identity.user_id);
        users.dedup_by_key(|identity| identity.user_id);
        Ok(users)
    }

    async fn persist(
        &self,
        author: &Identity,
        content: &str,
    ) -> Result<ChatMessage, ApplicationError> {
        let stored = self
            .deps
            .repository
            .create_message(author.user_id, content)
            .await?;
        info!(message_id = %stored.id, author_id = %author.user_id, "聊天消息已保存");
        Ok(ChatMessage::confirmed(stored, author))
    }
}

fn encode(message: &ChatMessage) -> Result<OutboundFrame, ApplicationError> {
    Ok(Arc::from(message.encode()?))
}

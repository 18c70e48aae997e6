//! 聊天消息模型
//!
//! `ChatMessage` 是双向线路格式，也是广播前的最终记录；
//! `InboundFrame` 只读取客户端真正需要提供的 `content` 字段。

use serde::{Deserialize, Serialize};

use crate::value_objects::{Identity, MessageId, Timestamp, UserId};

/// 消息类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Message,
    Error,
}

/// 线路上的聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub content: String,
    pub author_id: UserId,
    pub author_name: String,
    #[serde(with = "rfc3339_seconds")]
    pub created_at: Timestamp,
}

impl ChatMessage {
    /// 用持久化返回的规范字段补全一条待广播消息
    pub fn confirmed(stored: StoredMessage, author: &Identity) -> Self {
        Self {
            kind: MessageKind::Message,
            id: Some(stored.id),
            content: stored.content,
            author_id: author.user_id,
            author_name: author.display_name.clone(),
            created_at: stored.created_at,
        }
    }

    /// 历史记录条目，作者名取自持久化层（未知时为空）
    pub fn from_history(stored: StoredMessage) -> Self {
        Self {
            kind: MessageKind::Message,
            id: Some(stored.id),
            content: stored.content,
            author_id: stored.author_id,
            author_name: stored.author_name.unwrap_or_default(),
            created_at: stored.created_at,
        }
    }

    /// 只发给发送者本人的错误通知
    pub fn error(recipient: &Identity, content: impl Into<String>, at: Timestamp) -> Self {
        Self {
            kind: MessageKind::Error,
            id: None,
            content: content.into(),
            author_id: recipient.user_id,
            author_name: recipient.display_name.clone(),
            created_at: at,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// 客户端上行帧，其余字段一律忽略并由服务端覆盖
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub content: String,
}

impl InboundFrame {
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 只有完全为空的内容才算空消息，空白字符照常保存
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// 持久化网关返回的持久记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: MessageId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: Timestamp,
    pub author_name: Option<String>,
}

mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

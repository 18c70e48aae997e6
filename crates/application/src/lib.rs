//! 应用层实现。
//!
//! 这里提供实时聊天的核心协调逻辑：连接登记、广播中心、
//! 聊天用例服务以及历史消息清理，对持久化只依赖领域层定义的网关接口。

pub mod chat_service;
pub mod clock;
pub mod connection;
pub mod error;
pub mod hub;
pub mod retention;

pub use chat_service::{
    ChatService, ChatServiceDependencies, DiscardReason, InboundOutcome, PERSIST_FAILED_NOTICE,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use connection::{
    Connection, ConnectionId, ConnectionState, DeliveryError, LiveConnection, OutboundFrame,
    OutboundReceiver,
};
pub use error::ApplicationError;
pub use hub::{Hub, HubCommand, HubHandle};
pub use retention::RetentionSweeper;

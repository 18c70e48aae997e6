//! 基础设施层实现。
//!
//! 提供聊天消息持久化网关的 PostgreSQL 与内存两种适配器、连接池与迁移。

pub mod builder;
pub mod memory;
pub mod migrations;
pub mod repository;
pub mod retry;

pub use builder::{Infrastructure, InfrastructureError};
pub use memory::InMemoryChatMessageRepository;
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgChatMessageRepository};
pub use retry::{retry_async, RetryPolicy};

//! 论坛实时聊天核心领域模型
//!
//! 包含参与者身份、聊天消息线路格式以及持久化网关接口。

pub mod errors;
pub mod message;
pub mod repository;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use message::*;
pub use repository::*;
pub use value_objects::*;

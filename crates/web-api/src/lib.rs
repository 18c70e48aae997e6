//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 实时聊天入口以及历史、发帖、在线列表等 HTTP 接口，
//! 请求都委托给应用层的聊天服务与广播中心。

mod error;
mod identity;
pub mod pumps;
mod routes;
mod state;
mod websocket;

pub use error::{ApiError, ErrorBody};
pub use identity::{ChatIdentity, USER_ID_HEADER, USER_NAME_HEADER};
pub use pumps::{InboundExit, OutboundExit, PumpSettings};
pub use routes::router;
pub use state::{AppState, SessionSettings};
pub use websocket::run_session;

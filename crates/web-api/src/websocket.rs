use std::sync::Arc;

use application::{ChatService, Connection, ConnectionState};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use domain::Identity;
use futures_util::StreamExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::identity::ChatIdentity;
use crate::pumps::{run_inbound, run_outbound};
use crate::state::{AppState, SessionSettings};

/// 升级为 WebSocket；身份无效时提取器已返回 400，不会创建连接
pub async fn websocket_handler(
    ChatIdentity(identity): ChatIdentity,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let settings = state.session;
    ws.max_message_size(settings.max_message_bytes)
        .on_upgrade(move |socket| run_session(socket, state.chat_service, identity, settings))
}

/// 单连接会话：登记、启动两个泵、任一泵结束后注销并回收
pub async fn run_session(
    socket: WebSocket,
    chat: Arc<ChatService>,
    identity: Identity,
    settings: SessionSettings,
) {
    let hub = chat.hub().clone();
    let (connection, queue) = Connection::open(identity.clone(), settings.queue_capacity);
    let connection_id = connection.id();
    let mut state = ConnectionState::Connecting;

    if let Err(err) = hub.register(connection).await {
        warn!(connection_id = %connection_id, error = %err, "登记连接失败，关闭 socket");
        return;
    }
    state = state.advance();
    info!(connection_id = %connection_id, user = %identity, ?state, "WebSocket 连接已建立");

    let (sink, stream) = socket.split();
    let mut outbound = tokio::spawn(run_outbound(sink, queue, settings.pumps));
    let mut inbound = tokio::spawn({
        let chat = chat.clone();
        let identity = identity.clone();
        let pong_wait = settings.pumps.pong_wait;
        async move { run_inbound(stream, &chat, connection_id, &identity, pong_wait).await }
    });

    let outbound_finished = tokio::select! {
        exit = &mut inbound => {
            debug!(connection_id = %connection_id, ?exit, "入站泵结束");
            false
        }
        exit = &mut outbound => {
            debug!(connection_id = %connection_id, ?exit, "出站泵结束");
            true
        }
    };

    state = state.advance();
    if let Err(err) = hub.unregister(connection_id).await {
        debug!(connection_id = %connection_id, error = %err, "广播中心已停止，跳过注销");
    }
    inbound.abort();

    // 注销后队列被关闭，出站泵写完剩余消息并发送关闭帧
    if !outbound_finished {
        let drain_wait = settings.pumps.write_wait.saturating_mul(2);
        match timeout(drain_wait, &mut outbound).await {
            Ok(Ok(exit)) => debug!(connection_id = %connection_id, ?exit, "出站泵已退出"),
            Ok(Err(err)) => warn!(connection_id = %connection_id, error = %err, "出站泵异常退出"),
            Err(_) => {
                warn!(connection_id = %connection_id, "出站泵未能按时退出，强制终止");
                outbound.abort();
            }
        }
    }

    state = state.advance();
    info!(connection_id = %connection_id, user = %identity, ?state, "WebSocket 连接已关闭");
}

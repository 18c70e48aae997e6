//! 实时聊天广播中心
//!
//! 在线连接集合只由 `Hub::run` 这一个任务读写，其他组件通过 `HubHandle`
//! 发送命令与之交互，因此登记表不需要任何锁。
//!
//! 广播采用非阻塞入队：某个连接的队列满了只驱逐这个连接，
//! 其余连接照常收到消息。

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionId, DeliveryError, LiveConnection, OutboundFrame};
use crate::error::ApplicationError;

/// 广播中心命令
#[derive(Debug)]
pub enum HubCommand {
    Register(Connection),
    Unregister(ConnectionId),
    Broadcast(OutboundFrame),
    SendTo {
        connection_id: ConnectionId,
        frame: OutboundFrame,
    },
    Snapshot(oneshot::Sender<Vec<LiveConnection>>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalReason {
    Unregistered,
    SlowConsumer,
    PumpGone,
}

impl RemovalReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Unregistered => "unregistered",
            Self::SlowConsumer => "slow_consumer",
            Self::PumpGone => "pump_gone",
        }
    }
}

pub struct Hub {
    registry: HashMap<ConnectionId, Connection>,
    commands: mpsc::Receiver<HubCommand>,
    shutdown: CancellationToken,
}

impl Hub {
    pub fn new(command_capacity: usize, shutdown: CancellationToken) -> (Self, HubHandle) {
        let (sender, commands) = mpsc::channel(command_capacity.max(1));
        let hub = Self {
            registry: HashMap::new(),
            commands,
            shutdown,
        };
        (hub, HubHandle { commands: sender })
    }

    /// 创建并在后台启动广播中心
    pub fn spawn(
        command_capacity: usize,
        shutdown: CancellationToken,
    ) -> (HubHandle, tokio::task::JoinHandle<()>) {
        let (hub, handle) = Self::new(command_capacity, shutdown);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// 事件循环：一次处理完一条命令再取下一条
    pub async fn run(mut self) {
        info!("广播中心已启动");
        loop {
            let command = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };
            if !self.handle(command) {
                break;
            }
        }
        self.close_all();
        info!("广播中心已停止");
    }

    fn handle(&mut self, command: HubCommand) -> bool {
        match command {
            HubCommand::Register(connection) => self.register(connection),
            HubCommand::Unregister(connection_id) => {
                self.remove(connection_id, RemovalReason::Unregistered)
            }
            HubCommand::Broadcast(frame) => self.broadcast(frame),
            HubCommand::SendTo {
                connection_id,
                frame,
            } => self.send_to(connection_id, frame),
            HubCommand::Snapshot(reply) => {
                let live = self
                    .registry
                    .values()
                    .map(|connection| LiveConnection {
                        id: connection.id(),
                        identity: connection.identity().clone(),
                    })
                    .collect();
                // 调用方已放弃等待时无需处理
                let _ = reply.send(live);
            }
            HubCommand::Shutdown => return false,
        }
        true
    }

    fn register(&mut self, connection: Connection) {
        info!(
            connection_id = %connection.id(),
            user_id = %connection.identity().user_id,
            user_name = %connection.identity().display_name,
            total = self.registry.len() + 1,
            "客户端已注册"
        );
        self.registry.insert(connection.id(), connection);
    }

    fn remove(&mut self, connection_id: ConnectionId, reason: RemovalReason) {
        // 两个泵可能先后各发一次注销，第二次直接忽略
        let Some(connection) = self.registry.remove(&connection_id) else {
            debug!(connection_id = %connection_id, "连接已不在登记表中，忽略注销");
            return;
        };
        let identity = connection.identity().clone();
        drop(connection);

        match reason {
            RemovalReason::SlowConsumer => warn!(
                connection_id = %connection_id,
                user_id = %identity.user_id,
                reason = reason.as_str(),
                total = self.registry.len(),
                "出站队列已满，驱逐慢速客户端"
            ),
            _ => info!(
                connection_id = %connection_id,
                user_id = %identity.user_id,
                reason = reason.as_str(),
                total = self.registry.len(),
                "客户端已注销"
            ),
        }
    }

    fn broadcast(&mut self, frame: OutboundFrame) {
        let mut evicted = Vec::new();
        for (connection_id, connection) in &self.registry {
            match connection.try_deliver(frame.clone()) {
                Ok(()) => {}
                Err(DeliveryError::Full) => evicted.push((*connection_id, RemovalReason::SlowConsumer)),
                Err(DeliveryError::Closed) => evicted.push((*connection_id, RemovalReason::PumpGone)),
            }
        }
        debug!(
            recipients = self.registry.len() - evicted.len(),
            evicted = evicted.len(),
            "广播完成"
        );
        for (connection_id, reason) in evicted {
            self.remove(connection_id, reason);
        }
    }

    fn send_to(&mut self, connection_id: ConnectionId, frame: OutboundFrame) {
        let Some(connection) = self.registry.get(&connection_id) else {
            debug!(connection_id = %connection_id, "目标连接不在线，丢弃私信");
            return;
        };
        match connection.try_deliver(frame) {
            Ok(()) => {}
            Err(DeliveryError::Full) => self.remove(connection_id, RemovalReason::SlowConsumer),
            Err(DeliveryError::Closed) => self.remove(connection_id, RemovalReason::PumpGone),
        }
    }

    fn close_all(&mut self) {
        let remaining = self.registry.len();
        // drop 所有发送端，出站泵随后发送关闭帧
        self.registry.clear();
        if remaining > 0 {
            info!(remaining, "关闭全部在线连接");
        }
    }
}

/// 广播中心的消息传递入口，可自由克隆
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> Result<(), ApplicationError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ApplicationError::HubUnavailable)
    }

    pub async fn register(&self, connection: Connection) -> Result<(), ApplicationError> {
        self.send(HubCommand::Register(connection)).await
    }

    pub async fn unregister(&self, connection_id: ConnectionId) -> Result<(), ApplicationError> {
        self.send(HubCommand::Unregister(connection_id)).await
    }

    pub async fn broadcast(&self, frame: OutboundFrame) -> Result<(), ApplicationError> {
        self.send(HubCommand::Broadcast(frame)).await
    }

    pub async fn send_to(
        &self,
        connection_id: ConnectionId,
        frame: OutboundFrame,
    ) -> Result<(), ApplicationError> {
        self.send(HubCommand::SendTo {
            connection_id,
            frame,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<Vec<LiveConnection>, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.send(HubCommand::Snapshot(reply)).await?;
        response.await.map_err(|_| ApplicationError::HubUnavailable)
    }

    pub async fn shutdown(&self) -> Result<(), ApplicationError> {
        self.send(HubCommand::Shutdown).await
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

//! 单个实时连接在广播中心里的登记项
//!
//! 登记项持有出站队列唯一的发送端，出站泵持有接收端。
//! 登记项被移除（drop）即关闭队列，出站泵排空后发送关闭帧退出。

use std::fmt;
use std::sync::Arc;

use domain::Identity;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

/// 编码完成、不可变的出站帧，广播时在所有连接间共享
pub type OutboundFrame = Arc<str>;

pub type OutboundReceiver = mpsc::Receiver<OutboundFrame>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 连接生命周期：Connecting → Registered → Unregistering → Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Registered,
    Unregistering,
    Closed,
}

impl ConnectionState {
    /// 推进到下一个状态，Closed 是终态
    pub fn advance(self) -> Self {
        match self {
            Self::Connecting => Self::Registered,
            Self::Registered => Self::Unregistering,
            Self::Unregistering | Self::Closed => Self::Closed,
        }
    }

    pub fn is_live(self) -> bool {
        matches!(self, Self::Registered)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// 队列已满，消费端跟不上
    Full,
    /// 出站泵已退出
    Closed,
}

/// 广播中心登记的连接
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    outbound: mpsc::Sender<OutboundFrame>,
}

impl Connection {
    /// 创建连接及其有界出站队列
    pub fn open(identity: Identity, queue_capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, receiver) = mpsc::channel(queue_capacity.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            identity,
            outbound,
        };
        (connection, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// 非阻塞入队
    pub fn try_deliver(&self, frame: OutboundFrame) -> Result<(), DeliveryError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// 快照中的在线连接
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveConnection {
    pub id: ConnectionId,
    pub identity: Identity,
}

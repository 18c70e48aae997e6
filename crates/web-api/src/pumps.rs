//! 单连接的上下行泵
//!
//! 出站泵独占 socket 的写半部分，入站泵独占读半部分；两者都对 `Sink`/`Stream`
//! 泛型，测试时可以直接用内存通道代替真实 socket。

use std::fmt::Display;
use std::time::Duration;

use application::{ChatService, ConnectionId, InboundOutcome, OutboundFrame, OutboundReceiver};
use axum::body::Bytes;
use axum::extract::ws::Message;
use config::HubConfig;
use domain::Identity;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// 单连接的心跳与写超时参数
#[derive(Debug, Clone, Copy)]
pub struct PumpSettings {
    pub ping_interval: Duration,
    pub pong_wait: Duration,
    pub write_wait: Duration,
}

impl From<&HubConfig> for PumpSettings {
    fn from(config: &HubConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_wait: config.pong_wait(),
            write_wait: config.write_wait(),
        }
    }
}

/// 出站泵退出原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundExit {
    /// 广播中心关闭了队列，已发送关闭帧
    QueueClosed,
    WriteFailed(String),
    WriteTimeout,
}

/// 入站泵退出原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundExit {
    /// 客户端发送了关闭帧
    Closed,
    StreamEnded,
    ReadFailed(String),
    /// 在 pong_wait 内没有收到任何帧
    ReadTimeout,
    HubUnavailable,
}

/// 出站泵：把队列中的消息写到 socket，并按固定间隔发送 ping
///
/// ping 的节奏与数据流量无关，只读不写的客户端也能靠 pong 刷新读超时。
pub async fn run_outbound<S>(
    mut sink: S,
    mut queue: OutboundReceiver,
    settings: PumpSettings,
) -> OutboundExit
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let mut ticker = interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(frame) = frame else {
                    // 队列关闭：尽力发送关闭帧
                    if let Ok(Err(err)) = timeout(settings.write_wait, sink.send(Message::Close(None))).await {
                        debug!(error = %err, "发送关闭帧失败");
                    }
                    return OutboundExit::QueueClosed;
                };
                match timeout(settings.write_wait, write_batch(&mut sink, frame, &mut queue)).await {
                    Ok(Ok(written)) => debug!(written, "已写出消息批次"),
                    Ok(Err(err)) => return OutboundExit::WriteFailed(err.to_string()),
                    Err(_) => return OutboundExit::WriteTimeout,
                }
            }
            _ = ticker.tick() => {
                match timeout(settings.write_wait, sink.send(Message::Ping(Bytes::new()))).await {
                    Ok(Ok(())) => debug!("已发送心跳"),
                    Ok(Err(err)) => return OutboundExit::WriteFailed(err.to_string()),
                    Err(_) => return OutboundExit::WriteTimeout,
                }
            }
        }
    }
}

/// 写出一条消息以及队列中已就绪的所有消息，每条一个文本帧，最后统一 flush
async fn write_batch<S>(
    sink: &mut S,
    first: OutboundFrame,
    queue: &mut OutboundReceiver,
) -> Result<usize, S::Error>
where
    S: Sink<Message> + Unpin,
{
    sink.feed(text_frame(&first)).await?;
    let mut written = 1;
    while let Ok(next) = queue.try_recv() {
        sink.feed(text_frame(&next)).await?;
        written += 1;
    }
    sink.flush().await?;
    Ok(written)
}

fn text_frame(frame: &OutboundFrame) -> Message {
    Message::Text(frame.as_ref().into())
}

/// 入站泵：逐帧读取客户端消息并交给聊天服务
///
/// 每次成功读取（包括 pong）都会刷新读超时。
pub async fn run_inbound<S, E>(
    mut stream: S,
    chat: &ChatService,
    connection_id: ConnectionId,
    identity: &Identity,
    pong_wait: Duration,
) -> InboundExit
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        let message = match timeout(pong_wait, stream.next()).await {
            Err(_) => return InboundExit::ReadTimeout,
            Ok(None) => return InboundExit::StreamEnded,
            Ok(Some(Err(err))) => return InboundExit::ReadFailed(err.to_string()),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                match chat.handle_inbound(connection_id, identity, text.as_str()).await {
                    Ok(InboundOutcome::Broadcast(message)) => {
                        debug!(connection_id = %connection_id, message_id = ?message.id, "消息已提交广播");
                    }
                    Ok(InboundOutcome::Rejected(_)) => {
                        warn!(connection_id = %connection_id, user_id = %identity.user_id, "消息未保存，已通知发送者");
                    }
                    Ok(InboundOutcome::Discarded(reason)) => {
                        debug!(connection_id = %connection_id, ?reason, "丢弃客户端消息");
                    }
                    Err(err) => {
                        warn!(connection_id = %connection_id, error = %err, "广播中心不可用，结束连接");
                        return InboundExit::HubUnavailable;
                    }
                }
            }
            Message::Binary(_) => debug!(connection_id = %connection_id, "忽略二进制帧"),
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return InboundExit::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use application::{
        ChatServiceDependencies, Connection, Hub, HubHandle, SystemClock, PERSIST_FAILED_NOTICE,
    };
    use futures::channel::mpsc as fmpsc;
    use infrastructure::InMemoryChatMessageRepository;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn settings() -> PumpSettings {
        PumpSettings {
            ping_interval: Duration::from_secs(54),
            pong_wait: Duration::from_secs(60),
            write_wait: Duration::from_secs(10),
        }
    }

    fn text(message: &Message) -> Option<&str> {
        match message {
            Message::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    fn alice() -> Identity {
        Identity::new(1, "alice").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_writes_each_queued_frame_in_order() {
        let (queue_tx, queue_rx) = mpsc::channel::<OutboundFrame>(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        queue_tx.send(Arc::from("one")).await.unwrap();
        queue_tx.send(Arc::from("two")).await.unwrap();
        queue_tx.send(Arc::from("three")).await.unwrap();
        drop(queue_tx);

        let exit = run_outbound(sink, queue_rx, settings()).await;

        assert_eq!(exit, OutboundExit::QueueClosed);
        let mut frames = Vec::new();
        while let Some(message) = written.next().await {
            frames.push(message);
        }
        let texts: Vec<_> = frames.iter().filter_map(text).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(matches!(frames.last(), Some(Message::Close(None))));
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_pings_on_a_fixed_interval_during_steady_traffic() {
        let (queue_tx, queue_rx) = mpsc::channel::<OutboundFrame>(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let pump = tokio::spawn(run_outbound(sink, queue_rx, settings()));

        // 每 30 秒一条消息，持续 300 秒
        for i in 0..10 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            queue_tx.send(Arc::from(format!("tick-{i}"))).await.unwrap();
        }
        drop(queue_tx);
        assert_eq!(pump.await.unwrap(), OutboundExit::QueueClosed);

        let mut frames = Vec::new();
        while let Some(message) = written.next().await {
            frames.push(message);
        }
        let texts = frames.iter().filter(|m| matches!(m, Message::Text(_))).count();
        let pings = frames.iter().filter(|m| matches!(m, Message::Ping(_))).count();
        assert_eq!(texts, 10);
        // 54、108、162、216、270 秒各一次
        assert_eq!(pings, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_pings_when_idle() {
        let (queue_tx, queue_rx) = mpsc::channel::<OutboundFrame>(8);
        let (sink, mut written) = fmpsc::unbounded::<Message>();
        let pump = tokio::spawn(run_outbound(sink, queue_rx, settings()));

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert!(matches!(written.next().await, Some(Message::Ping(_))));

        drop(queue_tx);
        assert_eq!(pump.await.unwrap(), OutboundExit::QueueClosed);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_exits_when_sink_is_gone() {
        let (queue_tx, queue_rx) = mpsc::channel::<OutboundFrame>(8);
        let (sink, written) = fmpsc::unbounded::<Message>();
        drop(written);
        queue_tx.send(Arc::from("lost")).await.unwrap();

        let exit = run_outbound(sink, queue_rx, settings()).await;

        assert!(matches!(exit, OutboundExit::WriteFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_write_is_bounded_by_write_wait() {
        let (queue_tx, queue_rx) = mpsc::channel::<OutboundFrame>(8);
        // 容量为 0 的有界通道：第一帧之后对端不读就会一直阻塞
        let (sink, _written) = fmpsc::channel::<Message>(0);
        queue_tx.send(Arc::from("a")).await.unwrap();
        queue_tx.send(Arc::from("b")).await.unwrap();

        let exit = run_outbound(sink, queue_rx, settings()).await;

        assert_eq!(exit, OutboundExit::WriteTimeout);
    }

    async fn chat_with_hub(
        repository: Arc<InMemoryChatMessageRepository>,
    ) -> (ChatService, HubHandle) {
        let (hub, _task) = Hub::spawn(16, CancellationToken::new());
        let chat = ChatService::new(ChatServiceDependencies {
            repository,
            hub: hub.clone(),
            clock: Arc::new(SystemClock),
        });
        (chat, hub)
    }

    #[tokio::test]
    async fn inbound_persists_and_broadcasts_text_frames() {
        let repository = Arc::new(InMemoryChatMessageRepository::new());
        let (chat, hub) = chat_with_hub(repository.clone()).await;
        let (connection, mut queue) = Connection::open(alice(), 8);
        let connection_id = connection.id();
        hub.register(connection).await.unwrap();

        let frames: Vec<Result<Message, String>> = vec![
            Ok(Message::Text("not json".into())),
            Ok(Message::Text(r#"{"content":""}"#.into())),
            Ok(Message::Binary(Bytes::from_static(b"\x00"))),
            Ok(Message::Text(r#"{"content":"hello","author_id":99}"#.into())),
            Ok(Message::Close(None)),
        ];
        let exit = run_inbound(
            futures::stream::iter(frames),
            &chat,
            connection_id,
            &alice(),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(exit, InboundExit::Closed);
        assert_eq!(repository.len().await, 1);
        let frame = queue.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["author_id"], 1);
        assert_eq!(value["author_name"], "alice");
    }

    #[tokio::test]
    async fn inbound_persistence_failure_notifies_sender_only() {
        let repository = Arc::new(InMemoryChatMessageRepository::new());
        repository.set_fail_writes(true);
        let (chat, hub) = chat_with_hub(repository.clone()).await;
        let (sender, mut sender_queue) = Connection::open(alice(), 8);
        let (other, mut other_queue) = Connection::open(Identity::new(2, "bob").unwrap(), 8);
        let sender_id = sender.id();
        hub.register(sender).await.unwrap();
        hub.register(other).await.unwrap();

        let frames: Vec<Result<Message, String>> =
            vec![Ok(Message::Text(r#"{"content":"hi"}"#.into()))];
        let exit = run_inbound(
            futures::stream::iter(frames),
            &chat,
            sender_id,
            &alice(),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(exit, InboundExit::StreamEnded);
        let frame = sender_queue.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["content"], PERSIST_FAILED_NOTICE);
        // snapshot 往返一次，确保 hub 已处理完之前的命令
        hub.snapshot().await.unwrap();
        assert!(other_queue.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_times_out_without_traffic() {
        let repository = Arc::new(InMemoryChatMessageRepository::new());
        let (chat, _hub) = chat_with_hub(repository).await;

        let exit = run_inbound(
            futures::stream::pending::<Result<Message, String>>(),
            &chat,
            ConnectionId::new(),
            &alice(),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(exit, InboundExit::ReadTimeout);
    }

    #[tokio::test]
    async fn inbound_read_error_ends_the_pump() {
        let repository = Arc::new(InMemoryChatMessageRepository::new());
        let (chat, _hub) = chat_with_hub(repository).await;
        let frames: Vec<Result<Message, String>> = vec![Err("connection reset".to_string())];

        let exit = run_inbound(
            futures::stream::iter(frames),
            &chat,
            ConnectionId::new(),
            &alice(),
            Duration::from_secs(60),
        )
        .await;

        assert_eq!(exit, InboundExit::ReadFailed("connection reset".to_string()));
    }
}

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{ChatService, ChatServiceDependencies, Hub, HubHandle, SystemClock};
use config::HubConfig;
use domain::UserId;
use futures_util::StreamExt;
use infrastructure::InMemoryChatMessageRepository;
use tokio::{net::TcpListener, net::TcpStream, time::timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message as TungsteniteMessage},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState, SessionSettings, USER_ID_HEADER, USER_NAME_HEADER};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub repository: Arc<InMemoryChatMessageRepository>,
    pub hub: HubHandle,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(SessionSettings::from(&HubConfig::default())).await
    }

    pub async fn spawn_with(session: SessionSettings) -> Self {
        let repository = Arc::new(InMemoryChatMessageRepository::new());
        let shutdown = CancellationToken::new();
        let (hub, _task) = Hub::spawn(1024, shutdown.clone());

        let chat_service = ChatService::new(ChatServiceDependencies {
            repository: repository.clone(),
            hub: hub.clone(),
            clock: Arc::new(SystemClock),
        });
        let state = AppState::new(Arc::new(chat_service), session);
        let app = router(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { shutdown.cancelled().await })
                    .await
                    .ok();
            }
        });

        Self {
            addr,
            repository,
            hub,
            shutdown,
        }
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// 以指定身份建立 WebSocket 连接
    pub async fn connect(&self, user_id: i64, name: &str) -> Client {
        let mut request = self.ws_url().into_client_request().expect("request");
        let headers = request.headers_mut();
        headers.insert(USER_ID_HEADER, HeaderValue::from(user_id));
        headers.insert(USER_NAME_HEADER, HeaderValue::from_str(name).expect("header"));
        let (socket, _) = connect_async(request).await.expect("connect");
        socket
    }

    pub async fn register_user(&self, user_id: i64, name: &str) {
        self.repository
            .register_user(UserId::parse(user_id).expect("user id"), name)
            .await;
    }

    /// 等待广播中心中的在线连接数达到预期
    pub async fn wait_for_connections(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let live = self.hub.snapshot().await.expect("snapshot").len();
            if live == expected {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {expected} connections, found {live}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// 读取下一条文本帧并解析为 JSON，跳过心跳帧
pub async fn next_json(client: &mut Client) -> serde_json::Value {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("read frame");
        match message {
            TungsteniteMessage::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("json frame")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// 读取文本帧直到收到关闭帧；返回读到的文本以及是否收到关闭帧
pub async fn read_until_close(client: &mut Client) -> (Vec<String>, bool) {
    let mut texts = Vec::new();
    loop {
        let next = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for close");
        match next {
            Some(Ok(TungsteniteMessage::Text(text))) => texts.push(text.to_string()),
            Some(Ok(TungsteniteMessage::Close(_))) => return (texts, true),
            Some(Ok(_)) => continue,
            None | Some(Err(_)) => return (texts, false),
        }
    }
}

/// 断言在给定时间内没有收到文本帧
pub async fn assert_silent(client: &mut Client, wait: Duration) {
    match timeout(wait, client.next()).await {
        Err(_) => {}
        Ok(Some(Ok(TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_)))) => {}
        Ok(other) => panic!("expected no frame, got {other:?}"),
    }
}

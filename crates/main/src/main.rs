//! 主应用程序入口
//!
//! 加载配置，装配存储、广播中心与聊天服务，启动 Axum Web 服务。

use std::sync::Arc;

use application::{ChatService, ChatServiceDependencies, Clock, Hub, RetentionSweeper, SystemClock};
use config::AppConfig;
use infrastructure::Infrastructure;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, SessionSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG 优先，否则使用配置中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %config.sanitize(), "配置已加载");

    let infrastructure = Infrastructure::connect(&config.database).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let shutdown = CancellationToken::new();

    let (hub, hub_task) = Hub::spawn(config.hub.command_capacity, shutdown.clone());

    let chat_service = ChatService::new(ChatServiceDependencies {
        repository: infrastructure.repository.clone(),
        hub: hub.clone(),
        clock: clock.clone(),
    });

    let sweeper_task = if config.retention.enabled {
        let sweeper = RetentionSweeper::new(
            infrastructure.repository.clone(),
            clock,
            config.retention.max_age(),
            config.retention.sweep_interval(),
        );
        Some(tokio::spawn(sweeper.run(shutdown.clone())))
    } else {
        tracing::info!("历史消息清理已关闭");
        None
    };

    let state = AppState::new(Arc::new(chat_service), SessionSettings::from(&config.hub));
    let app = router(state);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!("聊天服务启动在 http://{}", address);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub, shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(err) = hub_task.await {
        tracing::warn!(error = %err, "广播中心任务异常退出");
    }
    if let Some(task) = sweeper_task {
        if let Err(err) = task.await {
            tracing::warn!(error = %err, "清理任务异常退出");
        }
    }
    tracing::info!("聊天服务已停止");

    Ok(())
}

/// 收到 Ctrl+C 后关闭广播中心，所有连接随之收到关闭帧
async fn shutdown_signal(hub: application::HubHandle, shutdown: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听退出信号");
        std::future::pending::<()>().await;
    }
    tracing::info!("收到退出信号，开始关闭");
    if let Err(err) = hub.shutdown().await {
        tracing::debug!(error = %err, "广播中心已停止");
    }
    shutdown.cancel();
}

//! 历史消息定期清理

use std::sync::Arc;
use std::time::Duration;

use domain::ChatMessageRepository;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::ApplicationError;

pub struct RetentionSweeper {
    repository: Arc<dyn ChatMessageRepository>,
    clock: Arc<dyn Clock>,
    max_age: Duration,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        repository: Arc<dyn ChatMessageRepository>,
        clock: Arc<dyn Clock>,
        max_age: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            clock,
            max_age,
            interval,
        }
    }

    /// 执行一次清理，返回删除条数
    pub async fn sweep_once(&self) -> Result<u64, ApplicationError> {
        let max_age = chrono::Duration::from_std(self.max_age)
            .map_err(|err| ApplicationError::infrastructure(err.to_string()))?;
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(max_age)
            .ok_or_else(|| ApplicationError::infrastructure("retention cutoff out of range"))?;
        Ok(self.repository.delete_older_than(cutoff).await?)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(max_age_secs = self.max_age.as_secs(), "历史消息清理任务已启动");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.sweep_once().await {
                    Ok(0) => debug!("没有需要清理的历史消息"),
                    Ok(deleted) => info!(deleted, "已清理过期聊天消息"),
                    Err(err) => warn!(error = %err, "清理过期聊天消息失败"),
                },
            }
        }
        info!("历史消息清理任务已停止");
    }
}

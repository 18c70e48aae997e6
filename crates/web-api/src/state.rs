use std::sync::Arc;

use application::ChatService;
use config::HubConfig;

use crate::pumps::PumpSettings;

/// 单连接会话参数
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub queue_capacity: usize,
    pub max_message_bytes: usize,
    pub pumps: PumpSettings,
}

impl From<&HubConfig> for SessionSettings {
    fn from(config: &HubConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            max_message_bytes: config.max_message_bytes,
            pumps: PumpSettings::from(config),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    pub session: SessionSettings,
}

impl AppState {
    pub fn new(chat_service: Arc<ChatService>, session: SessionSettings) -> Self {
        Self {
            chat_service,
            session,
        }
    }
}

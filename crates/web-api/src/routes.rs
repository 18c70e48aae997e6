use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use domain::{ChatMessage, Identity};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{error::ApiError, identity::ChatIdentity, state::AppState, websocket::websocket_handler};

#[derive(Debug, Deserialize)]
struct PostMessagePayload {
    #[serde(default)]
    content: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_handler))
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", get(chat_history).post(post_message))
        .route("/chat/online", get(online_users))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn chat_history(State(state): State<AppState>) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let messages = state.chat_service.history().await?;
    Ok(Json(messages))
}

async fn post_message(
    State(state): State<AppState>,
    ChatIdentity(identity): ChatIdentity,
    Json(payload): Json<PostMessagePayload>,
) -> Result<(StatusCode, Json<ChatMessage>), ApiError> {
    let message = state
        .chat_service
        .post_message(&identity, &payload.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn online_users(State(state): State<AppState>) -> Result<Json<Vec<Identity>>, ApiError> {
    let users = state.chat_service.online_users().await?;
    Ok(Json(users))
}

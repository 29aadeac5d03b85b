use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::Actor;
use crate::services::events::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read", post(mark_read))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/clear", post(clear_all))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub unread_only: bool,
}

/// GET /api/notifications
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(params): Query<InboxQuery>,
) -> AppResult<impl IntoResponse> {
    let recipient = actor.as_recipient();
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let notifications = state
        .notifications
        .list_notifications(recipient, params.unread_only, limit, offset)
        .await?;
    let unread = state.notifications.unread_count(recipient).await?;

    Ok(Json(json!({ "success": true, "notifications": notifications, "unread": unread })))
}

/// GET /api/notifications/unread-count
async fn unread_count(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<impl IntoResponse> {
    let unread = state.notifications.unread_count(actor.as_recipient()).await?;
    Ok(Json(json!({ "success": true, "unread": unread })))
}

#[derive(Debug, Deserialize)]
pub struct MarkReadRequest {
    pub id: i64,
}

/// POST /api/notifications/read
async fn mark_read(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<MarkReadRequest>,
) -> AppResult<impl IntoResponse> {
    if req.id <= 0 {
        return Err(AppError::validation("id must be > 0"));
    }
    // Чужое уведомление выглядит так же, как несуществующее
    if !state.notifications.mark_read(actor.as_recipient(), req.id).await? {
        return Err(AppError::not_found(format!("Notification {} not found", req.id)));
    }
    Ok(Json(json!({ "success": true })))
}

/// POST /api/notifications/read-all
async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<impl IntoResponse> {
    let updated = state.notifications.mark_all_read(actor.as_recipient()).await?;
    info!("📨 {} {} marked {} notification(s) read", actor.role, actor.account_id, updated);
    Ok(Json(json!({ "success": true, "updated": updated })))
}

/// POST /api/notifications/clear
async fn clear_all(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<impl IntoResponse> {
    let deleted = state.notifications.clear_notifications(actor.as_recipient()).await?;
    info!("📨 {} {} cleared {} notification(s)", actor.role, actor.account_id, deleted);
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

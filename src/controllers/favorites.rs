use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

use crate::controllers::events::EventIdRequest;
use crate::error::AppResult;
use crate::models::Actor;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/favorites", get(list_favorites))
        .route("/favorites/toggle", post(toggle_favorite))
}

/// POST /api/favorites/toggle
async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<EventIdRequest>,
) -> AppResult<impl IntoResponse> {
    let is_favorite = state.events.toggle_favorite(&actor, req.event_id).await?;
    Ok(Json(json!({ "success": true, "is_favorite": is_favorite })))
}

/// GET /api/favorites
async fn list_favorites(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> AppResult<impl IntoResponse> {
    let events = state.events.favorites(&actor).await?;
    Ok(Json(json!({ "success": true, "events": events })))
}

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::{check_credentials, issue_token};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/login", post(login))
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate()?;
    let account = check_credentials(&state, &req.email, &req.password).await?;
    let token = issue_token(&state.config.jwt, &account)?;
    info!("🔑 {} {} logged in", account.role, account.subject_id);
    Ok(Json(json!({ "success": true, "token": token, "role": account.role })))
}

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{Actor, ExportKind};
use crate::services::export::{parse_ids, ExportFormat};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/export", get(export))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: Option<String>,
    pub ids: Option<String>,
}

/// GET /api/export?type=events&format=csv&ids=1,2
async fn export(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(params): Query<ExportQuery>,
) -> AppResult<impl IntoResponse> {
    let kind = params
        .kind
        .parse::<ExportKind>()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let format = params
        .format
        .as_deref()
        .unwrap_or("csv")
        .parse::<ExportFormat>()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let ids = parse_ids(params.ids.as_deref())?;

    let file = state.exports.export(&actor, kind, format, ids).await?;
    let disposition = format!("attachment; filename=\"{}\"", file.file_name);

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.body,
    ))
}

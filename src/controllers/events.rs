use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::MaybeActor;
use crate::models::{Actor, EventDetails, EventStatus, Priority};
use crate::services::events::{CreateEvent, ListQuery};
use crate::services::uploads::{discard_event_image, save_event_image, ImageUpload};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route("/events/update", post(update_event))
        .route("/events/publish", post(publish_event))
        .route("/events/delete", post(delete_event))
        .route("/events/restore", post(restore_event))
        .route("/events/permanent-delete", post(purge_event))
        .route("/events/trash", get(list_trash))
        .route("/events/public", get(list_public))
        .route("/events/{id}", get(get_event))
}

// --- Разбор multipart-формы ---

/// Текстовые поля формы + необязательная картинка.
#[derive(Debug, Default)]
struct FormData {
    fields: HashMap<String, String>,
    image: Option<ImageUpload>,
}

impl FormData {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = FormData::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(format!("Invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "event_image" {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid event_image: {}", e)))?;
                // Пустое поле файла браузер шлёт, когда картинку не выбрали
                if let Some(file_name) = file_name.filter(|n| !n.is_empty() && !bytes.is_empty()) {
                    form.image = Some(ImageUpload { file_name, bytes: bytes.to_vec() });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Invalid field {}: {}", name, e)))?;
                form.fields.insert(name, value.trim().to_string());
            }
        }
        Ok(form)
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn id(&self, key: &str) -> AppResult<Option<i64>> {
        self.get(key)
            .map(|v| v.parse::<i64>().map_err(|_| AppError::validation(format!("{} must be a number", key))))
            .transpose()
    }
}

fn parse_date(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::validation("event_date must be YYYY-MM-DD"))
}

fn parse_time(raw: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| AppError::validation("event_time must be HH:MM"))
}

// datetime-local из браузера приходит без секунд и с 'T'
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

fn parse_datetime(raw: &str) -> AppResult<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| AppError::validation("scheduled_publish_time must be YYYY-MM-DDTHH:MM"))
}

/// Поля события после разбора, до проверки validator'ом.
#[derive(Debug, Validate)]
struct EventForm {
    #[validate(length(min = 1, max = 255, message = "event_name is required (max 255 chars)"))]
    event_name: String,
    #[validate(length(max = 5000, message = "description is too long"))]
    description: String,
    #[validate(length(min = 1, max = 100, message = "event_type is required"))]
    event_type: String,
    #[validate(length(max = 50, message = "phone_contact_1 is too long"))]
    phone_contact_1: String,
    #[validate(length(max = 100, message = "state is too long"))]
    state: String,
    #[validate(length(max = 500, message = "address is too long"))]
    address: String,
    #[validate(range(min = 0.0, message = "price must be >= 0"))]
    price: f64,
    event_date: NaiveDate,
    event_time: NaiveTime,
    priority: Priority,
    scheduled_publish_time: Option<NaiveDateTime>,
}

impl EventForm {
    fn parse(form: &FormData) -> AppResult<Self> {
        let event_date = parse_date(form.get("event_date").ok_or_else(|| AppError::validation("event_date is required"))?)?;
        let event_time = parse_time(form.get("event_time").ok_or_else(|| AppError::validation("event_time is required"))?)?;
        let price = match form.get("price") {
            Some(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|p| p.is_finite())
                .ok_or_else(|| AppError::validation("price must be a number"))?,
            None => 0.0,
        };
        let priority = form
            .get("priority")
            .unwrap_or_default()
            .parse::<Priority>()
            .map_err(|e| AppError::validation(e.to_string()))?;
        let scheduled_publish_time = form.get("scheduled_publish_time").map(parse_datetime).transpose()?;

        let parsed = EventForm {
            event_name: form.text("event_name"),
            description: form.text("description"),
            event_type: form.text("event_type"),
            phone_contact_1: form.text("phone_contact_1"),
            state: form.text("state"),
            address: form.text("address"),
            price,
            event_date,
            event_time,
            priority,
            scheduled_publish_time,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn into_details(self) -> EventDetails {
        EventDetails {
            event_name: self.event_name,
            description: self.description,
            event_type: self.event_type,
            event_date: self.event_date,
            event_time: self.event_time,
            phone_contact_1: self.phone_contact_1,
            state: self.state,
            address: self.address,
            price: self.price,
            priority: self.priority,
            scheduled_publish_time: self.scheduled_publish_time,
        }
    }
}

async fn store_image(state: &AppState, form: &FormData) -> AppResult<Option<String>> {
    match &form.image {
        Some(upload) => {
            let path = save_event_image(&state.config.uploads.dir, state.config.uploads.max_bytes, upload).await?;
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

/// Картинка остаётся на диске только если операция прошла.
async fn keep_image_on_success<T>(image_path: Option<&str>, result: AppResult<T>) -> AppResult<T> {
    if let (Err(_), Some(path)) = (&result, image_path) {
        discard_event_image(path).await;
    }
    result
}

// --- HTTP Handlers ---

/// POST /api/events (multipart)
async fn create_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = FormData::read(multipart).await?;
    let status = form
        .get("status")
        .unwrap_or("draft")
        .parse::<EventStatus>()
        .map_err(|e| AppError::validation(e.to_string()))?;
    let client_id = form.id("client_id")?;
    let details = EventForm::parse(&form)?.into_details();
    // Права и статус проверяем до записи файла
    state.events.authorize_create(&actor, client_id, status)?;
    let image_path = store_image(&state, &form).await?;

    let created = state
        .events
        .create(&actor, CreateEvent { client_id, status, details, image_path: image_path.clone() })
        .await;
    let event = keep_image_on_success(image_path.as_deref(), created).await?;

    Ok((StatusCode::CREATED, Json(json!({ "success": true, "event": event.summary() }))))
}

/// POST /api/events/update (multipart, event_id + поля)
async fn update_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let form = FormData::read(multipart).await?;
    let event_id = form.id("event_id")?.ok_or_else(|| AppError::validation("event_id is required"))?;
    let details = EventForm::parse(&form)?.into_details();
    state.events.authorize_update(&actor, event_id).await?;
    let image_path = store_image(&state, &form).await?;

    let updated = state.events.update(&actor, event_id, details, image_path.clone()).await;
    keep_image_on_success(image_path.as_deref(), updated).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct EventIdRequest {
    pub event_id: i64,
}

/// POST /api/events/publish
async fn publish_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<EventIdRequest>,
) -> AppResult<impl IntoResponse> {
    state.events.publish(&actor, req.event_id).await?;
    Ok(Json(json!({ "success": true, "message": "Event published" })))
}

/// POST /api/events/delete (в корзину)
async fn delete_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<EventIdRequest>,
) -> AppResult<impl IntoResponse> {
    state.events.soft_delete(&actor, req.event_id).await?;
    Ok(Json(json!({ "success": true, "message": "Event moved to trash" })))
}

/// POST /api/events/restore
async fn restore_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<EventIdRequest>,
) -> AppResult<impl IntoResponse> {
    state.events.restore(&actor, req.event_id).await?;
    Ok(Json(json!({ "success": true, "message": "Event restored" })))
}

/// POST /api/events/permanent-delete
async fn purge_event(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<EventIdRequest>,
) -> AppResult<impl IntoResponse> {
    state.events.purge(&actor, req.event_id).await?;
    Ok(Json(json!({ "success": true, "message": "Event permanently deleted" })))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    pub client_id: Option<i64>,
    pub status: Option<String>,
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl EventsQuery {
    fn into_list_query(self) -> AppResult<ListQuery> {
        let status = self
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<EventStatus>().map_err(|e| AppError::validation(e.to_string())))
            .transpose()?;
        Ok(ListQuery {
            client_id: self.client_id,
            status,
            search: self.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            limit: self.limit,
            offset: self.offset,
        })
    }
}

/// GET /api/events
async fn list_events(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(params): Query<EventsQuery>,
) -> AppResult<impl IntoResponse> {
    let (page, stats) = state.events.list(&actor, &params.into_list_query()?).await?;
    Ok(Json(json!({
        "success": true,
        "events": page.items,
        "total": page.total,
        "stats": stats,
    })))
}

/// GET /api/events/trash
async fn list_trash(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(params): Query<EventsQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state.events.list_trash(&actor, &params.into_list_query()?).await?;
    Ok(Json(json!({ "success": true, "events": page.items, "total": page.total })))
}

/// GET /api/events/public (без авторизации)
async fn list_public(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> AppResult<impl IntoResponse> {
    let page = state.events.list_public(&params.into_list_query()?).await?;
    Ok(Json(json!({ "success": true, "events": page.items, "total": page.total })))
}

/// GET /api/events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    MaybeActor(actor): MaybeActor,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let event = state.events.get(actor.as_ref(), id).await?;
    Ok(Json(json!({ "success": true, "event": event })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData {
            fields: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            image: None,
        }
    }

    #[test]
    fn parses_complete_form() {
        let parsed = EventForm::parse(&form(&[
            ("event_name", "Jazz Night"),
            ("event_type", "concert"),
            ("event_date", "2026-11-01"),
            ("event_time", "19:30"),
            ("price", "15.5"),
            ("priority", "high"),
            ("scheduled_publish_time", "2026-10-20T09:00"),
        ]))
        .unwrap();

        assert_eq!(parsed.event_time, NaiveTime::from_hms_opt(19, 30, 0).unwrap());
        assert_eq!(parsed.priority, Priority::High);
        assert_eq!(parsed.price, 15.5);
        assert!(parsed.scheduled_publish_time.is_some());
    }

    #[test]
    fn missing_name_is_a_validation_error() {
        let err = EventForm::parse(&form(&[
            ("event_type", "concert"),
            ("event_date", "2026-11-01"),
            ("event_time", "19:30"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn negative_price_and_bad_date_are_rejected() {
        let base = [("event_name", "x"), ("event_type", "y"), ("event_time", "10:00")];
        let mut bad_date = base.to_vec();
        bad_date.push(("event_date", "01/11/2026"));
        assert!(EventForm::parse(&form(&bad_date)).is_err());

        let mut negative = base.to_vec();
        negative.extend([("event_date", "2026-11-01"), ("price", "-1")]);
        assert!(EventForm::parse(&form(&negative)).is_err());
    }

    #[test]
    fn empty_status_filter_means_all() {
        let query = EventsQuery { status: Some(" ".into()), ..EventsQuery::default() };
        assert_eq!(query.into_list_query().unwrap().status, None);

        let query = EventsQuery { status: Some("archived".into()), ..EventsQuery::default() };
        assert!(query.into_list_query().is_err());
    }
}

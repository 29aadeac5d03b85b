#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use fake::{faker::company::en::CompanyName, Fake};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use eventra::{
    app,
    config::Config,
    middleware::issue_token,
    models::{Account, Role},
    store::MemoryStore,
    AppState,
};

pub const ADMIN_ID: i64 = 1;
pub const CLIENT_ID: i64 = 7;
pub const OTHER_CLIENT_ID: i64 = 8;
pub const USER_ID: i64 = 21;

pub const CLIENT_EMAIL: &str = "client@eventra.test";
pub const CLIENT_PASSWORD: &str = "client-pass";

const BOUNDARY: &str = "eventra-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub config: Config,
}

pub fn test_app() -> TestApp {
    let mut config = Config::default();
    config.notifications.admin_id = ADMIN_ID;
    config.uploads.dir = std::env::temp_dir()
        .join(format!("eventra-it-{}", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();

    let store = Arc::new(MemoryStore::new());
    let hash = |pw: &str| bcrypt::hash(pw, 4).unwrap();
    store.seed_account("admin@eventra.test", hash("admin-pass"), Role::Admin, ADMIN_ID);
    store.seed_account(CLIENT_EMAIL, hash(CLIENT_PASSWORD), Role::Client, CLIENT_ID);
    store.seed_account("user@eventra.test", hash("user-pass"), Role::User, USER_ID);

    let state = AppState::new(config.clone(), store.clone(), None);
    TestApp { router: app(state), store, config }
}

impl TestApp {
    pub fn token(&self, role: Role, subject_id: i64) -> String {
        let account = Account {
            id: subject_id,
            email: format!("{}-{}@eventra.test", role, subject_id),
            password_hash: String::new(),
            role,
            subject_id,
        };
        issue_token(&self.config.jwt, &account).unwrap()
    }

    pub fn admin(&self) -> String {
        self.token(Role::Admin, ADMIN_ID)
    }

    pub fn client(&self) -> String {
        self.token(Role::Client, CLIENT_ID)
    }

    pub fn user(&self) -> String {
        self.token(Role::User, USER_ID)
    }

    /// Файлы в `{uploads}/events`; пустой список, если папки ещё нет.
    pub fn uploaded_files(&self) -> Vec<String> {
        let folder = std::path::Path::new(&self.config.uploads.dir).join("events");
        std::fs::read_dir(folder)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
        (status, headers, body)
    }

    /// Создаёт событие от имени клиента и возвращает его id.
    pub async fn create_event(&self, token: &str, status: &str, extra: &[(&str, &str)]) -> i64 {
        let name: String = CompanyName().fake();
        let mut fields = vec![
            ("event_name", name.as_str()),
            ("description", "Live music and food"),
            ("event_type", "concert"),
            ("event_date", "2026-12-01"),
            ("event_time", "19:00"),
            ("state", "Almaty"),
            ("address", "Abay ave 1"),
            ("price", "25"),
            ("status", status),
        ];
        fields.extend_from_slice(extra);

        let (code, body) = self.send(multipart("/api/events", Some(token), &fields, None)).await;
        assert_eq!(code, StatusCode::CREATED, "create failed: {}", body);
        body["event"]["id"].as_i64().unwrap()
    }
}

fn with_auth(builder: axum::http::request::Builder, token: Option<&str>) -> axum::http::request::Builder {
    match token {
        Some(token) => builder.header(header::AUTHORIZATION, format!("Bearer {}", token)),
        None => builder,
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    with_auth(Request::builder().method("GET").uri(uri), token)
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    with_auth(Request::builder().method("POST").uri(uri), token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn basic_auth(email: &str, password: &str) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(format!("{}:{}", email, password)))
}

/// multipart/form-data с текстовыми полями и, по желанию, файлом `event_image`.
pub fn multipart(
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    image: Option<(&str, &[u8])>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"event_image\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    with_auth(Request::builder().method("POST").uri(uri), token)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

pub mod cache;
pub mod config;
pub mod controllers;
pub mod error;
pub mod lifecycle;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::CacheService;
use crate::models::Recipient;
use crate::services::{
    events::EventService, export::ExportService, notifier::Notifier, scheduler::ScheduleNotifier,
};
use crate::store::{AccountRepository, EventRepository, ExportRepository, NotificationRepository};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub events: EventService,
    pub exports: ExportService,
    pub notifications: Arc<dyn NotificationRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub scheduler: ScheduleNotifier,
}

impl AppState {
    /// Собирает сервисы поверх одного хранилища (Postgres или память).
    pub fn new<S>(config: config::Config, store: Arc<S>, cache: Option<CacheService>) -> Arc<Self>
    where
        S: EventRepository + NotificationRepository + ExportRepository + AccountRepository + 'static,
    {
        let admin = Recipient::admin(config.notifications.admin_id);
        let notifier = Notifier::new(store.clone(), config.notifications.max_attempts);
        let events = EventService::new(
            store.clone(),
            notifier.clone(),
            cache,
            admin,
            config.app.public_base_url.clone(),
        );
        let scheduler = ScheduleNotifier::new(store.clone(), notifier, admin);

        Arc::new(Self {
            events,
            exports: ExportService::new(store.clone()),
            notifications: store.clone(),
            accounts: store,
            scheduler,
            config,
        })
    }
}

/// Полный роутер приложения: `/api/*`, `/health` и общие слои.
pub fn app(state: Arc<AppState>) -> Router {
    // Лимит тела с запасом под поля формы поверх картинки
    let body_limit = state.config.uploads.max_bytes + 1024 * 1024;

    Router::new()
        .route("/", get(|| async { "Eventra API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn init_tracing(app: &config::AppConfig) {
    let registry = tracing_subscriber::registry().with(EnvFilter::new(&app.rust_log));
    if app.log_format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

pub mod auth;
pub mod events;
pub mod export;
pub mod favorites;
pub mod notifications;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(auth::routes())
        .merge(events::routes())
        .merge(favorites::routes())
        .merge(notifications::routes())
        .merge(export::routes())
}

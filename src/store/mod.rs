//! Слой доступа к данным.
//!
//! Операции описаны трейтами, чтобы сервисы работали и с Postgres (`PgStore`),
//! и с хранилищем в памяти (`MemoryStore`: dev-режим без БД и тесты).
//! Все изменения событий условные: проверка "в корзине / не в корзине"
//! повторяется в самом запросе, и проигранная гонка возвращает `false`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

use crate::models::{
    Account, Event, EventDetails, EventFilter, EventStats, EventStatus, ExportKind, ExportTable,
    NewEvent, NewNotification, Notification, Page, ParseEnumError, Recipient,
};

pub mod memory;
pub mod postgres;
#[cfg(test)]
pub mod testing;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(#[from] ParseEnumError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert_event(&self, new: NewEvent) -> StoreResult<Event>;

    /// Returns the event whether or not it is trashed.
    async fn find_event(&self, id: i64) -> StoreResult<Option<Event>>;

    async fn update_event(
        &self,
        id: i64,
        details: &EventDetails,
        image_path: Option<&str>,
    ) -> StoreResult<bool>;

    async fn set_status(&self, id: i64, status: EventStatus) -> StoreResult<bool>;

    async fn soft_delete_event(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Clears the deletion marker and forces `restored`.
    async fn restore_event(&self, id: i64) -> StoreResult<bool>;

    async fn purge_event(&self, id: i64) -> StoreResult<bool>;

    async fn list_active(&self, filter: &EventFilter) -> StoreResult<Page<Event>>;

    async fn list_trash(&self, filter: &EventFilter) -> StoreResult<Page<Event>>;

    async fn event_stats(&self, client_id: Option<i64>) -> StoreResult<EventStats>;

    /// Scheduled, not trashed, not yet notified, occurring within `[from, to]`.
    async fn due_for_lead_time(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Event>>;

    /// Scheduled, not trashed, not yet notified, occurring at or before `now`.
    async fn due_for_immediate(&self, now: NaiveDateTime) -> StoreResult<Vec<Event>>;

    /// Sets `schedule_notification_sent`; `false` if it was already set.
    async fn claim_schedule_notification(&self, id: i64) -> StoreResult<bool>;

    async fn toggle_favorite(&self, user_id: i64, event_id: i64) -> StoreResult<bool>;

    async fn list_favorites(&self, user_id: i64) -> StoreResult<Vec<Event>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert_notification(&self, new: &NewNotification) -> StoreResult<Notification>;

    async fn list_notifications(
        &self,
        recipient: Recipient,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>>;

    async fn unread_count(&self, recipient: Recipient) -> StoreResult<i64>;

    async fn mark_read(&self, recipient: Recipient, id: i64) -> StoreResult<bool>;

    async fn mark_all_read(&self, recipient: Recipient) -> StoreResult<u64>;

    async fn clear_notifications(&self, recipient: Recipient) -> StoreResult<u64>;
}

#[async_trait]
pub trait ExportRepository: Send + Sync {
    async fn export_table(&self, kind: ExportKind, ids: Option<&[i64]>) -> StoreResult<ExportTable>;
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
}

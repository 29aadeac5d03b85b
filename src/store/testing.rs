//! Репозитории для тестов сервисов.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};

use super::{NotificationRepository, StoreError, StoreResult};
use crate::models::{NewNotification, Notification, Recipient};

/// Хранилище уведомлений, которое всегда недоступно на запись.
#[derive(Default)]
pub struct DownNotifications {
    calls: AtomicU32,
}

impl DownNotifications {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationRepository for DownNotifications {
    async fn insert_notification(&self, _new: &NewNotification) -> StoreResult<Notification> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("notifications table is locked".into()))
    }

    async fn list_notifications(
        &self,
        _recipient: Recipient,
        _unread_only: bool,
        _limit: i64,
        _offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        Ok(Vec::new())
    }

    async fn unread_count(&self, _recipient: Recipient) -> StoreResult<i64> {
        Ok(0)
    }

    async fn mark_read(&self, _recipient: Recipient, _id: i64) -> StoreResult<bool> {
        Ok(false)
    }

    async fn mark_all_read(&self, _recipient: Recipient) -> StoreResult<u64> {
        Ok(0)
    }

    async fn clear_notifications(&self, _recipient: Recipient) -> StoreResult<u64> {
        Ok(0)
    }
}

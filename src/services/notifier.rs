//! notifier.rs
//!
//! Отправка уведомлений с ограниченным числом попыток.
//!
//! Уведомление - побочный эффект бизнес-операции, поэтому `send` никогда не
//! возвращает ошибку: результат описывается `DispatchOutcome`, а сбои пишутся в лог.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::models::NewNotification;
use crate::store::NotificationRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { id: i64, attempts: u32 },
    Failed { attempts: u32 },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

#[derive(Clone)]
pub struct Notifier {
    repo: Arc<dyn NotificationRepository>,
    max_attempts: u32,
}

impl Notifier {
    pub fn new(repo: Arc<dyn NotificationRepository>, max_attempts: u32) -> Self {
        Self { repo, max_attempts: max_attempts.max(1) }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Вставляет уведомление, повторяя попытку до `max_attempts` раз, без пауз.
    pub async fn send(&self, notification: NewNotification) -> DispatchOutcome {
        for attempt in 1..=self.max_attempts {
            match self.repo.insert_notification(&notification).await {
                Ok(stored) => {
                    debug!(
                        "📨 Notification {} ({}) delivered to {}:{} on attempt {}",
                        stored.id,
                        notification.notification_type,
                        notification.recipient.role,
                        notification.recipient.id,
                        attempt
                    );
                    return DispatchOutcome::Delivered { id: stored.id, attempts: attempt };
                }
                Err(e) => {
                    warn!(
                        "📨 Notification attempt {}/{} for {}:{} failed: {}",
                        attempt,
                        self.max_attempts,
                        notification.recipient.role,
                        notification.recipient.id,
                        e
                    );
                }
            }
        }

        error!(
            "📨 Giving up on {} notification for {}:{} after {} attempts",
            notification.notification_type,
            notification.recipient.role,
            notification.recipient.id,
            self.max_attempts
        );
        DispatchOutcome::Failed { attempts: self.max_attempts }
    }

    /// Sends the batch concurrently; outcomes come back in input order.
    pub async fn send_all(&self, notifications: Vec<NewNotification>) -> Vec<DispatchOutcome> {
        join_all(notifications.into_iter().map(|n| self.send(n))).await
    }
}

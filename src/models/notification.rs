use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use crate::models::{Actor, ParseEnumError, Role};

/// Теги уведомлений. На клиенте по ним выбирается иконка.
pub mod kinds {
    pub const EVENT_CREATED: &str = "event_created";
    pub const EVENT_UPDATED: &str = "event_updated";
    pub const EVENT_PUBLISHED: &str = "event_published";
    pub const EVENT_DELETED: &str = "event_deleted";
    pub const EVENT_RESTORED: &str = "event_restored";
    pub const EVENT_PURGED: &str = "event_purged";
    pub const SCHEDULE_REMINDER: &str = "schedule_reminder";
    pub const SCHEDULE_DUE: &str = "schedule_due";
}

/// Адресат уведомления: роль + идентификатор внутри роли.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub role: Role,
    pub id: i64,
}

impl Recipient {
    pub fn new(role: Role, id: i64) -> Self {
        Self { role, id }
    }

    pub fn client(id: i64) -> Self {
        Self::new(Role::Client, id)
    }

    pub fn admin(id: i64) -> Self {
        Self::new(Role::Admin, id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient: Recipient,
    pub sender: Option<Recipient>,
    pub message: String,
    pub notification_type: String,
    pub metadata: Option<Value>,
}

impl NewNotification {
    pub fn to(recipient: Recipient, notification_type: &str, message: impl Into<String>) -> Self {
        Self {
            recipient,
            sender: None,
            message: message.into(),
            notification_type: notification_type.to_string(),
            metadata: None,
        }
    }

    pub fn from_actor(mut self, actor: &Actor) -> Self {
        self.sender = Some(actor.as_recipient());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub recipient_role: String,
    pub recipient_id: i64,
    pub sender_role: Option<String>,
    pub sender_id: Option<i64>,
    pub message: String,
    pub notification_type: String,
    pub metadata: Option<Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub recipient_role: Role,
    pub recipient_id: i64,
    pub sender_role: Option<Role>,
    pub sender_id: Option<i64>,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub metadata: Option<Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = ParseEnumError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let sender_role = match row.sender_role {
            Some(role) => Some(role.parse()?),
            None => None,
        };
        Ok(Notification {
            id: row.id,
            recipient_role: row.recipient_role.parse()?,
            recipient_id: row.recipient_id,
            sender_role,
            sender_id: row.sender_id,
            message: row.message,
            notification_type: row.notification_type,
            metadata: row.metadata,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

impl Notification {
    pub fn recipient(&self) -> Recipient {
        Recipient::new(self.recipient_role, self.recipient_id)
    }
}

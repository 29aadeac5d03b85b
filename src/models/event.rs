use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::lifecycle::Lifecycle;
use crate::models::ParseEnumError;

/// Статус события. В базе хранится как текст в нижнем регистре.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Draft,
    Scheduled,
    Published,
    Restored,
}

impl EventStatus {
    pub const ALL: [EventStatus; 4] = [
        EventStatus::Draft,
        EventStatus::Scheduled,
        EventStatus::Published,
        EventStatus::Restored,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Draft => "draft",
            EventStatus::Scheduled => "scheduled",
            EventStatus::Published => "published",
            EventStatus::Restored => "restored",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(EventStatus::Draft),
            "scheduled" => Ok(EventStatus::Scheduled),
            "published" => Ok(EventStatus::Published),
            "restored" => Ok(EventStatus::Restored),
            other => Err(ParseEnumError::new("event status", other)),
        }
    }
}

/// Приоритет влияет только на порядок сортировки.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
        }
    }

    /// Sort key: lower goes first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" | "" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            other => Err(ParseEnumError::new("priority", other)),
        }
    }
}

// Строка из таблицы events как есть
#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub client_id: i64,
    pub event_name: String,
    pub description: String,
    pub event_type: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub phone_contact_1: String,
    pub state: String,
    pub address: String,
    pub price: f64,
    pub priority: String,
    pub status: String,
    pub scheduled_publish_time: Option<NaiveDateTime>,
    pub schedule_notification_sent: bool,
    pub image_path: Option<String>,
    pub tag: String,
    pub external_link: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub client_id: i64,
    pub event_name: String,
    pub description: String,
    pub event_type: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub phone_contact_1: String,
    pub state: String,
    pub address: String,
    pub price: f64,
    pub priority: Priority,
    pub status: EventStatus,
    pub scheduled_publish_time: Option<NaiveDateTime>,
    pub schedule_notification_sent: bool,
    pub image_path: Option<String>,
    pub tag: String,
    pub external_link: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = ParseEnumError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Event {
            status: row.status.parse()?,
            priority: row.priority.parse()?,
            id: row.id,
            client_id: row.client_id,
            event_name: row.event_name,
            description: row.description,
            event_type: row.event_type,
            event_date: row.event_date,
            event_time: row.event_time,
            phone_contact_1: row.phone_contact_1,
            state: row.state,
            address: row.address,
            price: row.price,
            scheduled_publish_time: row.scheduled_publish_time,
            schedule_notification_sent: row.schedule_notification_sent,
            image_path: row.image_path,
            tag: row.tag,
            external_link: row.external_link,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl Event {
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_parts(self.status, self.deleted_at)
    }

    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_public(&self) -> bool {
        self.deleted_at.is_none() && self.status == EventStatus::Published
    }

    /// Момент, когда событие реально происходит (без часового пояса).
    pub fn occurs_at(&self) -> NaiveDateTime {
        self.event_date.and_time(self.event_time)
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            event_name: self.event_name.clone(),
            tag: self.tag.clone(),
            external_link: self.external_link.clone(),
            status: self.status,
        }
    }
}

/// Поля, которые клиент может задать при создании и переписать при обновлении.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDetails {
    pub event_name: String,
    pub description: String,
    pub event_type: String,
    pub event_date: NaiveDate,
    pub event_time: NaiveTime,
    pub phone_contact_1: String,
    pub state: String,
    pub address: String,
    pub price: f64,
    pub priority: Priority,
    pub scheduled_publish_time: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub client_id: i64,
    pub details: EventDetails,
    pub status: EventStatus,
    pub image_path: Option<String>,
    pub tag: String,
    pub external_link: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    pub id: i64,
    pub event_name: String,
    pub tag: String,
    pub external_link: String,
    pub status: EventStatus,
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub client_id: Option<i64>,
    pub status: Option<EventStatus>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct EventStats {
    pub total: i64,
    pub draft: i64,
    pub scheduled: i64,
    pub published: i64,
    pub restored: i64,
    pub trashed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

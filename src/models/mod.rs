pub mod event;
pub mod export;
pub mod notification;
pub mod ticket;
pub mod user;

pub use event::{Event, EventDetails, EventFilter, EventRow, EventStats, EventStatus, EventSummary, NewEvent, Page, Priority};
pub use export::{ExportKind, ExportTable};
pub use notification::{kinds, NewNotification, Notification, NotificationRow, Recipient};
pub use ticket::Ticket;
pub use user::{Account, AccountRow, Actor, Client, Role, User};

/// Текстовое значение из БД или запроса не совпало ни с одним вариантом enum'а.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

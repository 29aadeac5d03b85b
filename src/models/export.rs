use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::models::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Events,
    Users,
    Tickets,
    Clients,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Events => "events",
            ExportKind::Users => "users",
            ExportKind::Tickets => "tickets",
            ExportKind::Clients => "clients",
        }
    }

    pub fn headers(&self) -> &'static [&'static str] {
        match self {
            ExportKind::Events => &[
                "id", "client_id", "event_name", "event_type", "event_date", "event_time",
                "state", "address", "price", "priority", "status", "tag", "deleted_at",
            ],
            ExportKind::Users => &["id", "name", "email", "created_at"],
            ExportKind::Tickets => &[
                "id", "event_id", "event_name", "user_id", "user_email", "quantity",
                "total_price", "status", "code", "created_at",
            ],
            ExportKind::Clients => &["id", "name", "email", "phone", "created_at"],
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "events" => Ok(ExportKind::Events),
            "users" => Ok(ExportKind::Users),
            "tickets" => Ok(ExportKind::Tickets),
            "clients" => Ok(ExportKind::Clients),
            other => Err(ParseEnumError::new("export type", other)),
        }
    }
}

/// Таблица для выгрузки: заголовки + строки уже в текстовом виде.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn new(kind: ExportKind) -> Self {
        Self {
            headers: kind.headers().iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Билет. Ядро только читает их (для выгрузки).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub quantity: i32,
    pub total_price: f64,
    pub status: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;
use tracing::info;

use super::{
    AccountRepository, EventRepository, ExportRepository, NotificationRepository, StoreError,
    StoreResult,
};
use crate::models::{
    Account, AccountRow, Event, EventDetails, EventFilter, EventRow, EventStats, EventStatus,
    ExportKind, ExportTable, NewEvent, NewNotification, Notification, NotificationRow, Page,
    Recipient,
};

const EVENT_COLUMNS: &str = r#"
    id, client_id, event_name, description, event_type, event_date, event_time,
    phone_contact_1, state, address, price, priority, status, scheduled_publish_time,
    schedule_notification_sent, image_path, tag, external_link, deleted_at, created_at, updated_at
"#;

// high -> normal -> low, затем по дате и времени проведения
const ACTIVE_ORDER: &str = r#"
    ORDER BY CASE priority WHEN 'high' THEN 0 WHEN 'normal' THEN 1 ELSE 2 END,
             event_date, event_time, id
"#;

const ACTIVE_FILTER: &str = r#"
    WHERE deleted_at IS NULL
      AND ($1::bigint IS NULL OR client_id = $1)
      AND ($2::text IS NULL OR status = $2)
      AND ($3::text IS NULL
           OR event_name ILIKE $3 ESCAPE '\' OR description ILIKE $3 ESCAPE '\'
           OR event_type ILIKE $3 ESCAPE '\' OR state ILIKE $3 ESCAPE '\')
"#;

const NOTIFICATION_COLUMNS: &str = r#"
    id, recipient_role, recipient_id, sender_role, sender_id, message,
    notification_type, metadata, is_read, created_at
"#;

/// Хранилище поверх пула Postgres.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, pool_size: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        info!("Database connected (pool size {})", pool_size);
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    fn into_events(rows: Vec<EventRow>) -> StoreResult<Vec<Event>> {
        rows.into_iter()
            .map(|row| Event::try_from(row).map_err(StoreError::from))
            .collect()
    }

    /// Подстрока для ILIKE: `%`, `_` и `\` из запроса ищутся буквально.
    fn search_pattern(search: &Option<String>) -> Option<String> {
        search
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(|q| {
                let escaped = q.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
                format!("%{}%", escaped)
            })
    }
}

#[async_trait]
impl EventRepository for PgStore {
    async fn insert_event(&self, new: NewEvent) -> StoreResult<Event> {
        let d = &new.details;
        let row = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            INSERT INTO events (
                client_id, event_name, description, event_type, event_date, event_time,
                phone_contact_1, state, address, price, priority, status,
                scheduled_publish_time, image_path, tag, external_link
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(new.client_id)
        .bind(&d.event_name)
        .bind(&d.description)
        .bind(&d.event_type)
        .bind(d.event_date)
        .bind(d.event_time)
        .bind(&d.phone_contact_1)
        .bind(&d.state)
        .bind(&d.address)
        .bind(d.price)
        .bind(d.priority.as_str())
        .bind(new.status.as_str())
        .bind(d.scheduled_publish_time)
        .bind(&new.image_path)
        .bind(&new.tag)
        .bind(&new.external_link)
        .fetch_one(&self.pool)
        .await?;

        Ok(Event::try_from(row)?)
    }

    async fn find_event(&self, id: i64) -> StoreResult<Option<Event>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Event::try_from).transpose().map_err(StoreError::from)
    }

    async fn update_event(
        &self,
        id: i64,
        details: &EventDetails,
        image_path: Option<&str>,
    ) -> StoreResult<bool> {
        // Картинку меняем только если загрузили новую
        let result = sqlx::query(
            r#"
            UPDATE events SET
                event_name = $2, description = $3, event_type = $4,
                event_date = $5, event_time = $6, phone_contact_1 = $7,
                state = $8, address = $9, price = $10, priority = $11,
                scheduled_publish_time = $12,
                image_path = COALESCE($13, image_path),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(&details.event_name)
        .bind(&details.description)
        .bind(&details.event_type)
        .bind(details.event_date)
        .bind(details.event_time)
        .bind(&details.phone_contact_1)
        .bind(&details.state)
        .bind(&details.address)
        .bind(details.price)
        .bind(details.priority.as_str())
        .bind(details.scheduled_publish_time)
        .bind(image_path)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(&self, id: i64, status: EventStatus) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE events SET status = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete_event(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE events SET deleted_at = $2, updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn restore_event(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET deleted_at = NULL, status = 'restored', updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NOT NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_event(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM events WHERE id = $1 AND deleted_at IS NOT NULL")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self, filter: &EventFilter) -> StoreResult<Page<Event>> {
        let status = filter.status.map(|s| s.as_str());
        let pattern = Self::search_pattern(&filter.search);

        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events {ACTIVE_FILTER} {ACTIVE_ORDER} LIMIT $4 OFFSET $5"
        ))
        .bind(filter.client_id)
        .bind(status)
        .bind(&pattern)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM events {ACTIVE_FILTER}"))
            .bind(filter.client_id)
            .bind(status)
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;

        Ok(Page { items: Self::into_events(rows)?, total })
    }

    async fn list_trash(&self, filter: &EventFilter) -> StoreResult<Page<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE deleted_at IS NOT NULL AND ($1::bigint IS NULL OR client_id = $1)
            ORDER BY deleted_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(filter.client_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM events WHERE deleted_at IS NOT NULL AND ($1::bigint IS NULL OR client_id = $1)",
        )
        .bind(filter.client_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Page { items: Self::into_events(rows)?, total })
    }

    async fn event_stats(&self, client_id: Option<i64>) -> StoreResult<EventStats> {
        let stats = sqlx::query_as::<_, EventStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE deleted_at IS NULL) AS total,
                COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'draft') AS draft,
                COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'scheduled') AS scheduled,
                COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'published') AS published,
                COUNT(*) FILTER (WHERE deleted_at IS NULL AND status = 'restored') AS restored,
                COUNT(*) FILTER (WHERE deleted_at IS NOT NULL) AS trashed
            FROM events
            WHERE ($1::bigint IS NULL OR client_id = $1)
            "#,
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn due_for_lead_time(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE status = 'scheduled'
              AND deleted_at IS NULL
              AND schedule_notification_sent = FALSE
              AND (event_date + event_time) BETWEEN $1 AND $2
            ORDER BY event_date, event_time, id
            "#
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Self::into_events(rows)
    }

    async fn due_for_immediate(&self, now: NaiveDateTime) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE status = 'scheduled'
              AND deleted_at IS NULL
              AND schedule_notification_sent = FALSE
              AND (event_date + event_time) <= $1
            ORDER BY event_date, event_time, id
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Self::into_events(rows)
    }

    async fn claim_schedule_notification(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE events SET schedule_notification_sent = TRUE
            WHERE id = $1 AND schedule_notification_sent = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn toggle_favorite(&self, user_id: i64, event_id: i64) -> StoreResult<bool> {
        let removed = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND event_id = $2")
            .bind(user_id)
            .bind(event_id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO favorites (user_id, event_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(event_id)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }

    async fn list_favorites(&self, user_id: i64) -> StoreResult<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            r#"
            SELECT {EVENT_COLUMNS} FROM events
            WHERE deleted_at IS NULL
              AND id IN (SELECT event_id FROM favorites WHERE user_id = $1)
            {ACTIVE_ORDER}
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Self::into_events(rows)
    }
}

#[async_trait]
impl NotificationRepository for PgStore {
    async fn insert_notification(&self, new: &NewNotification) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            INSERT INTO notifications
                (recipient_role, recipient_id, sender_role, sender_id, message, notification_type, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(new.recipient.role.as_str())
        .bind(new.recipient.id)
        .bind(new.sender.map(|s| s.role.as_str()))
        .bind(new.sender.map(|s| s.id))
        .bind(&new.message)
        .bind(&new.notification_type)
        .bind(&new.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(Notification::try_from(row)?)
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE recipient_role = $1 AND recipient_id = $2
              AND ($3 = FALSE OR is_read = FALSE)
            ORDER BY created_at DESC, id DESC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(recipient.role.as_str())
        .bind(recipient.id)
        .bind(unread_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Notification::try_from(row).map_err(StoreError::from))
            .collect()
    }

    async fn unread_count(&self, recipient: Recipient) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE recipient_role = $1 AND recipient_id = $2 AND is_read = FALSE",
        )
        .bind(recipient.role.as_str())
        .bind(recipient.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_read(&self, recipient: Recipient, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_role = $2 AND recipient_id = $3",
        )
        .bind(id)
        .bind(recipient.role.as_str())
        .bind(recipient.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_all_read(&self, recipient: Recipient) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_role = $1 AND recipient_id = $2 AND is_read = FALSE",
        )
        .bind(recipient.role.as_str())
        .bind(recipient.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear_notifications(&self, recipient: Recipient) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM notifications WHERE recipient_role = $1 AND recipient_id = $2")
                .bind(recipient.role.as_str())
                .bind(recipient.id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ExportRepository for PgStore {
    async fn export_table(&self, kind: ExportKind, ids: Option<&[i64]>) -> StoreResult<ExportTable> {
        // Каждую колонку приводим к тексту прямо в SQL, чтобы строки были однородными
        let sql = match kind {
            ExportKind::Events => {
                r#"
                SELECT id::text, client_id::text, event_name, event_type, event_date::text,
                       to_char(event_time, 'HH24:MI'), state, address, price::text, priority,
                       status, tag, COALESCE(to_char(deleted_at, 'YYYY-MM-DD HH24:MI:SS'), '')
                FROM events
                WHERE ($1::bigint[] IS NULL OR id = ANY($1))
                ORDER BY id
                "#
            }
            ExportKind::Users => {
                r#"
                SELECT id::text, name, email, to_char(created_at, 'YYYY-MM-DD HH24:MI:SS')
                FROM users
                WHERE ($1::bigint[] IS NULL OR id = ANY($1))
                ORDER BY id
                "#
            }
            ExportKind::Tickets => {
                r#"
                SELECT t.id::text, t.event_id::text, e.event_name, t.user_id::text, u.email,
                       t.quantity::text, t.total_price::text, t.status, t.code,
                       to_char(t.created_at, 'YYYY-MM-DD HH24:MI:SS')
                FROM tickets t
                JOIN events e ON e.id = t.event_id
                JOIN users u ON u.id = t.user_id
                WHERE ($1::bigint[] IS NULL OR t.id = ANY($1))
                ORDER BY t.id
                "#
            }
            ExportKind::Clients => {
                r#"
                SELECT id::text, name, email, COALESCE(phone, ''),
                       to_char(created_at, 'YYYY-MM-DD HH24:MI:SS')
                FROM clients
                WHERE ($1::bigint[] IS NULL OR id = ANY($1))
                ORDER BY id
                "#
            }
        };

        let rows = sqlx::query(sql)
            .bind(ids.map(|ids| ids.to_vec()))
            .fetch_all(&self.pool)
            .await?;

        let mut table = ExportTable::new(kind);
        for row in rows {
            let mut cells = Vec::with_capacity(table.headers.len());
            for idx in 0..table.headers.len() {
                let cell: Option<String> = row.try_get(idx)?;
                cells.push(cell.unwrap_or_default());
            }
            table.rows.push(cells);
        }

        Ok(table)
    }
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash, role, subject_id FROM auth_accounts WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose().map_err(StoreError::from)
    }
}

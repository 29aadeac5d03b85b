//! scheduler.rs
//!
//! Напоминания о запланированных событиях (крон, рассчитан на запуск раз в 5 минут).
//!
//! За один проход:
//! 1. Выбираем `scheduled` события, которые начнутся через 24 часа (окно ±1 минута).
//! 2. Выбираем `scheduled` события, время которых уже наступило.
//! 3. Для каждого сначала ставим флаг `schedule_notification_sent`, потом шлём
//!    уведомления клиенту и админу. Падение между этими шагами даёт пропуск, а не дубль.
//!
//! Статус событий крон не меняет: он только напоминает, публикует человек.

use chrono::{Duration, FixedOffset, NaiveDateTime, Offset, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::models::{kinds, Event, NewNotification, Recipient};
use crate::services::notifier::{DispatchOutcome, Notifier};
use crate::store::{EventRepository, StoreResult};

pub const LEAD_TIME_HOURS: i64 = 24;
pub const WINDOW_MINUTES: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderKind {
    LeadTime,
    Immediate,
}

impl ReminderKind {
    fn notification_type(&self) -> &'static str {
        match self {
            ReminderKind::LeadTime => kinds::SCHEDULE_REMINDER,
            ReminderKind::Immediate => kinds::SCHEDULE_DUE,
        }
    }

    fn client_message(&self, event: &Event) -> String {
        let when = event.occurs_at().format("%Y-%m-%d %H:%M");
        match self {
            ReminderKind::LeadTime => format!(
                "Reminder: your scheduled event '{}' takes place in 24 hours ({}). Publish it so attendees can find it.",
                event.event_name, when
            ),
            ReminderKind::Immediate => format!(
                "Your scheduled event '{}' is due now ({}) and is still not published.",
                event.event_name, when
            ),
        }
    }

    fn admin_message(&self, event: &Event) -> String {
        match self {
            ReminderKind::LeadTime => format!(
                "Scheduled event '{}' (client {}) starts in 24 hours.",
                event.event_name, event.client_id
            ),
            ReminderKind::Immediate => format!(
                "Scheduled event '{}' (client {}) has reached its date and is still scheduled.",
                event.event_name, event.client_id
            ),
        }
    }
}

/// Итоги одного прохода крона.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CronReport {
    pub lead_time: usize,
    pub immediate: usize,
    /// Rows another run claimed first.
    pub skipped: usize,
    pub undelivered: usize,
}

impl CronReport {
    pub fn processed(&self) -> usize {
        self.lead_time + self.immediate
    }
}

/// Границы окна "через 24 часа", включительно.
pub fn lead_time_window(now: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
    let target = now + Duration::hours(LEAD_TIME_HOURS);
    let window = Duration::minutes(WINDOW_MINUTES);
    (target - window, target + window)
}

/// Текущее локальное время событий: UTC со сдвигом из конфигурации.
pub fn local_now(utc_offset_minutes: i32) -> NaiveDateTime {
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    Utc::now().with_timezone(&offset).naive_local()
}

#[derive(Clone)]
pub struct ScheduleNotifier {
    events: Arc<dyn EventRepository>,
    notifier: Notifier,
    admin: Recipient,
}

impl ScheduleNotifier {
    pub fn new(events: Arc<dyn EventRepository>, notifier: Notifier, admin: Recipient) -> Self {
        Self { events, notifier, admin }
    }

    /// Один проход. Ошибка хранилища прерывает весь проход; уже отмеченные события не откатываются.
    pub async fn run_once(&self, now: NaiveDateTime) -> StoreResult<CronReport> {
        let (from, to) = lead_time_window(now);
        let lead = self.events.due_for_lead_time(from, to).await?;
        let due = self.events.due_for_immediate(now).await?;

        info!(
            "⏰ Scheduled notification run at {}: {} lead-time, {} immediate candidates",
            now,
            lead.len(),
            due.len()
        );

        let mut report = CronReport::default();
        let batch = lead
            .into_iter()
            .map(|e| (ReminderKind::LeadTime, e))
            .chain(due.into_iter().map(|e| (ReminderKind::Immediate, e)));

        for (kind, event) in batch {
            // Флаг ставим ДО отправки
            if !self.events.claim_schedule_notification(event.id).await? {
                warn!("⏰ Event {} already claimed by another run, skipping", event.id);
                report.skipped += 1;
                continue;
            }

            let outcomes = self.notify(kind, &event).await;
            let failed = outcomes.iter().filter(|o| !o.is_delivered()).count();
            if failed > 0 {
                error!(
                    "⏰ Event {} ({:?}): {} notification(s) undelivered; marker stays set",
                    event.id, kind, failed
                );
                report.undelivered += failed;
            }

            match kind {
                ReminderKind::LeadTime => report.lead_time += 1,
                ReminderKind::Immediate => report.immediate += 1,
            }
            info!(
                "⏰ Processed event {} '{}' ({:?}, occurs {})",
                event.id,
                event.event_name,
                kind,
                event.occurs_at()
            );
        }

        info!(
            "✅ Scheduled notification run done: {} processed ({} lead-time, {} immediate), {} skipped, {} undelivered",
            report.processed(),
            report.lead_time,
            report.immediate,
            report.skipped,
            report.undelivered
        );
        Ok(report)
    }

    async fn notify(&self, kind: ReminderKind, event: &Event) -> Vec<DispatchOutcome> {
        let metadata = serde_json::json!({
            "event_id": event.id,
            "event_name": event.event_name,
            "event_date": event.event_date,
            "event_time": event.event_time,
        });
        self.notifier
            .send_all(vec![
                NewNotification::to(
                    Recipient::client(event.client_id),
                    kind.notification_type(),
                    kind.client_message(event),
                )
                .with_metadata(metadata.clone()),
                NewNotification::to(self.admin, kind.notification_type(), kind.admin_message(event))
                    .with_metadata(metadata),
            ])
            .await
    }

    /// Фоновый запуск внутри сервера, как у очистки в основном бинарнике.
    pub fn spawn_interval(self, interval: std::time::Duration, utc_offset_minutes: i32) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once(local_now(utc_offset_minutes)).await {
                    error!("⏰ Scheduled notification run aborted: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventDetails, EventFilter, EventStats, EventStatus, NewEvent, Page, Priority};
    use crate::store::testing::DownNotifications;
    use crate::store::{MemoryStore, NotificationRepository};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate};
    use proptest::prelude::*;

    const ADMIN: i64 = 1;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn setup() -> (ScheduleNotifier, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Notifier::new(store.clone(), 3);
        (ScheduleNotifier::new(store.clone(), notifier, Recipient::admin(ADMIN)), store)
    }

    async fn insert(store: &MemoryStore, status: EventStatus, at: NaiveDateTime) -> Event {
        store
            .insert_event(NewEvent {
                client_id: 5,
                details: EventDetails {
                    event_name: format!("event at {}", at),
                    description: String::new(),
                    event_type: "meetup".into(),
                    event_date: at.date(),
                    event_time: at.time(),
                    phone_contact_1: String::new(),
                    state: String::new(),
                    address: String::new(),
                    price: 0.0,
                    priority: Priority::Normal,
                    scheduled_publish_time: None,
                },
                status,
                image_path: None,
                tag: format!("tag-{}", at),
                external_link: String::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn lead_time_window_boundaries() {
        let (cron, store) = setup();
        insert(&store, EventStatus::Scheduled, now() + Duration::hours(24)).await;
        insert(&store, EventStatus::Scheduled, now() + Duration::hours(24) + Duration::minutes(2)).await;
        insert(&store, EventStatus::Scheduled, now() + Duration::hours(24) - Duration::minutes(2)).await;

        let report = cron.run_once(now()).await.unwrap();

        assert_eq!(report.lead_time, 1);
        assert_eq!(report.immediate, 0);
    }

    #[tokio::test]
    async fn immediate_picks_any_past_event() {
        let (cron, store) = setup();
        insert(&store, EventStatus::Scheduled, now()).await;
        insert(&store, EventStatus::Scheduled, now() - Duration::days(400)).await;
        insert(&store, EventStatus::Draft, now() - Duration::days(1)).await;
        insert(&store, EventStatus::Published, now() - Duration::days(1)).await;

        let report = cron.run_once(now()).await.unwrap();

        assert_eq!(report.immediate, 2);
        assert_eq!(store.unread_count(Recipient::client(5)).await.unwrap(), 2);
        assert_eq!(store.unread_count(Recipient::admin(ADMIN)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn second_run_sends_nothing() {
        let (cron, store) = setup();
        let event = insert(&store, EventStatus::Scheduled, now() - Duration::minutes(5)).await;

        assert_eq!(cron.run_once(now()).await.unwrap().processed(), 1);
        assert_eq!(cron.run_once(now()).await.unwrap().processed(), 0);

        let stored = store.find_event(event.id).await.unwrap().unwrap();
        assert!(stored.schedule_notification_sent);
        assert_eq!(stored.status, EventStatus::Scheduled, "cron never publishes");
        assert_eq!(store.notifications_for(Recipient::client(5)).len(), 1);
    }

    #[tokio::test]
    async fn trashed_events_are_ignored() {
        let (cron, store) = setup();
        let event = insert(&store, EventStatus::Scheduled, now() - Duration::minutes(5)).await;
        store.soft_delete_event(event.id, Utc::now()).await.unwrap();

        assert_eq!(cron.run_once(now()).await.unwrap(), CronReport::default());
    }

    #[tokio::test]
    async fn lead_and_immediate_messages_differ() {
        let (cron, store) = setup();
        insert(&store, EventStatus::Scheduled, now() + Duration::hours(24)).await;
        insert(&store, EventStatus::Scheduled, now()).await;

        cron.run_once(now()).await.unwrap();

        let inbox = store.notifications_for(Recipient::client(5));
        let types: Vec<_> = inbox.iter().map(|n| n.notification_type.as_str()).collect();
        assert!(types.contains(&kinds::SCHEDULE_REMINDER));
        assert!(types.contains(&kinds::SCHEDULE_DUE));
        assert!(inbox.iter().all(|n| n.sender_role.is_none()));
    }

    #[tokio::test]
    async fn undelivered_reminders_keep_marker_and_run_continues() {
        let store = Arc::new(MemoryStore::new());
        let down = Arc::new(DownNotifications::default());
        let cron = ScheduleNotifier::new(store.clone(), Notifier::new(down.clone(), 2), Recipient::admin(ADMIN));
        let soon = insert(&store, EventStatus::Scheduled, now() + Duration::hours(24)).await;
        let due = insert(&store, EventStatus::Scheduled, now() - Duration::minutes(1)).await;

        let report = cron.run_once(now()).await.unwrap();

        assert_eq!(report.lead_time, 1);
        assert_eq!(report.immediate, 1);
        assert_eq!(report.undelivered, 4, "client and admin for both events");
        assert_eq!(down.calls(), 8);
        for id in [soon.id, due.id] {
            assert!(store.find_event(id).await.unwrap().unwrap().schedule_notification_sent);
        }
        assert_eq!(cron.run_once(now()).await.unwrap().processed(), 0);
    }

    /// Другой проход крона забирает событие между выборкой и отметкой.
    struct ClaimedElsewhere(Arc<MemoryStore>);

    #[async_trait]
    impl EventRepository for ClaimedElsewhere {
        async fn insert_event(&self, new: NewEvent) -> StoreResult<Event> {
            self.0.insert_event(new).await
        }
        async fn find_event(&self, id: i64) -> StoreResult<Option<Event>> {
            self.0.find_event(id).await
        }
        async fn update_event(&self, id: i64, details: &EventDetails, image_path: Option<&str>) -> StoreResult<bool> {
            self.0.update_event(id, details, image_path).await
        }
        async fn set_status(&self, id: i64, status: EventStatus) -> StoreResult<bool> {
            self.0.set_status(id, status).await
        }
        async fn soft_delete_event(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
            self.0.soft_delete_event(id, at).await
        }
        async fn restore_event(&self, id: i64) -> StoreResult<bool> {
            self.0.restore_event(id).await
        }
        async fn purge_event(&self, id: i64) -> StoreResult<bool> {
            self.0.purge_event(id).await
        }
        async fn list_active(&self, filter: &EventFilter) -> StoreResult<Page<Event>> {
            self.0.list_active(filter).await
        }
        async fn list_trash(&self, filter: &EventFilter) -> StoreResult<Page<Event>> {
            self.0.list_trash(filter).await
        }
        async fn event_stats(&self, client_id: Option<i64>) -> StoreResult<EventStats> {
            self.0.event_stats(client_id).await
        }
        async fn due_for_lead_time(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Event>> {
            self.0.due_for_lead_time(from, to).await
        }
        async fn due_for_immediate(&self, now: NaiveDateTime) -> StoreResult<Vec<Event>> {
            let rows = self.0.due_for_immediate(now).await?;
            for event in &rows {
                self.0.claim_schedule_notification(event.id).await?;
            }
            Ok(rows)
        }
        async fn claim_schedule_notification(&self, id: i64) -> StoreResult<bool> {
            self.0.claim_schedule_notification(id).await
        }
        async fn toggle_favorite(&self, user_id: i64, event_id: i64) -> StoreResult<bool> {
            self.0.toggle_favorite(user_id, event_id).await
        }
        async fn list_favorites(&self, user_id: i64) -> StoreResult<Vec<Event>> {
            self.0.list_favorites(user_id).await
        }
    }

    #[tokio::test]
    async fn rows_claimed_by_another_run_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let racing = Arc::new(ClaimedElsewhere(store.clone()));
        let cron = ScheduleNotifier::new(racing, Notifier::new(store.clone(), 3), Recipient::admin(ADMIN));
        insert(&store, EventStatus::Scheduled, now() - Duration::minutes(3)).await;
        insert(&store, EventStatus::Scheduled, now() + Duration::hours(24)).await;

        let report = cron.run_once(now()).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.immediate, 0);
        assert_eq!(report.lead_time, 1);
        // Уведомления только по событию, которое этот проход отметил сам
        assert_eq!(store.notifications_for(Recipient::client(5)).len(), 1);
        assert_eq!(store.notifications_for(Recipient::admin(ADMIN)).len(), 1);
    }

    proptest! {
        #[test]
        fn window_contains_exactly_the_minute_around_target(offset_secs in -300i64..300) {
            let (from, to) = lead_time_window(now());
            let candidate = now() + Duration::hours(LEAD_TIME_HOURS) + Duration::seconds(offset_secs);
            let inside = (from..=to).contains(&candidate);
            prop_assert_eq!(inside, offset_secs.abs() <= 60);
        }
    }
}

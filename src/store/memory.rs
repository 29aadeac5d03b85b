// Хранилище в памяти: dev-режим без DATABASE_URL и тесты.
// Семантика запросов повторяет PgStore (фильтры, сортировка, условные апдейты).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{
    AccountRepository, EventRepository, ExportRepository, NotificationRepository, StoreResult,
};
use crate::models::{
    Account, Client, Event, EventDetails, EventFilter, EventStats, EventStatus, ExportKind,
    ExportTable, NewEvent, NewNotification, Notification, Page, Recipient, Role, Ticket, User,
};

#[derive(Default)]
struct Inner {
    events: BTreeMap<i64, Event>,
    notifications: BTreeMap<i64, Notification>,
    favorites: BTreeSet<(i64, i64)>,
    accounts: HashMap<String, Account>,
    clients: BTreeMap<i64, Client>,
    users: BTreeMap<i64, User>,
    tickets: BTreeMap<i64, Ticket>,
    next_event_id: i64,
    next_notification_id: i64,
    next_account_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account(&self, email: &str, password_hash: String, role: Role, subject_id: i64) {
        let mut inner = self.inner.write();
        inner.next_account_id += 1;
        let account = Account {
            id: inner.next_account_id,
            email: email.to_string(),
            password_hash,
            role,
            subject_id,
        };
        inner.accounts.insert(email.to_ascii_lowercase(), account);
    }

    pub fn seed_client(&self, client: Client) {
        self.inner.write().clients.insert(client.id, client);
    }

    pub fn seed_user(&self, user: User) {
        self.inner.write().users.insert(user.id, user);
    }

    pub fn seed_ticket(&self, ticket: Ticket) {
        self.inner.write().tickets.insert(ticket.id, ticket);
    }

    /// Все уведомления, для проверок в тестах.
    pub fn notifications_for(&self, recipient: Recipient) -> Vec<Notification> {
        self.inner
            .read()
            .notifications
            .values()
            .filter(|n| n.recipient() == recipient)
            .cloned()
            .collect()
    }

    fn matches_search(event: &Event, pattern: &str) -> bool {
        [&event.event_name, &event.description, &event.event_type, &event.state]
            .iter()
            .any(|field| field.to_lowercase().contains(pattern))
    }

    fn sort_active(events: &mut [Event]) {
        events.sort_by(|a, b| {
            (a.priority.rank(), a.event_date, a.event_time, a.id)
                .cmp(&(b.priority.rank(), b.event_date, b.event_time, b.id))
        });
    }

    fn paginate<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
        items
            .iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect()
    }

    fn is_due(event: &Event) -> bool {
        event.status == EventStatus::Scheduled
            && event.deleted_at.is_none()
            && !event.schedule_notification_sent
    }

    fn stamp(dt: DateTime<Utc>) -> String {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn apply_details(event: &mut Event, details: &EventDetails) {
    event.event_name = details.event_name.clone();
    event.description = details.description.clone();
    event.event_type = details.event_type.clone();
    event.event_date = details.event_date;
    event.event_time = details.event_time;
    event.phone_contact_1 = details.phone_contact_1.clone();
    event.state = details.state.clone();
    event.address = details.address.clone();
    event.price = details.price;
    event.priority = details.priority;
    event.scheduled_publish_time = details.scheduled_publish_time;
}

fn selected(ids: Option<&[i64]>, id: i64) -> bool {
    ids.map_or(true, |ids| ids.contains(&id))
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, new: NewEvent) -> StoreResult<Event> {
        let mut inner = self.inner.write();
        inner.next_event_id += 1;
        let now = Utc::now();
        let d = new.details;
        let event = Event {
            id: inner.next_event_id,
            client_id: new.client_id,
            event_name: d.event_name,
            description: d.description,
            event_type: d.event_type,
            event_date: d.event_date,
            event_time: d.event_time,
            phone_contact_1: d.phone_contact_1,
            state: d.state,
            address: d.address,
            price: d.price,
            priority: d.priority,
            status: new.status,
            scheduled_publish_time: d.scheduled_publish_time,
            schedule_notification_sent: false,
            image_path: new.image_path,
            tag: new.tag,
            external_link: new.external_link,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_event(&self, id: i64) -> StoreResult<Option<Event>> {
        Ok(self.inner.read().events.get(&id).cloned())
    }

    async fn update_event(
        &self,
        id: i64,
        details: &EventDetails,
        image_path: Option<&str>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.events.get_mut(&id) {
            Some(event) if event.deleted_at.is_none() => {
                apply_details(event, details);
                if let Some(path) = image_path {
                    event.image_path = Some(path.to_string());
                }
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_status(&self, id: i64, status: EventStatus) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.events.get_mut(&id) {
            Some(event) if event.deleted_at.is_none() => {
                event.status = status;
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete_event(&self, id: i64, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.events.get_mut(&id) {
            Some(event) if event.deleted_at.is_none() => {
                event.deleted_at = Some(at);
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn restore_event(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.events.get_mut(&id) {
            Some(event) if event.deleted_at.is_some() => {
                event.deleted_at = None;
                event.status = EventStatus::Restored;
                event.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_event(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let trashed = inner.events.get(&id).is_some_and(|e| e.deleted_at.is_some());
        if !trashed {
            return Ok(false);
        }
        inner.events.remove(&id);
        // ON DELETE CASCADE
        inner.favorites.retain(|(_, event_id)| *event_id != id);
        inner.tickets.retain(|_, t| t.event_id != id);
        Ok(true)
    }

    async fn list_active(&self, filter: &EventFilter) -> StoreResult<Page<Event>> {
        let pattern = filter
            .search
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty());

        let mut events: Vec<Event> = self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.deleted_at.is_none())
            .filter(|e| filter.client_id.map_or(true, |id| e.client_id == id))
            .filter(|e| filter.status.map_or(true, |s| e.status == s))
            .filter(|e| pattern.as_deref().map_or(true, |p| Self::matches_search(e, p)))
            .cloned()
            .collect();

        Self::sort_active(&mut events);
        let total = events.len() as i64;
        Ok(Page { items: Self::paginate(&events, filter.limit, filter.offset), total })
    }

    async fn list_trash(&self, filter: &EventFilter) -> StoreResult<Page<Event>> {
        let mut events: Vec<Event> = self
            .inner
            .read()
            .events
            .values()
            .filter(|e| e.deleted_at.is_some())
            .filter(|e| filter.client_id.map_or(true, |id| e.client_id == id))
            .cloned()
            .collect();

        events.sort_by(|a, b| (b.deleted_at, b.id).cmp(&(a.deleted_at, a.id)));
        let total = events.len() as i64;
        Ok(Page { items: Self::paginate(&events, filter.limit, filter.offset), total })
    }

    async fn event_stats(&self, client_id: Option<i64>) -> StoreResult<EventStats> {
        let inner = self.inner.read();
        let mut stats = EventStats::default();
        for event in inner.events.values() {
            if client_id.is_some_and(|id| event.client_id != id) {
                continue;
            }
            if event.deleted_at.is_some() {
                stats.trashed += 1;
                continue;
            }
            stats.total += 1;
            match event.status {
                EventStatus::Draft => stats.draft += 1,
                EventStatus::Scheduled => stats.scheduled += 1,
                EventStatus::Published => stats.published += 1,
                EventStatus::Restored => stats.restored += 1,
            }
        }
        Ok(stats)
    }

    async fn due_for_lead_time(&self, from: NaiveDateTime, to: NaiveDateTime) -> StoreResult<Vec<Event>> {
        Ok(self
            .inner
            .read()
            .events
            .values()
            .filter(|e| Self::is_due(e))
            .filter(|e| (from..=to).contains(&e.occurs_at()))
            .cloned()
            .collect())
    }

    async fn due_for_immediate(&self, now: NaiveDateTime) -> StoreResult<Vec<Event>> {
        Ok(self
            .inner
            .read()
            .events
            .values()
            .filter(|e| Self::is_due(e))
            .filter(|e| e.occurs_at() <= now)
            .cloned()
            .collect())
    }

    async fn claim_schedule_notification(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.events.get_mut(&id) {
            Some(event) if !event.schedule_notification_sent => {
                event.schedule_notification_sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn toggle_favorite(&self, user_id: i64, event_id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        if inner.favorites.remove(&(user_id, event_id)) {
            return Ok(false);
        }
        inner.favorites.insert((user_id, event_id));
        Ok(true)
    }

    async fn list_favorites(&self, user_id: i64) -> StoreResult<Vec<Event>> {
        let inner = self.inner.read();
        let mut events: Vec<Event> = inner
            .favorites
            .iter()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, event_id)| inner.events.get(event_id))
            .filter(|e| e.deleted_at.is_none())
            .cloned()
            .collect();
        Self::sort_active(&mut events);
        Ok(events)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn insert_notification(&self, new: &NewNotification) -> StoreResult<Notification> {
        let mut inner = self.inner.write();
        inner.next_notification_id += 1;
        let notification = Notification {
            id: inner.next_notification_id,
            recipient_role: new.recipient.role,
            recipient_id: new.recipient.id,
            sender_role: new.sender.map(|s| s.role),
            sender_id: new.sender.map(|s| s.id),
            message: new.message.clone(),
            notification_type: new.notification_type.clone(),
            metadata: new.metadata.clone(),
            is_read: false,
            created_at: Utc::now(),
        };
        inner.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn list_notifications(
        &self,
        recipient: Recipient,
        unread_only: bool,
        limit: i64,
        offset: i64,
    ) -> StoreResult<Vec<Notification>> {
        // Новые сверху
        let items: Vec<Notification> = self
            .inner
            .read()
            .notifications
            .values()
            .rev()
            .filter(|n| n.recipient() == recipient)
            .filter(|n| !unread_only || !n.is_read)
            .cloned()
            .collect();
        Ok(Self::paginate(&items, limit, offset))
    }

    async fn unread_count(&self, recipient: Recipient) -> StoreResult<i64> {
        Ok(self
            .inner
            .read()
            .notifications
            .values()
            .filter(|n| n.recipient() == recipient && !n.is_read)
            .count() as i64)
    }

    async fn mark_read(&self, recipient: Recipient, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.notifications.get_mut(&id) {
            Some(n) if n.recipient() == recipient => {
                n.is_read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient: Recipient) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let mut updated = 0;
        for n in inner.notifications.values_mut() {
            if n.recipient() == recipient && !n.is_read {
                n.is_read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn clear_notifications(&self, recipient: Recipient) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.recipient() != recipient);
        Ok((before - inner.notifications.len()) as u64)
    }
}

#[async_trait]
impl ExportRepository for MemoryStore {
    async fn export_table(&self, kind: ExportKind, ids: Option<&[i64]>) -> StoreResult<ExportTable> {
        let inner = self.inner.read();
        let mut table = ExportTable::new(kind);

        match kind {
            ExportKind::Events => {
                for e in inner.events.values().filter(|e| selected(ids, e.id)) {
                    table.rows.push(vec![
                        e.id.to_string(),
                        e.client_id.to_string(),
                        e.event_name.clone(),
                        e.event_type.clone(),
                        e.event_date.to_string(),
                        e.event_time.format("%H:%M").to_string(),
                        e.state.clone(),
                        e.address.clone(),
                        e.price.to_string(),
                        e.priority.to_string(),
                        e.status.to_string(),
                        e.tag.clone(),
                        e.deleted_at.map(Self::stamp).unwrap_or_default(),
                    ]);
                }
            }
            ExportKind::Users => {
                for u in inner.users.values().filter(|u| selected(ids, u.id)) {
                    table.rows.push(vec![u.id.to_string(), u.name.clone(), u.email.clone(), String::new()]);
                }
            }
            ExportKind::Tickets => {
                for t in inner.tickets.values().filter(|t| selected(ids, t.id)) {
                    let event_name = inner
                        .events
                        .get(&t.event_id)
                        .map(|e| e.event_name.clone())
                        .unwrap_or_default();
                    let user_email = inner
                        .users
                        .get(&t.user_id)
                        .map(|u| u.email.clone())
                        .unwrap_or_default();
                    table.rows.push(vec![
                        t.id.to_string(),
                        t.event_id.to_string(),
                        event_name,
                        t.user_id.to_string(),
                        user_email,
                        t.quantity.to_string(),
                        t.total_price.to_string(),
                        t.status.clone(),
                        t.code.clone(),
                        Self::stamp(t.created_at),
                    ]);
                }
            }
            ExportKind::Clients => {
                for c in inner.clients.values().filter(|c| selected(ids, c.id)) {
                    table.rows.push(vec![
                        c.id.to_string(),
                        c.name.clone(),
                        c.email.clone(),
                        c.phone.clone().unwrap_or_default(),
                        String::new(),
                    ]);
                }
            }
        }

        Ok(table)
    }
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self.inner.read().accounts.get(&email.to_ascii_lowercase()).cloned())
    }
}

//! events.rs
//!
//! Сервис жизненного цикла событий: проверка прав через `Actor`, переход в
//! машине состояний (`lifecycle`), условная запись в хранилище и уведомления.
//!
//! Уведомления отправляются после успешной записи и никогда не прерывают операцию.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{events::public_listing_key, CacheService};
use crate::error::{AppError, AppResult};
use crate::lifecycle::{InitialStatus, Lifecycle, LifecycleError};
use crate::models::{
    kinds, Actor, Event, EventDetails, EventFilter, EventStats, EventStatus, NewEvent,
    NewNotification, Page, Recipient, Role,
};
use crate::services::notifier::Notifier;
use crate::services::tags;
use crate::store::EventRepository;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Входные данные для создания события.
#[derive(Debug, Clone)]
pub struct CreateEvent {
    /// Only honoured for admins creating on behalf of a client.
    pub client_id: Option<i64>,
    pub status: EventStatus,
    pub details: EventDetails,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub client_id: Option<i64>,
    pub status: Option<EventStatus>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    fn page(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Clone)]
pub struct EventService {
    events: Arc<dyn EventRepository>,
    notifier: Notifier,
    cache: Option<CacheService>,
    admin: Recipient,
    public_base_url: String,
}

impl EventService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        notifier: Notifier,
        cache: Option<CacheService>,
        admin: Recipient,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self { events, notifier, cache, admin, public_base_url: public_base_url.into() }
    }

    // --- Вспомогательные функции ---

    async fn load(&self, id: i64) -> AppResult<Event> {
        if id <= 0 {
            return Err(AppError::validation("event_id must be > 0"));
        }
        self.events
            .find_event(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Event {} not found", id)))
    }

    async fn load_managed(&self, actor: &Actor, id: i64) -> AppResult<Event> {
        let event = self.load(id).await?;
        if !actor.can_manage(&event) {
            return Err(AppError::forbidden("You do not have permission to manage this event"));
        }
        Ok(event)
    }

    /// Условная запись не сработала: кто-то успел изменить событие между чтением и записью.
    async fn lost_race(&self, id: i64, rejection: LifecycleError) -> AppError {
        match self.events.find_event(id).await {
            Ok(Some(_)) => AppError::Lifecycle(rejection),
            Ok(None) => AppError::not_found(format!("Event {} not found", id)),
            Err(e) => AppError::Store(e),
        }
    }

    async fn invalidate_public(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.invalidate_public_listings().await {
                warn!("Failed to invalidate public listing cache: {:?}", e);
            }
        }
    }

    fn owner(event: &Event) -> Recipient {
        Recipient::client(event.client_id)
    }

    fn event_metadata(event: &Event) -> serde_json::Value {
        json!({ "event_id": event.id, "event_name": event.event_name })
    }

    // --- Переходы жизненного цикла ---

    /// Кто создаёт событие и от чьего имени. Вызывается до записи картинки на диск.
    pub fn authorize_create(
        &self,
        actor: &Actor,
        client_id: Option<i64>,
        status: EventStatus,
    ) -> AppResult<(i64, InitialStatus)> {
        let client_id = match actor.role {
            Role::Client => actor.account_id,
            Role::Admin => {
                client_id.ok_or_else(|| AppError::validation("client_id is required when an admin creates an event"))?
            }
            Role::User => return Err(AppError::forbidden("Only clients can create events")),
        };
        Ok((client_id, Lifecycle::create(status)?))
    }

    /// Событие существует, принадлежит актору и не в корзине.
    pub async fn authorize_update(&self, actor: &Actor, id: i64) -> AppResult<()> {
        let event = self.load_managed(actor, id).await?;
        event.lifecycle().ensure_editable()?;
        Ok(())
    }

    pub async fn create(&self, actor: &Actor, input: CreateEvent) -> AppResult<Event> {
        let (client_id, initial) = self.authorize_create(actor, input.client_id, input.status)?;

        if input.status == EventStatus::Scheduled && input.details.scheduled_publish_time.is_none() {
            warn!(
                "Client {} scheduled event '{}' without scheduled_publish_time",
                client_id, input.details.event_name
            );
        }

        let tag = tags::generate_tag(client_id, &input.details.event_name, Utc::now());
        let external_link = tags::external_link(&self.public_base_url, &tag);
        let event = self
            .events
            .insert_event(NewEvent {
                client_id,
                details: input.details,
                status: initial.status(),
                image_path: input.image_path,
                tag,
                external_link,
            })
            .await?;

        info!("🎫 Event {} '{}' created by {} {} as {}", event.id, event.event_name, actor.role, actor.account_id, event.status);

        let (kind, owner_message) = match initial {
            InitialStatus::Draft => (
                kinds::EVENT_CREATED,
                format!("Your event '{}' was saved as a draft.", event.event_name),
            ),
            InitialStatus::Scheduled => (
                kinds::EVENT_CREATED,
                match event.scheduled_publish_time {
                    Some(at) => format!(
                        "Your event '{}' is scheduled for publishing on {}.",
                        event.event_name,
                        at.format("%Y-%m-%d %H:%M")
                    ),
                    None => format!("Your event '{}' is scheduled for publishing.", event.event_name),
                },
            ),
            InitialStatus::Published => (
                kinds::EVENT_PUBLISHED,
                format!("Your event '{}' is now live.", event.event_name),
            ),
        };

        self.notifier
            .send_all(vec![
                NewNotification::to(Self::owner(&event), kind, owner_message)
                    .from_actor(actor)
                    .with_metadata(Self::event_metadata(&event)),
                NewNotification::to(
                    self.admin,
                    kinds::EVENT_CREATED,
                    format!(
                        "Client {} created event '{}' ({}).",
                        event.client_id, event.event_name, event.status
                    ),
                )
                .from_actor(actor)
                .with_metadata(Self::event_metadata(&event)),
            ])
            .await;

        if event.is_public() {
            self.invalidate_public().await;
        }
        Ok(event)
    }

    /// Обновление разрешено в любом статусе, кроме корзины.
    pub async fn update(
        &self,
        actor: &Actor,
        id: i64,
        details: EventDetails,
        image_path: Option<String>,
    ) -> AppResult<Event> {
        let event = self.load_managed(actor, id).await?;
        event.lifecycle().ensure_editable()?;

        if !self.events.update_event(id, &details, image_path.as_deref()).await? {
            return Err(self.lost_race(id, LifecycleError::Trashed).await);
        }
        info!("🎫 Event {} updated by {} {}", id, actor.role, actor.account_id);

        self.notifier
            .send(
                NewNotification::to(
                    Self::owner(&event),
                    kinds::EVENT_UPDATED,
                    format!("Your event '{}' was updated.", details.event_name),
                )
                .from_actor(actor)
                .with_metadata(json!({ "event_id": id, "event_name": details.event_name })),
            )
            .await;

        self.invalidate_public().await;
        self.load(id).await
    }

    pub async fn publish(&self, actor: &Actor, id: i64) -> AppResult<()> {
        let event = self.load_managed(actor, id).await?;
        let next = event.lifecycle().publish()?;

        if !self.events.set_status(id, next.status()).await? {
            return Err(self.lost_race(id, LifecycleError::Trashed).await);
        }
        info!("🎫 Event {} published by {} {}", id, actor.role, actor.account_id);

        let mut outgoing = vec![NewNotification::to(
            Self::owner(&event),
            kinds::EVENT_PUBLISHED,
            format!("Your event '{}' is live.", event.event_name),
        )
        .from_actor(actor)
        .with_metadata(Self::event_metadata(&event))];
        if actor.is_owner_of(&event) {
            outgoing.push(
                NewNotification::to(
                    self.admin,
                    kinds::EVENT_PUBLISHED,
                    format!("Client {} published event '{}'.", event.client_id, event.event_name),
                )
                .from_actor(actor)
                .with_metadata(Self::event_metadata(&event)),
            );
        }
        self.notifier.send_all(outgoing).await;

        self.invalidate_public().await;
        Ok(())
    }

    pub async fn soft_delete(&self, actor: &Actor, id: i64) -> AppResult<()> {
        let event = self.load_managed(actor, id).await?;
        let now = Utc::now();
        event.lifecycle().soft_delete(now)?;

        if !self.events.soft_delete_event(id, now).await? {
            return Err(self.lost_race(id, LifecycleError::AlreadyTrashed).await);
        }
        info!("🗑️ Event {} moved to trash by {} {}", id, actor.role, actor.account_id);

        if actor.is_owner_of(&event) {
            self.notifier
                .send(
                    NewNotification::to(
                        self.admin,
                        kinds::EVENT_DELETED,
                        format!("Client {} moved event '{}' to trash.", event.client_id, event.event_name),
                    )
                    .from_actor(actor)
                    .with_metadata(Self::event_metadata(&event)),
                )
                .await;
        }

        self.invalidate_public().await;
        Ok(())
    }

    pub async fn restore(&self, actor: &Actor, id: i64) -> AppResult<()> {
        let event = self.load_managed(actor, id).await?;
        event.lifecycle().restore()?;

        if !self.events.restore_event(id).await? {
            return Err(self.lost_race(id, LifecycleError::NotTrashed).await);
        }
        info!("♻️ Event {} restored by {} {}", id, actor.role, actor.account_id);

        if actor.is_owner_of(&event) {
            self.notifier
                .send(
                    NewNotification::to(
                        self.admin,
                        kinds::EVENT_RESTORED,
                        format!("Client {} restored event '{}'.", event.client_id, event.event_name),
                    )
                    .from_actor(actor)
                    .with_metadata(Self::event_metadata(&event)),
                )
                .await;
        }
        Ok(())
    }

    pub async fn purge(&self, actor: &Actor, id: i64) -> AppResult<()> {
        let event = self.load_managed(actor, id).await?;
        event.lifecycle().ensure_purgeable()?;

        if !self.events.purge_event(id).await? {
            return Err(self.lost_race(id, LifecycleError::NotInTrash).await);
        }
        info!("🔥 Event {} permanently deleted by {} {}", id, actor.role, actor.account_id);

        if actor.is_owner_of(&event) {
            self.notifier
                .send(
                    NewNotification::to(
                        self.admin,
                        kinds::EVENT_PURGED,
                        format!("Client {} permanently deleted event '{}'.", event.client_id, event.event_name),
                    )
                    .from_actor(actor)
                    .with_metadata(Self::event_metadata(&event)),
                )
                .await;
        }
        Ok(())
    }

    // --- Чтение ---

    /// Владелец и админ видят событие в любом состоянии, остальные только опубликованное.
    pub async fn get(&self, actor: Option<&Actor>, id: i64) -> AppResult<Event> {
        let event = self.load(id).await?;
        let visible = event.is_public() || actor.is_some_and(|a| a.can_manage(&event));
        if visible {
            Ok(event)
        } else {
            Err(AppError::not_found(format!("Event {} not found", id)))
        }
    }

    fn scope(actor: &Actor, requested: Option<i64>) -> AppResult<Option<i64>> {
        match actor.role {
            Role::Admin => Ok(requested),
            Role::Client => Ok(Some(actor.account_id)),
            Role::User => Err(AppError::forbidden("Only clients and admins can manage events")),
        }
    }

    pub async fn list(&self, actor: &Actor, query: &ListQuery) -> AppResult<(Page<Event>, EventStats)> {
        let client_id = Self::scope(actor, query.client_id)?;
        let (limit, offset) = query.page();
        let filter = EventFilter {
            client_id,
            status: query.status,
            search: query.search.clone(),
            limit,
            offset,
        };
        let page = self.events.list_active(&filter).await?;
        let stats = self.events.event_stats(client_id).await?;
        Ok((page, stats))
    }

    pub async fn list_trash(&self, actor: &Actor, query: &ListQuery) -> AppResult<Page<Event>> {
        let client_id = Self::scope(actor, query.client_id)?;
        let (limit, offset) = query.page();
        let filter = EventFilter { client_id, limit, offset, ..EventFilter::default() };
        Ok(self.events.list_trash(&filter).await?)
    }

    /// Публичная выдача: только опубликованные и не удалённые. Кешируется в Redis.
    pub async fn list_public(&self, query: &ListQuery) -> AppResult<Page<Event>> {
        let (limit, offset) = query.page();
        let key = public_listing_key(query.search.as_deref(), limit, offset);

        if let Some(cache) = &self.cache {
            if let Ok(Some(cached)) = cache.get_public_listing(&key).await {
                match serde_json::from_str::<Page<Event>>(&cached) {
                    Ok(page) => return Ok(page),
                    Err(e) => warn!("Discarding unreadable cached listing {}: {}", key, e),
                }
            }
        }

        let filter = EventFilter {
            client_id: None,
            status: Some(EventStatus::Published),
            search: query.search.clone(),
            limit,
            offset,
        };
        let page = self.events.list_active(&filter).await?;

        if let Some(cache) = &self.cache {
            match serde_json::to_string(&page) {
                Ok(json) => {
                    if let Err(e) = cache.save_public_listing(&key, &json).await {
                        warn!("Failed to cache public listing {}: {:?}", key, e);
                    }
                }
                Err(e) => warn!("Failed to serialize public listing: {}", e),
            }
        }
        Ok(page)
    }

    // --- Избранное ---

    pub async fn toggle_favorite(&self, actor: &Actor, id: i64) -> AppResult<bool> {
        if actor.role != Role::User {
            return Err(AppError::forbidden("Only users can favorite events"));
        }
        let event = self.load(id).await?;
        if event.is_trashed() {
            return Err(AppError::not_found(format!("Event {} not found", id)));
        }
        let is_favorite = self.events.toggle_favorite(actor.account_id, id).await?;
        info!("⭐ User {} favorite on event {} -> {}", actor.account_id, id, is_favorite);
        Ok(is_favorite)
    }

    pub async fn favorites(&self, actor: &Actor) -> AppResult<Vec<Event>> {
        if actor.role != Role::User {
            return Err(AppError::forbidden("Only users have favorites"));
        }
        Ok(self.events.list_favorites(actor.account_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use crate::store::testing::DownNotifications;
    use crate::store::{MemoryStore, NotificationRepository};
    use chrono::{NaiveDate, NaiveTime};

    const ADMIN: i64 = 1;

    fn service() -> (EventService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let notifier = Notifier::new(store.clone(), 3);
        let service = EventService::new(store.clone(), notifier, None, Recipient::admin(ADMIN), "http://eventra.test");
        (service, store)
    }

    fn details(name: &str) -> EventDetails {
        EventDetails {
            event_name: name.to_string(),
            description: "An evening of music".to_string(),
            event_type: "concert".to_string(),
            event_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            event_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            phone_contact_1: "+2348000000000".to_string(),
            state: "Lagos".to_string(),
            address: "1 Marina".to_string(),
            price: 25.0,
            priority: Priority::Normal,
            scheduled_publish_time: None,
        }
    }

    fn create_input(status: EventStatus) -> CreateEvent {
        CreateEvent { client_id: None, status, details: details("Jazz Night"), image_path: None }
    }

    #[tokio::test]
    async fn draft_creation_notifies_owner_and_admin_once() {
        let (service, store) = service();
        let client = Actor::client(7);

        let event = service.create(&client, create_input(EventStatus::Draft)).await.unwrap();

        assert_eq!(event.status, EventStatus::Draft);
        assert!(event.external_link.starts_with("http://eventra.test/event?tag=jazz-night-"));
        assert_eq!(store.notifications_for(Recipient::client(7)).len(), 1);
        assert_eq!(store.notifications_for(Recipient::admin(ADMIN)).len(), 1);
        let public = service.list_public(&ListQuery::default()).await.unwrap();
        assert_eq!(public.total, 0);
    }

    #[tokio::test]
    async fn restored_is_not_a_valid_initial_status() {
        let (service, _) = service();
        let err = service.create(&Actor::client(7), create_input(EventStatus::Restored)).await.unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(LifecycleError::InvalidInitialStatus(_))));
    }

    #[tokio::test]
    async fn admin_must_name_the_client() {
        let (service, _) = service();
        let err = service.create(&Actor::admin(ADMIN), create_input(EventStatus::Draft)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut input = create_input(EventStatus::Draft);
        input.client_id = Some(9);
        let event = service.create(&Actor::admin(ADMIN), input).await.unwrap();
        assert_eq!(event.client_id, 9);
    }

    #[tokio::test]
    async fn other_clients_cannot_touch_the_event() {
        let (service, _) = service();
        let event = service.create(&Actor::client(7), create_input(EventStatus::Draft)).await.unwrap();

        let err = service.publish(&Actor::client(8), event.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = service.soft_delete(&Actor::user(3), event.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_publish_only_notifies_owner() {
        let (service, store) = service();
        let event = service.create(&Actor::client(7), create_input(EventStatus::Draft)).await.unwrap();

        service.publish(&Actor::admin(ADMIN), event.id).await.unwrap();
        service.publish(&Actor::admin(ADMIN), event.id).await.unwrap();

        let admin_inbox = store.notifications_for(Recipient::admin(ADMIN));
        assert_eq!(admin_inbox.len(), 1, "only the creation notice");
        let owner_inbox = store.notifications_for(Recipient::client(7));
        assert_eq!(owner_inbox.iter().filter(|n| n.notification_type == kinds::EVENT_PUBLISHED).count(), 2);
    }

    #[tokio::test]
    async fn update_works_on_published_but_not_trashed_events() {
        let (service, _) = service();
        let owner = Actor::client(7);
        let event = service.create(&owner, create_input(EventStatus::Published)).await.unwrap();

        let updated = service.update(&owner, event.id, details("Jazz Night II"), None).await.unwrap();
        assert_eq!(updated.event_name, "Jazz Night II");
        assert_eq!(updated.status, EventStatus::Published);

        service.soft_delete(&owner, event.id).await.unwrap();
        let err = service.update(&owner, event.id, details("Nope"), None).await.unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(LifecycleError::Trashed)));
    }

    #[tokio::test]
    async fn restore_attaches_event_metadata_for_admin() {
        let (service, store) = service();
        let owner = Actor::client(7);
        let event = service.create(&owner, create_input(EventStatus::Published)).await.unwrap();
        service.soft_delete(&owner, event.id).await.unwrap();
        service.restore(&owner, event.id).await.unwrap();

        let restored = store
            .notifications_for(Recipient::admin(ADMIN))
            .into_iter()
            .find(|n| n.notification_type == kinds::EVENT_RESTORED)
            .unwrap();
        assert_eq!(restored.metadata.unwrap()["event_id"], event.id);
        assert_eq!(store.unread_count(Recipient::admin(ADMIN)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn repeated_restore_fails() {
        let (service, _) = service();
        let owner = Actor::client(7);
        let event = service.create(&owner, create_input(EventStatus::Draft)).await.unwrap();
        service.soft_delete(&owner, event.id).await.unwrap();
        service.restore(&owner, event.id).await.unwrap();

        let err = service.restore(&owner, event.id).await.unwrap_err();
        assert!(matches!(err, AppError::Lifecycle(LifecycleError::NotTrashed)));
    }

    #[tokio::test]
    async fn favorites_toggle_round_trip() {
        let (service, _) = service();
        let event = service.create(&Actor::client(7), create_input(EventStatus::Published)).await.unwrap();
        let fan = Actor::user(11);

        assert!(service.toggle_favorite(&fan, event.id).await.unwrap());
        assert!(!service.toggle_favorite(&fan, event.id).await.unwrap());
        assert!(service.toggle_favorite(&fan, event.id).await.unwrap());
        assert_eq!(service.favorites(&fan).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_succeeds_while_notifications_are_down() {
        let store = Arc::new(MemoryStore::new());
        let down = Arc::new(DownNotifications::default());
        let service = EventService::new(
            store.clone(),
            Notifier::new(down.clone(), 3),
            None,
            Recipient::admin(ADMIN),
            "http://eventra.test",
        );
        let owner = Actor::client(7);

        let event = service.create(&owner, create_input(EventStatus::Draft)).await.unwrap();
        service.update(&owner, event.id, details("Jazz Night II"), None).await.unwrap();
        service.publish(&owner, event.id).await.unwrap();
        service.soft_delete(&owner, event.id).await.unwrap();
        service.restore(&owner, event.id).await.unwrap();
        service.soft_delete(&owner, event.id).await.unwrap();
        service.purge(&owner, event.id).await.unwrap();

        assert!(store.find_event(event.id).await.unwrap().is_none());
        // 2 + 1 + 2 + 1 + 1 + 1 + 1 уведомлений, по 3 попытки на каждое
        assert_eq!(down.calls(), 9 * 3);
        assert!(store.notifications_for(Recipient::client(7)).is_empty());
    }

    #[test]
    fn authorize_create_checks_role_and_status() {
        let (service, _) = service();
        assert_eq!(
            service.authorize_create(&Actor::client(7), Some(99), EventStatus::Draft).unwrap(),
            (7, InitialStatus::Draft)
        );
        assert!(matches!(
            service.authorize_create(&Actor::user(3), None, EventStatus::Draft),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.authorize_create(&Actor::client(7), None, EventStatus::Restored),
            Err(AppError::Lifecycle(LifecycleError::InvalidInitialStatus(_)))
        ));
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let query = ListQuery { limit: Some(1000), offset: Some(-5), ..ListQuery::default() };
        assert_eq!(query.page(), (MAX_PAGE_SIZE, 0));
        assert_eq!(ListQuery::default().page(), (DEFAULT_PAGE_SIZE, 0));
    }
}

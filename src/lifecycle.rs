//! lifecycle.rs
//!
//! Жизненный цикл события в виде чистой машины состояний, без БД и HTTP.
//!
//! Событие либо активно (`Active`), либо лежит в корзине (`Trashed`). Статус
//! (`draft`, `scheduled`, `published`, `restored`) сохраняется в обоих случаях:
//! мягкое удаление его не трогает, а восстановление всегда ставит `restored`.
//!
//! Каждый переход возвращает новое состояние или `LifecycleError`; сервисный
//! слой применяет результат к хранилищу условным UPDATE/DELETE.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::EventStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Events cannot be created with status '{0}'")]
    InvalidInitialStatus(EventStatus),
    #[error("Event is in trash; restore it first")]
    Trashed,
    #[error("Event is already in trash")]
    AlreadyTrashed,
    #[error("Event is not in trash")]
    NotTrashed,
    #[error("Event must be in trash before permanent deletion")]
    NotInTrash,
}

/// Статус, с которым событие может появиться. `restored` сюда не входит.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialStatus {
    Draft,
    Scheduled,
    Published,
}

impl InitialStatus {
    pub fn status(self) -> EventStatus {
        match self {
            InitialStatus::Draft => EventStatus::Draft,
            InitialStatus::Scheduled => EventStatus::Scheduled,
            InitialStatus::Published => EventStatus::Published,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active { status: EventStatus },
    Trashed { status: EventStatus, deleted_at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn from_parts(status: EventStatus, deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(deleted_at) => Lifecycle::Trashed { status, deleted_at },
            None => Lifecycle::Active { status },
        }
    }

    /// Создание: допустимы только `draft`, `scheduled` и `published`.
    pub fn create(status: EventStatus) -> Result<InitialStatus, LifecycleError> {
        match status {
            EventStatus::Draft => Ok(InitialStatus::Draft),
            EventStatus::Scheduled => Ok(InitialStatus::Scheduled),
            EventStatus::Published => Ok(InitialStatus::Published),
            EventStatus::Restored => Err(LifecycleError::InvalidInitialStatus(status)),
        }
    }

    pub fn status(&self) -> EventStatus {
        match self {
            Lifecycle::Active { status } | Lifecycle::Trashed { status, .. } => *status,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Lifecycle::Active { .. } => None,
            Lifecycle::Trashed { deleted_at, .. } => Some(*deleted_at),
        }
    }

    pub fn is_trashed(&self) -> bool {
        matches!(self, Lifecycle::Trashed { .. })
    }

    // Редактирование опубликованных событий разрешено (ограничение снято по решению продукта).
    pub fn ensure_editable(&self) -> Result<(), LifecycleError> {
        match self {
            Lifecycle::Active { .. } => Ok(()),
            Lifecycle::Trashed { .. } => Err(LifecycleError::Trashed),
        }
    }

    /// Публикация из любого активного статуса. Повторная публикация не ошибка.
    pub fn publish(self) -> Result<Self, LifecycleError> {
        match self {
            Lifecycle::Active { .. } => Ok(Lifecycle::Active { status: EventStatus::Published }),
            Lifecycle::Trashed { .. } => Err(LifecycleError::Trashed),
        }
    }

    pub fn soft_delete(self, at: DateTime<Utc>) -> Result<Self, LifecycleError> {
        match self {
            Lifecycle::Active { status } => Ok(Lifecycle::Trashed { status, deleted_at: at }),
            Lifecycle::Trashed { .. } => Err(LifecycleError::AlreadyTrashed),
        }
    }

    /// Restore ignores the status the event had before deletion.
    pub fn restore(self) -> Result<Self, LifecycleError> {
        match self {
            Lifecycle::Trashed { .. } => Ok(Lifecycle::Active { status: EventStatus::Restored }),
            Lifecycle::Active { .. } => Err(LifecycleError::NotTrashed),
        }
    }

    pub fn ensure_purgeable(&self) -> Result<(), LifecycleError> {
        match self {
            Lifecycle::Trashed { .. } => Ok(()),
            Lifecycle::Active { .. } => Err(LifecycleError::NotInTrash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = EventStatus> {
        prop::sample::select(EventStatus::ALL.to_vec())
    }

    #[test]
    fn create_rejects_restored() {
        assert_eq!(
            Lifecycle::create(EventStatus::Restored),
            Err(LifecycleError::InvalidInitialStatus(EventStatus::Restored))
        );
        assert_eq!(Lifecycle::create(EventStatus::Scheduled), Ok(InitialStatus::Scheduled));
        assert_eq!(Lifecycle::create(EventStatus::Draft).map(InitialStatus::status), Ok(EventStatus::Draft));
    }

    #[test]
    fn publish_is_idempotent() {
        let once = Lifecycle::Active { status: EventStatus::Draft }.publish().unwrap();
        let twice = once.publish().unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.status(), EventStatus::Published);
    }

    #[test]
    fn restore_on_active_event_fails() {
        let active = Lifecycle::Active { status: EventStatus::Published };
        assert_eq!(active.restore(), Err(LifecycleError::NotTrashed));
    }

    #[test]
    fn purge_requires_trash() {
        let active = Lifecycle::Active { status: EventStatus::Draft };
        assert_eq!(active.ensure_purgeable(), Err(LifecycleError::NotInTrash));
        let trashed = active.soft_delete(Utc::now()).unwrap();
        assert!(trashed.ensure_purgeable().is_ok());
    }

    #[test]
    fn trashed_events_are_frozen() {
        let trashed = Lifecycle::Trashed { status: EventStatus::Draft, deleted_at: Utc::now() };
        assert_eq!(trashed.ensure_editable(), Err(LifecycleError::Trashed));
        assert_eq!(trashed.publish(), Err(LifecycleError::Trashed));
        assert_eq!(trashed.soft_delete(Utc::now()), Err(LifecycleError::AlreadyTrashed));
    }

    proptest! {
        #[test]
        fn soft_delete_keeps_status_and_restore_forces_restored(status in any_status()) {
            let at = Utc::now();
            let trashed = Lifecycle::Active { status }.soft_delete(at).unwrap();
            prop_assert_eq!(trashed.status(), status);
            prop_assert_eq!(trashed.deleted_at(), Some(at));

            let restored = trashed.restore().unwrap();
            prop_assert_eq!(restored, Lifecycle::Active { status: EventStatus::Restored });
            prop_assert!(restored.deleted_at().is_none());
        }

        #[test]
        fn from_parts_tracks_deletion_marker(status in any_status(), trashed in any::<bool>()) {
            let deleted_at = trashed.then(Utc::now);
            let lifecycle = Lifecycle::from_parts(status, deleted_at);
            prop_assert_eq!(lifecycle.is_trashed(), trashed);
            prop_assert_eq!(lifecycle.status(), status);
        }
    }
}

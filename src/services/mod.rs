pub mod events;
pub mod export;
pub mod notifier;
pub mod scheduler;
pub mod tags;
pub mod uploads;

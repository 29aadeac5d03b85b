//! Один проход напоминаний о запланированных событиях.
//! Запускается внешним планировщиком, например `*/5 * * * * eventra-cron`.

use anyhow::Context;
use std::sync::Arc;
use tracing::{error, info};

use eventra::{
    config::Config,
    init_tracing,
    models::Recipient,
    services::{
        notifier::Notifier,
        scheduler::{local_now, ScheduleNotifier},
    },
    store::PgStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(&config.app);

    let url = config
        .database
        .url
        .as_deref()
        .context("DATABASE_URL is required for eventra-cron")?;
    let store = Arc::new(PgStore::connect(url, 2).await.context("Failed to connect to database")?);

    let notifier = Notifier::new(store.clone(), config.notifications.max_attempts);
    let cron = ScheduleNotifier::new(store, notifier, Recipient::admin(config.notifications.admin_id));

    let now = local_now(config.app.utc_offset_minutes);
    match cron.run_once(now).await {
        Ok(report) => {
            info!("⏰ eventra-cron finished: {} event(s) processed", report.processed());
            Ok(())
        }
        Err(e) => {
            error!("⏰ eventra-cron aborted: {}", e);
            Err(e.into())
        }
    }
}

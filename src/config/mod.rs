use config::{ConfigError, Environment};
use serde::{Deserialize, Serialize};
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub uploads: UploadsConfig,
    pub notifications: NotificationsConfig,
    pub scheduler: SchedulerConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    /// `text` or `json`
    pub log_format: String,
    /// Base for generated shareable event links.
    pub public_base_url: String,
    /// Смещение локального времени событий от UTC (даты и время в БД без зоны).
    pub utc_offset_minutes: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            environment: "development".to_string(),
            rust_log: "eventra=debug,tower_http=debug".to_string(),
            log_format: "text".to_string(),
            public_base_url: "http://localhost:8000".to_string(),
            utc_offset_minutes: 0,
        }
    }
}

// Настройки базы данных. Без url работаем на хранилище в памяти.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: None, pool_size: 20 }
    }
}

// Настройки Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub cache_ttl_seconds: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: None, cache_ttl_seconds: 60 }
    }
}

// Настройки JWT
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_hours: i64,
}

/// Секрет только для разработки, в production обязателен свой `JWT_SECRET`.
pub const DEV_JWT_SECRET: &str = "change-me";

impl Default for JwtConfig {
    fn default() -> Self {
        Self { secret: DEV_JWT_SECRET.to_string(), expires_in_hours: 24 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    pub dir: String,
    pub max_bytes: usize,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self { dir: "uploads".to_string(), max_bytes: 5 * 1024 * 1024 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Admin account that receives lifecycle notifications.
    pub admin_id: i64,
    pub max_attempts: u32,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { admin_id: 1, max_attempts: 3 }
    }
}

// Крон напоминаний внутри сервера (обычно запускается отдельным бинарником)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { enabled: false, interval_secs: 300 }
    }
}

/// Привычные имена переменных окружения -> ключи конфигурации.
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("HOST", "app.host"),
    ("PORT", "app.port"),
    ("ENVIRONMENT", "app.environment"),
    ("RUST_LOG", "app.rust_log"),
    ("LOG_FORMAT", "app.log_format"),
    ("PUBLIC_BASE_URL", "app.public_base_url"),
    ("APP_UTC_OFFSET_MINUTES", "app.utc_offset_minutes"),
    ("DATABASE_URL", "database.url"),
    ("DB_POOL_SIZE", "database.pool_size"),
    ("REDIS_URL", "redis.url"),
    ("CACHE_TTL_SECONDS", "redis.cache_ttl_seconds"),
    ("JWT_SECRET", "jwt.secret"),
    ("JWT_EXPIRES_IN_HOURS", "jwt.expires_in_hours"),
    ("UPLOADS_DIR", "uploads.dir"),
    ("UPLOADS_MAX_BYTES", "uploads.max_bytes"),
    ("NOTIFY_ADMIN_ID", "notifications.admin_id"),
    ("NOTIFY_MAX_ATTEMPTS", "notifications.max_attempts"),
    ("SCHEDULER_ENABLED", "scheduler.enabled"),
    ("SCHEDULER_INTERVAL_SECS", "scheduler.interval_secs"),
];

impl Config {
    /// `.env`, defaults, then `EVENTRA_SECTION__KEY` variables, then the conventional names above.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let vars = ENV_OVERRIDES
            .iter()
            .filter_map(|(var, key)| env::var(var).ok().map(|value| (*key, value)));
        Self::load(vars)
    }

    pub fn load<'a, I>(overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?)
            .add_source(
                Environment::with_prefix("EVENTRA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let secret = self.jwt.secret.trim();
        if self.is_production() && (secret.is_empty() || secret == DEV_JWT_SECRET) {
            return Err(ConfigError::Message("JWT_SECRET must be set in production".to_string()));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.app.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_overrides() {
        let config = Config::load(Vec::new()).unwrap();
        assert_eq!(config.app.port, 8000);
        assert!(config.database.url.is_none());
        assert_eq!(config.notifications.max_attempts, 3);
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn overrides_are_parsed_into_typed_fields() {
        let config = Config::load(vec![
            ("app.port", "9100".to_string()),
            ("database.url", "postgres://localhost/eventra".to_string()),
            ("scheduler.enabled", "true".to_string()),
            ("notifications.admin_id", "42".to_string()),
        ])
        .unwrap();

        assert_eq!(config.app.port, 9100);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/eventra"));
        assert!(config.scheduler.enabled);
        assert_eq!(config.notifications.admin_id, 42);
    }

    #[test]
    fn production_requires_own_jwt_secret() {
        let production = || {
            vec![
                ("app.environment", "production".to_string()),
                ("database.url", "postgres://localhost/eventra".to_string()),
            ]
        };
        assert!(Config::load(production()).is_err());

        let mut blank = production();
        blank.push(("jwt.secret", "   ".to_string()));
        assert!(Config::load(blank).is_err());

        let mut own = production();
        own.push(("jwt.secret", "s3cr3t-from-vault".to_string()));
        let config = Config::load(own).unwrap();
        assert_eq!(config.jwt.secret, "s3cr3t-from-vault");
    }

    #[test]
    fn development_keeps_dev_secret() {
        let config = Config::load(vec![("app.environment", "development".to_string())]).unwrap();
        assert_eq!(config.jwt.secret, DEV_JWT_SECRET);
    }

    #[test]
    fn bad_number_is_a_config_error() {
        assert!(Config::load(vec![("app.port", "not-a-port".to_string())]).is_err());
    }
}

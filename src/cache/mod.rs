use crate::redis_client::RedisClient;

pub mod events;

/// Кеш поверх Redis. Опционален: без REDIS_URL сервис работает напрямую с хранилищем.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        Self { redis, ttl_seconds }
    }
}

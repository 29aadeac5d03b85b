use redis::{aio::ConnectionManager, Client};

/// Подключение к Redis с автоматическим переподключением.
#[derive(Clone)]
pub struct RedisClient {
    pub conn: ConnectionManager,
}

impl RedisClient {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let mut conn = client.get_connection_manager().await?;
        // Проверяем соединение сразу, а не на первом запросе
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(RedisClient { conn })
    }
}

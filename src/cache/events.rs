use crate::cache::CacheService;
use redis::AsyncCommands;
use tracing::info;

const PUBLIC_PREFIX: &str = "events:public:";
// Сколько ключей Redis просматривает за один SCAN
const SCAN_BATCH: usize = 200;

/// Ключ кеша публичной выдачи строится из параметров запроса.
pub fn public_listing_key(search: Option<&str>, limit: i64, offset: i64) -> String {
    format!(
        "{}q={}&l={}&o={}",
        PUBLIC_PREFIX,
        search.map(str::trim).unwrap_or_default().to_lowercase(),
        limit,
        offset
    )
}

fn public_listing_pattern() -> String {
    format!("{}*", PUBLIC_PREFIX)
}

impl CacheService {
    pub async fn get_public_listing(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.get(key).await
    }

    pub async fn save_public_listing(&self, key: &str, json: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.set_ex(key, json, self.ttl_seconds).await
    }

    /// Сбрасывает все закешированные страницы публичной выдачи.
    /// Ключи обходятся курсором SCAN, без блокирующего KEYS.
    pub async fn invalidate_public_listings(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let pattern = public_listing_pattern();
        let mut cursor: u64 = 0;
        let mut removed = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let _: () = conn.del(&keys).await?;
                removed += keys.len();
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        if removed > 0 {
            info!("Invalidated {} cached public listings", removed);
        }
        Ok(())
    }
}

use redis::{Client, Commands, Connection};

use crate::cache::CacheProvider;
use crate::error::{GraphError, GraphResult};

/// Cache provider backed by a redis server
///
/// Opens a connection per call; the client itself only holds the parsed URL.
#[derive(Debug, Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    /// # Errors
    ///
    /// Returns `GraphError::Configuration` when the URL cannot be parsed.
    pub fn open(url: &str) -> GraphResult<Self> {
        let client = Client::open(url)
            .map_err(|e| GraphError::Configuration(format!("invalid redis url: {e}")))?;
        Ok(Self { client })
    }

    fn connection(&self) -> GraphResult<Connection> {
        self.client
            .get_connection()
            .map_err(|e| GraphError::Cache(format!("redis connection failed: {e}")))
    }
}

impl CacheProvider for RedisCache {
    fn exists(&self, key: &str) -> GraphResult<bool> {
        let mut conn = self.connection()?;
        conn.exists(key)
            .map_err(|e| GraphError::Cache(format!("EXISTS failed: {e}")))
    }

    fn get(&self, key: &str) -> GraphResult<Option<String>> {
        let mut conn = self.connection()?;
        conn.get(key)
            .map_err(|e| GraphError::Cache(format!("GET failed: {e}")))
    }

    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> GraphResult<bool> {
        let mut conn = self.connection()?;
        let result: redis::RedisResult<()> = if ttl_seconds == 0 {
            conn.set(key, value)
        } else {
            conn.set_ex(key, value, ttl_seconds)
        };
        result
            .map(|()| true)
            .map_err(|e| GraphError::Cache(format!("SET failed: {e}")))
    }
}

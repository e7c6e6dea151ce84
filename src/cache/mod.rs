//! Response cache layer.
//!
//! Cache identity is a function of the connection and the compiled SQL text
//! only: two differently worded client queries that compile to the same
//! statement share one entry. The stored value is the final hydrated and
//! paginated JSON.
//!
//! Per request the caller picks a [`CacheMode`]:
//!
//! - `none`: the cache is neither read nor written
//! - `cache`: serve a stored response when one exists, else execute and store
//! - `refresh`: always execute, then overwrite the stored response

mod memory;
mod redis_cache;

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;

use crate::error::GraphResult;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

const KEY_SEPARATOR: &str = "||||";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
    #[default]
    None,
    Cache,
    Refresh,
}

impl FromStr for CacheMode {
    type Err = Infallible;

    /// Unrecognized values (including an empty header) disable caching
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "cache" => CacheMode::Cache,
            "refresh" => CacheMode::Refresh,
            _ => CacheMode::None,
        })
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheMode::None => "none",
            CacheMode::Cache => "cache",
            CacheMode::Refresh => "refresh",
        })
    }
}

/// `base64(connection_id + "||||" + sql)`
pub fn cache_key(connection_id: &str, sql: &str) -> String {
    STANDARD.encode(format!("{connection_id}{KEY_SEPARATOR}{sql}"))
}

/// Per-request cache state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheContext {
    pub mode: CacheMode,
    /// TTL the caller asked for, if any
    pub requested_ttl: Option<u64>,
    /// Effective TTL, set by [`CacheContext::update_cache_values`]
    pub ttl: Option<u64>,
    pub key: Option<String>,
}

impl CacheContext {
    pub fn new(mode: CacheMode, requested_ttl: Option<u64>) -> Self {
        Self {
            mode,
            requested_ttl,
            ttl: None,
            key: None,
        }
    }

    /// Reset key and TTL for a newly compiled statement
    pub fn update_cache_values(&mut self, connection_id: &str, sql: &str, default_ttl: u64) {
        self.key = None;
        self.ttl = None;
        if self.mode == CacheMode::None {
            return;
        }
        self.key = Some(cache_key(connection_id, sql));
        self.ttl = Some(self.requested_ttl.unwrap_or(default_ttl));
    }
}

/// External key/value store
pub trait CacheProvider: Send + Sync {
    fn exists(&self, key: &str) -> GraphResult<bool>;

    fn get(&self, key: &str) -> GraphResult<Option<String>>;

    /// Store `value` for `ttl_seconds`; returns whether the store accepted it
    fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> GraphResult<bool>;
}

/// Reads and writes hydrated responses through a [`CacheProvider`]
///
/// Provider failures are logged and treated as misses; they never fail the
/// request.
#[derive(Clone)]
pub struct ResponseCache {
    provider: Arc<dyn CacheProvider>,
    default_ttl: u64,
}

impl fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl ResponseCache {
    pub fn new(provider: Arc<dyn CacheProvider>, default_ttl: u64) -> Self {
        Self {
            provider,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    /// Stored response for `ctx.key`, only in `cache` mode
    ///
    /// A stored payload that is not valid JSON switches the request to
    /// `refresh` so the fresh result overwrites it.
    pub fn check_cache(&self, ctx: &mut CacheContext) -> Option<Value> {
        if ctx.mode != CacheMode::Cache {
            return None;
        }
        let key = ctx.key.as_deref()?;
        let stored = match self.provider.exists(key) {
            Ok(true) => self.provider.get(key),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };
        let payload = match stored {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                record_miss();
                return None;
            }
            Err(e) => {
                log::warn!("cache read failed, executing instead: {e}");
                record_miss();
                return None;
            }
        };
        match serde_json::from_str(&payload) {
            Ok(value) => {
                log::debug!("cache hit for {key}");
                #[cfg(feature = "metrics")]
                METRICS.record_cache_hit();
                Some(value)
            }
            Err(e) => {
                log::warn!("discarding corrupt cache entry {key}: {e}");
                ctx.mode = CacheMode::Refresh;
                record_miss();
                None
            }
        }
    }

    /// Store `value` under `ctx.key` unless caching is off
    pub fn set_cache(&self, ctx: &CacheContext, value: &Value) {
        if ctx.mode == CacheMode::None {
            return;
        }
        let Some(key) = ctx.key.as_deref() else {
            return;
        };
        let ttl = ctx.ttl.unwrap_or(self.default_ttl);
        let payload = value.to_string();
        match self.provider.set(key, &payload, ttl) {
            Ok(true) => log::debug!("cached {} bytes for {ttl}s under {key}", payload.len()),
            Ok(false) => log::warn!("cache provider declined to store {key}"),
            Err(e) => log::warn!("cache write failed: {e}"),
        }
    }
}

fn record_miss() {
    #[cfg(feature = "metrics")]
    METRICS.record_cache_miss();
}

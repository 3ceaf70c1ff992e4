//! Per-credential cool-down between successful statement fetches.
//!
//! The engine asks how long a credential must still wait before any fetch and
//! records a use only after a fetch succeeded. Two backends: a process-local
//! map and Redis, which coordinates several service instances.

use crate::models::Credential;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{debug, instrument};

pub const DEFAULT_WINDOW_SECS: u64 = 60;

const REDIS_KEY_PREFIX: &str = "statement:cooldown:";

/// Time source, injectable so tests can move time by hand.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait CooldownStore: Send + Sync {
    /// Whole seconds until the credential may fetch again, rounded up.
    /// Zero when it was never used or the window has passed.
    async fn wait_remaining(&self, credential: &Credential) -> Result<u64, AppError>;

    /// Records a successful fetch now. Never call after a failed one.
    async fn mark_used(&self, credential: &Credential) -> Result<(), AppError>;

    fn window_secs(&self) -> u64;
}

fn ceil_secs(millis: i64) -> u64 {
    if millis <= 0 {
        0
    } else {
        (millis as u64).div_ceil(1000)
    }
}

/// Last-use timestamps keyed by credential fingerprint. Entries never expire;
/// an old entry simply yields a zero wait.
pub struct InMemoryCooldown {
    last_used: DashMap<String, DateTime<Utc>>,
    window: ChronoDuration,
    window_secs: u64,
    clock: Arc<dyn Clock>,
}

impl InMemoryCooldown {
    pub fn new(window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            last_used: DashMap::new(),
            window: ChronoDuration::seconds(window_secs as i64),
            window_secs,
            clock,
        }
    }

    pub fn with_system_clock(window_secs: u64) -> Self {
        Self::new(window_secs, Arc::new(SystemClock))
    }
}

#[async_trait]
impl CooldownStore for InMemoryCooldown {
    async fn wait_remaining(&self, credential: &Credential) -> Result<u64, AppError> {
        let Some(last) = self.last_used.get(credential.fingerprint()).map(|e| *e) else {
            return Ok(0);
        };
        let remaining = (last + self.window) - self.clock.now();
        Ok(ceil_secs(remaining.num_milliseconds()))
    }

    async fn mark_used(&self, credential: &Credential) -> Result<(), AppError> {
        self.last_used
            .insert(credential.fingerprint().to_string(), self.clock.now());
        debug!(credential = %credential.short_id(), "Cool-down started");
        Ok(())
    }

    fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

/// Cool-down shared through Redis: a key with a TTL equal to the window.
pub struct RedisCooldown {
    client: redis::Client,
    window_secs: u64,
}

impl RedisCooldown {
    pub fn new(redis_url: &Secret<String>, window_secs: u64) -> Result<Self, AppError> {
        let client = redis::Client::open(redis_url.expose_secret().as_str()).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid Redis URL: {}", e))
        })?;
        Ok(Self {
            client,
            window_secs,
        })
    }

    fn key(credential: &Credential) -> String {
        format!("{}{}", REDIS_KEY_PREFIX, credential.fingerprint())
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Redis connection failed: {}", e)))
    }
}

#[async_trait]
impl CooldownStore for RedisCooldown {
    #[instrument(skip(self, credential), fields(credential = %credential.short_id()))]
    async fn wait_remaining(&self, credential: &Credential) -> Result<u64, AppError> {
        let mut conn = self.connection().await?;
        // -2: no key, -1: no expiry (not written by us).
        let pttl: i64 = redis::cmd("PTTL")
            .arg(Self::key(credential))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Redis PTTL failed: {}", e)))?;
        Ok(ceil_secs(pttl))
    }

    #[instrument(skip(self, credential), fields(credential = %credential.short_id()))]
    async fn mark_used(&self, credential: &Credential) -> Result<(), AppError> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(Self::key(credential))
            .arg(1)
            .arg("EX")
            .arg(self.window_secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("Redis SET failed: {}", e)))?;
        Ok(())
    }

    fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

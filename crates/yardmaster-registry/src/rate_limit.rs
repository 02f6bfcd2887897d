//! Per-registry token-bucket rate limiting.
//!
//! Callers wait for a token instead of failing. This is what keeps a burst of
//! concurrent `NewestBuild` lookups from tripping upstream throttling.

use parking_lot::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{RegistryError, Result};

/// Requests per second for registries without a published limit.
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 20;

/// Requests per second for registries with published high limits.
pub const HIGH_LIMIT_REQUESTS_PER_SECOND: u32 = 50;

const HIGH_LIMIT_HOSTS: &[&str] = &["ghcr.io", "quay.io", "gcr.io"];
const HIGH_LIMIT_SUFFIXES: &[&str] = &[".amazonaws.com", ".pkg.dev", ".azurecr.io", ".gcr.io"];

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained requests per second.
    pub requests_per_second: u32,
    /// Bucket size; defaults to one second worth of tokens.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Returns the configuration appropriate for a registry host.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_registry::RateLimitConfig;
    ///
    /// assert_eq!(RateLimitConfig::for_host("ghcr.io").requests_per_second, 50);
    /// assert_eq!(RateLimitConfig::for_host("registry.internal").requests_per_second, 20);
    /// ```
    #[must_use]
    pub fn for_host(host: &str) -> Self {
        let host = host.split(':').next().unwrap_or(host);
        let rps = if HIGH_LIMIT_HOSTS.contains(&host)
            || HIGH_LIMIT_SUFFIXES.iter().any(|s| host.ends_with(s))
        {
            HIGH_LIMIT_REQUESTS_PER_SECOND
        } else {
            DEFAULT_REQUESTS_PER_SECOND
        };
        Self::new(rps)
    }

    /// Creates a configuration with a burst of one second's worth of tokens.
    #[must_use]
    pub fn new(requests_per_second: u32) -> Self {
        let rps = requests_per_second.max(1);
        Self {
            requests_per_second: rps,
            burst: rps,
        }
    }

    /// Sets the bucket size.
    #[must_use]
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst.max(1);
        self
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

/// Token bucket shared by all requests of one client.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Creates a limiter with a full bucket.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let burst = f64::from(config.burst.max(1));
        Self {
            rate: f64::from(config.requests_per_second.max(1)),
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
        }
    }

    /// Creates a limiter for a registry host.
    #[must_use]
    pub fn for_host(host: &str) -> Self {
        Self::new(&RateLimitConfig::for_host(host))
    }

    /// Waits until a token is available and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Cancelled`] if `cancel` fires while waiting.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }
            let wait = self.try_take();
            if wait.is_zero() {
                return Ok(());
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(RegistryError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Takes a token if one is available, else returns how long to wait.
    fn try_take(&self) -> Duration {
        let mut bucket = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.refilled_at).as_secs_f64();
        bucket.tokens = elapsed.mul_add(self.rate, bucket.tokens).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Duration::ZERO
        } else {
            Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate)
        }
    }
}

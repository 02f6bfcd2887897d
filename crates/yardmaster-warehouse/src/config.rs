//! Configuration types for the Warehouse controller.
//!
//! This module provides the settings shared by every reconcile: concurrency,
//! the shared image cache, the discovery pool and error backoff.

use std::time::Duration;

use yardmaster_registry::{CacheConfig, DEFAULT_DISCOVERY_POOL_SIZE};

/// Default number of Warehouses reconciled concurrently.
pub const DEFAULT_MAX_CONCURRENT_RECONCILES: u16 = 4;

/// Configuration for the Warehouse controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Maximum number of Warehouses reconciled at once.
    pub max_concurrent_reconciles: u16,

    /// Shared image cache settings.
    pub cache: CacheConfig,

    /// Number of concurrent registry lookups across all discoveries.
    pub discovery_pool_size: usize,

    /// Delay before the first retry of a failed reconcile.
    pub error_backoff_base: Duration,

    /// Upper bound on the retry delay.
    pub error_backoff_max: Duration,

    /// Namespace to watch; all namespaces when unset.
    pub namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            cache: CacheConfig::default(),
            discovery_pool_size: DEFAULT_DISCOVERY_POOL_SIZE,
            error_backoff_base: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(300),
            namespace: None,
        }
    }
}

impl ControllerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }

    /// Returns the retry delay after `failures` consecutive failures.
    ///
    /// The delay doubles with every failure, starting at the base and capped
    /// at the maximum.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use yardmaster_warehouse::ControllerConfig;
    ///
    /// let config = ControllerConfig::default();
    /// assert_eq!(config.backoff(1), Duration::from_secs(5));
    /// assert_eq!(config.backoff(3), Duration::from_secs(20));
    /// assert_eq!(config.backoff(30), Duration::from_secs(300));
    /// ```
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.error_backoff_base
            .saturating_mul(1 << exponent)
            .min(self.error_backoff_max)
    }
}

/// Builder for `ControllerConfig`.
#[derive(Debug, Default)]
pub struct ControllerConfigBuilder {
    max_concurrent_reconciles: Option<u16>,
    cache_max_entries: Option<usize>,
    discovery_pool_size: Option<usize>,
    error_backoff_base: Option<Duration>,
    error_backoff_max: Option<Duration>,
    namespace: Option<String>,
}

impl ControllerConfigBuilder {
    /// Sets the reconcile concurrency.
    #[must_use]
    pub const fn max_concurrent_reconciles(mut self, max: u16) -> Self {
        self.max_concurrent_reconciles = Some(max);
        self
    }

    /// Sets the image cache size.
    #[must_use]
    pub const fn cache_max_entries(mut self, entries: usize) -> Self {
        self.cache_max_entries = Some(entries);
        self
    }

    /// Sets the discovery pool size.
    #[must_use]
    pub const fn discovery_pool_size(mut self, size: usize) -> Self {
        self.discovery_pool_size = Some(size);
        self
    }

    /// Sets the error backoff bounds.
    #[must_use]
    pub const fn error_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.error_backoff_base = Some(base);
        self.error_backoff_max = Some(max);
        self
    }

    /// Restricts the controller to one namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        let error_backoff_base = self
            .error_backoff_base
            .unwrap_or(defaults.error_backoff_base);
        ControllerConfig {
            max_concurrent_reconciles: self
                .max_concurrent_reconciles
                .unwrap_or(defaults.max_concurrent_reconciles)
                .max(1),
            cache: self
                .cache_max_entries
                .map_or(defaults.cache, |n| CacheConfig::default().with_max_entries(n)),
            discovery_pool_size: self
                .discovery_pool_size
                .unwrap_or(defaults.discovery_pool_size)
                .max(1),
            error_backoff_base,
            error_backoff_max: self
                .error_backoff_max
                .unwrap_or(defaults.error_backoff_max)
                .max(error_backoff_base),
            namespace: self.namespace,
        }
    }
}

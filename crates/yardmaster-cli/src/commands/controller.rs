//! Controller command implementation.
//!
//! Watches Warehouses in the current cluster and reconciles them until
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use yardmaster_registry::{DiscoveryPool, ImageCache, DEFAULT_DISCOVERY_POOL_SIZE, DEFAULT_MAX_ENTRIES};
use yardmaster_warehouse::{
    controller, ControllerConfig, GitCli, HelmRepositories, KubeStore, KubernetesCredentials,
    OciBackendFactory, Reconciler, SubscriberDeps, SubscriberRegistry,
    DEFAULT_MAX_CONCURRENT_RECONCILES,
};

/// Arguments for the controller command.
#[derive(Args)]
pub struct ControllerArgs {
    /// Maximum number of Warehouses reconciled concurrently
    #[arg(long, env = "YARDMASTER_MAX_CONCURRENT_RECONCILES", default_value_t = DEFAULT_MAX_CONCURRENT_RECONCILES)]
    pub max_concurrent_reconciles: u16,

    /// Maximum number of images held in the shared cache
    #[arg(long, env = "YARDMASTER_CACHE_MAX_ENTRIES", default_value_t = DEFAULT_MAX_ENTRIES)]
    pub cache_max_entries: usize,

    /// Maximum number of concurrent registry lookups across all discoveries
    #[arg(long, env = "YARDMASTER_DISCOVERY_POOL_SIZE", default_value_t = DEFAULT_DISCOVERY_POOL_SIZE)]
    pub discovery_pool_size: usize,

    /// First retry delay after a failed reconcile, in seconds
    #[arg(long, env = "YARDMASTER_ERROR_BACKOFF_BASE", default_value = "5")]
    pub error_backoff_base: u64,

    /// Upper bound on the retry delay, in seconds
    #[arg(long, env = "YARDMASTER_ERROR_BACKOFF_MAX", default_value = "300")]
    pub error_backoff_max: u64,

    /// Namespace to watch (all namespaces when unset)
    #[arg(short, long, env = "YARDMASTER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Git executable used for remote discovery
    #[arg(long, env = "YARDMASTER_GIT_BINARY", default_value = "git")]
    pub git_binary: String,
}

impl ControllerArgs {
    fn config(&self) -> ControllerConfig {
        let mut builder = ControllerConfig::builder()
            .max_concurrent_reconciles(self.max_concurrent_reconciles)
            .cache_max_entries(self.cache_max_entries)
            .discovery_pool_size(self.discovery_pool_size)
            .error_backoff(
                Duration::from_secs(self.error_backoff_base),
                Duration::from_secs(self.error_backoff_max),
            );
        if let Some(namespace) = &self.namespace {
            builder = builder.namespace(namespace.clone());
        }
        builder.build()
    }
}

/// Runs the controller command.
///
/// # Errors
///
/// Returns an error if:
/// - No Kubernetes configuration can be inferred
/// - The subscriber or selector registries cannot be built
pub async fn run(args: ControllerArgs) -> Result<()> {
    let config = args.config();
    info!(
        concurrency = config.max_concurrent_reconciles,
        cache_max_entries = config.cache.max_entries,
        discovery_pool_size = config.discovery_pool_size,
        "Starting yardmaster controller"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let reconciler = build_reconciler(client.clone(), &config, &args.git_binary)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
        }
        signal.cancel();
    });

    controller::run(client, config, reconciler, shutdown).await;
    Ok(())
}

fn build_reconciler(client: kube::Client, config: &ControllerConfig, git_binary: &str) -> Result<Reconciler> {
    let oci = Arc::new(OciBackendFactory::default());
    let deps = SubscriberDeps::new(
        Arc::new(KubernetesCredentials::new(client.clone())),
        oci.clone(),
        Arc::new(GitCli::new(git_binary)),
        Arc::new(HelmRepositories::new(oci)),
    )
    .context("Failed to build image selectors")?
    .with_cache(ImageCache::new(&config.cache))
    .with_pool(DiscoveryPool::new(config.discovery_pool_size));

    let subscribers =
        SubscriberRegistry::with_builtins().context("Failed to build subscriber registry")?;

    Ok(Reconciler::new(
        Arc::new(KubeStore::new(client)),
        Arc::new(subscribers),
        deps,
    ))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ControllerArgs,
    }

    #[test]
    fn test_defaults() {
        let wrapper = Wrapper::parse_from(["yardmaster"]);
        let config = wrapper.args.config();
        assert_eq!(config.max_concurrent_reconciles, DEFAULT_MAX_CONCURRENT_RECONCILES);
        assert_eq!(config.cache.max_entries, DEFAULT_MAX_ENTRIES);
        assert_eq!(config.error_backoff_base, Duration::from_secs(5));
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_flags() {
        let wrapper = Wrapper::parse_from([
            "yardmaster",
            "--max-concurrent-reconciles",
            "8",
            "--discovery-pool-size",
            "32",
            "--error-backoff-max",
            "60",
            "--namespace",
            "team",
        ]);
        let config = wrapper.args.config();
        assert_eq!(config.max_concurrent_reconciles, 8);
        assert_eq!(config.discovery_pool_size, 32);
        assert_eq!(config.error_backoff_max, Duration::from_secs(60));
        assert_eq!(config.namespace.as_deref(), Some("team"));
    }
}

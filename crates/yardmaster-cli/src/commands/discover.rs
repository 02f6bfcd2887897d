//! Discover command implementation.
//!
//! Runs one image discovery against a live registry, outside any cluster, and
//! prints the ranked references as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;

use yardmaster_core::subscription::DEFAULT_DISCOVERY_LIMIT;
use yardmaster_core::{ImageSelectionStrategy, ImageSubscription, Subscription, Validate};
use yardmaster_warehouse::subscriber::DiscoveryResult;
use yardmaster_warehouse::{
    CredentialType, Credentials, GitCli, HelmRepositories, OciBackendFactory, StaticCredentials,
    SubscriberDeps, SubscriberRegistry,
};

/// Image selection strategy.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Strategy {
    /// One exact tag, resolved to its current digest
    Digest,
    /// Tags in descending lexical order
    Lexical,
    /// Most recently built images first
    NewestBuild,
    /// Semantic versions, highest first
    #[default]
    Semver,
}

impl From<Strategy> for ImageSelectionStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Digest => Self::Digest,
            Strategy::Lexical => Self::Lexical,
            Strategy::NewestBuild => Self::NewestBuild,
            Strategy::Semver => Self::SemVer,
        }
    }
}

/// Arguments for the discover command.
#[derive(Args)]
pub struct DiscoverArgs {
    /// Image repository (e.g., `ghcr.io/acme/api` or `nginx`)
    #[arg(short, long)]
    pub repo: String,

    /// Image selection strategy
    #[arg(short, long, value_enum, default_value_t = Strategy::default())]
    pub strategy: Strategy,

    /// Semver range (semver) or exact tag (digest)
    #[arg(short, long)]
    pub constraint: Option<String>,

    /// Only consider images for this platform (e.g., `linux/amd64`)
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Only tags matching one of these patterns are considered
    #[arg(long, value_delimiter = ',')]
    pub allow_tags: Vec<String>,

    /// Tags matching any of these patterns are skipped
    #[arg(long, value_delimiter = ',')]
    pub ignore_tags: Vec<String>,

    /// Maximum number of references to print
    #[arg(short, long, default_value_t = DEFAULT_DISCOVERY_LIMIT)]
    pub limit: u32,

    /// Username for basic authentication
    #[arg(short, long, env = "YARDMASTER_REGISTRY_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "YARDMASTER_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure_skip_tls_verify: bool,
}

impl DiscoverArgs {
    fn subscription(&self) -> Result<Subscription> {
        let mut image = ImageSubscription::new(&self.repo)
            .with_strategy(self.strategy.into())
            .with_discovery_limit(self.limit);
        if let Some(constraint) = &self.constraint {
            image = image.with_constraint(constraint.clone());
        }
        if let Some(platform) = &self.platform {
            image = image.with_platform(platform.clone());
        }
        image.allow_tags.clone_from(&self.allow_tags);
        image.ignore_tags.clone_from(&self.ignore_tags);
        image.insecure_skip_tls_verify = self.insecure_skip_tls_verify;

        let subscription = Subscription::Image(image);
        subscription
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid subscription: {e}"))?;
        Ok(subscription)
    }

    fn credentials(&self) -> Result<StaticCredentials> {
        let credentials = StaticCredentials::new();
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(credentials.with(
                CredentialType::Image,
                &self.repo,
                Credentials::new(username.clone(), password.clone()),
            )),
            (None, None) => Ok(credentials),
            _ => anyhow::bail!("--username and --password must be given together"),
        }
    }
}

/// Runs the discover command.
///
/// # Errors
///
/// Returns an error if:
/// - The subscription flags are invalid
/// - The registry cannot be queried
/// - The result cannot be serialized
pub async fn run(args: &DiscoverArgs) -> Result<()> {
    let subscription = args.subscription()?;
    info!(
        repo = %args.repo,
        strategy = ?args.strategy,
        limit = args.limit,
        "Discovering images"
    );

    let oci = Arc::new(OciBackendFactory::default());
    let deps = SubscriberDeps::new(
        Arc::new(args.credentials()?),
        oci.clone(),
        Arc::new(GitCli::default()),
        Arc::new(HelmRepositories::new(oci)),
    )
    .context("Failed to build image selectors")?;
    let registry =
        SubscriberRegistry::with_builtins().context("Failed to build subscriber registry")?;

    let subscriber = registry
        .new_subscriber(&subscription, &deps, "default")
        .context("No subscriber for image subscription")?;
    let result = subscriber
        .discover(&CancellationToken::new())
        .await
        .with_context(|| format!("Failed to discover images in {}", args.repo))?;

    let DiscoveryResult::Image(images) = result else {
        anyhow::bail!("Unexpected discovery result for {}", args.repo);
    };
    info!(discovered = images.references.len(), "Discovery complete");
    println!("{}", serde_json::to_string_pretty(&images)?);
    Ok(())
}

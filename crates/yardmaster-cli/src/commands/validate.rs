//! Validate command implementation.
//!
//! Checks Warehouse manifests the way the controller would before
//! discovering anything: schema, patterns, version ranges, subscriber
//! coverage and the Freight-creation criteria expression.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use yardmaster_core::{ArtifactReference, GenericSubscription, Warehouse};
use yardmaster_warehouse::{validate_spec, Criteria, GenericSource, SubscriberRegistry};

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to a manifest file or a directory of manifests
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Generic subscription kinds served by the controller
    #[arg(long, value_delimiter = ',')]
    pub generic_kinds: Vec<String>,

    /// Show detailed output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Stands in for controller-side generic sources during validation.
struct EmptySource;

#[async_trait]
impl GenericSource for EmptySource {
    async fn discover(
        &self,
        _subscription: &GenericSubscription,
        _cancel: &CancellationToken,
    ) -> yardmaster_warehouse::Result<Vec<ArtifactReference>> {
        Ok(Vec::new())
    }
}

/// Outcome of checking one Warehouse.
#[derive(Debug)]
struct Finding {
    name: String,
    error: Option<String>,
}

/// Runs the validate command.
///
/// # Errors
///
/// Returns an error if a manifest cannot be read or parsed, or if any
/// Warehouse is invalid.
pub fn run(args: &ValidateArgs) -> Result<()> {
    info!(path = ?args.path, "Validating Warehouses");

    let mut registry =
        SubscriberRegistry::with_builtins().context("Failed to build subscriber registry")?;
    for kind in &args.generic_kinds {
        registry
            .register_generic(kind.clone(), Arc::new(EmptySource))
            .with_context(|| format!("Duplicate generic kind '{kind}'"))?;
    }

    let files = if args.path.is_file() {
        vec![args.path.clone()]
    } else if args.path.is_dir() {
        manifests_in(&args.path)?
    } else {
        anyhow::bail!("Path does not exist: {}", args.path.display());
    };

    let mut checked = 0;
    let mut failed = 0;
    for file in &files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let findings = check_manifest(&content, &registry)
            .with_context(|| format!("Failed to parse {}", file.display()))?;
        if args.verbose && findings.is_empty() {
            println!("- {}: no Warehouses", file.display());
        }
        for finding in findings {
            checked += 1;
            match finding.error {
                None => println!("✓ {} ({})", finding.name, file.display()),
                Some(error) => {
                    failed += 1;
                    println!("✗ {} ({}): {error}", finding.name, file.display());
                }
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {checked} Warehouses are invalid");
    }
    println!("\nValidated {checked} Warehouses");
    Ok(())
}

fn manifests_in(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "yaml" || e == "yml"))
        .collect();
    files.sort();
    Ok(files)
}

/// Checks every Warehouse document in a YAML stream; other kinds are skipped.
fn check_manifest(content: &str, registry: &SubscriberRegistry) -> Result<Vec<Finding>> {
    let mut findings = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.get("kind").and_then(serde_yaml::Value::as_str) != Some("Warehouse") {
            continue;
        }
        let name = value["metadata"]["name"]
            .as_str()
            .unwrap_or("<unnamed>")
            .to_string();
        let error = match serde_yaml::from_value::<Warehouse>(value) {
            Ok(warehouse) => check_warehouse(&warehouse, registry).err(),
            Err(e) => Some(e.to_string()),
        };
        findings.push(Finding { name, error });
    }
    Ok(findings)
}

fn check_warehouse(warehouse: &Warehouse, registry: &SubscriberRegistry) -> std::result::Result<(), String> {
    validate_spec(&warehouse.spec, registry)?;
    if let Some(expression) = warehouse.spec.criteria_expression() {
        Criteria::compile(expression).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: unrelated
---
apiVersion: yardmaster.dev/v1alpha1
kind: Warehouse
metadata:
  name: good
spec:
  subscriptions:
    - image:
        repoURL: ghcr.io/acme/api
        constraint: ">=1.0.0"
  freightCreationCriteria:
    expression: imageFrom("ghcr.io/acme/api").Tag != null
---
apiVersion: yardmaster.dev/v1alpha1
kind: Warehouse
metadata:
  name: bad-criteria
spec:
  subscriptions:
    - git:
        repoURL: https://github.com/acme/app
  freightCreationCriteria:
    expression: commitFrom(
---
apiVersion: yardmaster.dev/v1alpha1
kind: Warehouse
metadata:
  name: bad-interval
spec:
  interval: soon
  subscriptions:
    - image:
        repoURL: ghcr.io/acme/api
"#;

    fn registry() -> SubscriberRegistry {
        SubscriberRegistry::with_builtins().unwrap()
    }

    #[test]
    fn test_check_manifest() {
        let findings = check_manifest(MANIFEST, &registry()).unwrap();
        let names: Vec<_> = findings.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["good", "bad-criteria", "bad-interval"]);
        assert!(findings[0].error.is_none(), "{:?}", findings[0].error);
        assert!(findings[1].error.is_some());
        assert!(findings[2].error.as_deref().unwrap().contains("interval"));
    }

    #[test]
    fn test_generic_kinds_need_registration() {
        let manifest = r"
apiVersion: yardmaster.dev/v1alpha1
kind: Warehouse
metadata:
  name: bundles
spec:
  subscriptions:
    - generic:
        kind: bucket
        name: bundle
";
        let findings = check_manifest(manifest, &registry()).unwrap();
        assert!(findings[0].error.as_deref().unwrap().contains("no subscriber"));

        let mut registry = registry();
        registry.register_generic("bucket", Arc::new(EmptySource)).unwrap();
        let findings = check_manifest(manifest, &registry).unwrap();
        assert!(findings[0].error.is_none(), "{:?}", findings[0].error);
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(check_manifest("kind: [", &registry()).is_err());
    }
}

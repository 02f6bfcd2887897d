//! Freight synthesis from discovered artifacts.

use yardmaster_core::freight::{ChartReference, GitCommit, ImageReference};
use yardmaster_core::{DiscoveredArtifacts, Freight, FreightSpec, Warehouse};

use crate::error::Result;

fn incomplete(reason: String) -> yardmaster_core::Error {
    yardmaster_core::Error::IncompleteFreight { reason }
}

/// Builds the Freight holding the best artifact of every subscription.
///
/// The best artifact is the first of each ranked list. The Freight is named
/// after its content, so two calls over the same artifacts agree.
///
/// # Errors
///
/// Returns an error if a subscription discovered nothing.
pub fn build_freight(warehouse: &Warehouse, artifacts: &DiscoveredArtifacts) -> Result<Freight> {
    let name = warehouse.metadata.name.clone().unwrap_or_default();
    let mut spec = FreightSpec::from_warehouse(name);

    for result in &artifacts.git {
        let commit = result.commits.first().ok_or_else(|| {
            incomplete(format!("no commits discovered in {}", result.repo_url))
        })?;
        spec.commits.push(GitCommit::from_discovered(&result.repo_url, commit));
    }
    for result in &artifacts.images {
        let image = result.references.first().ok_or_else(|| {
            incomplete(format!("no images discovered in {}", result.repo_url))
        })?;
        spec.images
            .push(ImageReference::from_discovered(&result.repo_url, image));
    }
    for result in &artifacts.charts {
        let version = result.versions.first().ok_or_else(|| {
            incomplete(format!("no chart versions discovered in {}", result.repo_url))
        })?;
        spec.charts.push(ChartReference {
            repo_url: result.repo_url.clone(),
            name: result.name.clone(),
            version: version.clone(),
        });
    }
    for result in &artifacts.results {
        let reference = result.references.first().ok_or_else(|| {
            incomplete(format!("no artifact references discovered for {}", result.name))
        })?;
        spec.artifacts.push(reference.clone());
    }

    Ok(Freight::for_spec(warehouse.namespace_or_default(), spec))
}

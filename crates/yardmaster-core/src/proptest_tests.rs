//! Property-based tests for yardmaster-core types.
//!
//! These tests use proptest to verify invariants across many randomly generated inputs.

use std::collections::BTreeMap;
use std::time::Duration;

use proptest::prelude::*;

use crate::artifacts::ArtifactReference;
use crate::duration::{format_duration, parse_duration};
use crate::freight::{ChartReference, FreightSpec, GitCommit, ImageReference};

/// Strategy for generating repository URLs.
fn repo_url_strategy() -> impl Strategy<Value = String> {
    "(ghcr\\.io|quay\\.io|docker\\.io)/[a-z]{3,10}/[a-z][a-z0-9-]{2,15}"
}

/// Strategy for generating sha256 digests.
fn digest_strategy() -> impl Strategy<Value = String> {
    "[a-f0-9]{64}".prop_map(|hex| format!("sha256:{hex}"))
}

fn image_strategy() -> impl Strategy<Value = ImageReference> {
    (repo_url_strategy(), "[a-z0-9.]{1,10}", digest_strategy()).prop_map(
        |(repo_url, tag, digest)| ImageReference {
            repo_url,
            tag,
            digest,
            annotations: BTreeMap::new(),
        },
    )
}

fn commit_strategy() -> impl Strategy<Value = GitCommit> {
    (repo_url_strategy(), "[a-f0-9]{40}").prop_map(|(repo_url, id)| GitCommit {
        repo_url: format!("https://{repo_url}"),
        id,
        ..GitCommit::default()
    })
}

fn chart_strategy() -> impl Strategy<Value = ChartReference> {
    (repo_url_strategy(), 0u32..20, 0u32..20).prop_map(|(repo_url, minor, patch)| {
        ChartReference {
            repo_url: format!("oci://{repo_url}"),
            name: None,
            version: format!("1.{minor}.{patch}"),
        }
    })
}

fn artifact_strategy() -> impl Strategy<Value = ArtifactReference> {
    ("[a-z]{3,10}", "[a-z0-9.]{1,10}").prop_map(|(subscription_name, version)| {
        ArtifactReference {
            subscription_name,
            version,
            metadata: BTreeMap::new(),
        }
    })
}

proptest! {
    #[test]
    fn freight_id_is_order_independent(
        images in prop::collection::vec(image_strategy(), 0..5),
        commits in prop::collection::vec(commit_strategy(), 0..5),
        charts in prop::collection::vec(chart_strategy(), 0..5),
        artifacts in prop::collection::vec(artifact_strategy(), 0..5),
    ) {
        let mut forward = FreightSpec::from_warehouse("app");
        forward.images.clone_from(&images);
        forward.commits.clone_from(&commits);
        forward.charts.clone_from(&charts);
        forward.artifacts.clone_from(&artifacts);

        let mut reversed = FreightSpec::from_warehouse("app");
        reversed.images = images.into_iter().rev().collect();
        reversed.commits = commits.into_iter().rev().collect();
        reversed.charts = charts.into_iter().rev().collect();
        reversed.artifacts = artifacts.into_iter().rev().collect();

        prop_assert_eq!(forward.generate_id(), reversed.generate_id());
    }

    #[test]
    fn freight_id_is_hex_sha256(images in prop::collection::vec(image_strategy(), 1..4)) {
        let mut freight = FreightSpec::from_warehouse("app");
        freight.images = images;
        let id = freight.generate_id();
        prop_assert_eq!(id.len(), 64);
        prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn duration_format_parses_back(secs in 0u64..1_000_000) {
        let duration = Duration::from_secs(secs);
        let rendered = format_duration(duration);
        prop_assert_eq!(parse_duration(&rendered).unwrap(), duration);
    }
}

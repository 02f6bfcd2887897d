//! `SemVer` strategy: tags parsed as semantic versions, highest first.

use async_trait::async_trait;
use semver::Version;
use tokio_util::sync::CancellationToken;

use super::{Selector, SelectorOptions};
use crate::client::RepositoryClient;
use crate::error::Result;
use crate::image::Image;
use crate::version::{parse_version, VersionConstraint};

/// A tag together with its parsed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemverTag {
    /// Original tag string.
    pub tag: String,
    /// Parsed version.
    pub version: Version,
}

/// Ranks tags by semantic version.
#[derive(Debug, Clone)]
pub struct SemverSelector {
    client: RepositoryClient,
    constraint: Option<VersionConstraint>,
    options: SelectorOptions,
}

impl SemverSelector {
    /// Creates a selector.
    ///
    /// # Errors
    ///
    /// Returns an error if the constraint is not a valid semver range.
    pub fn new(client: RepositoryClient, options: SelectorOptions) -> Result<Self> {
        Ok(Self {
            client,
            constraint: options.version_constraint()?,
            options,
        })
    }

    /// Keeps the tags that pass the filter, parse as versions and satisfy the
    /// constraint.
    #[must_use]
    pub fn candidates(&self, tags: Vec<String>) -> Vec<SemverTag> {
        tags.into_iter()
            .filter(|tag| self.options.filter.allows(tag))
            .filter_map(|tag| {
                let version = parse_version(&tag, self.options.strict_semvers)?;
                Some(SemverTag { tag, version })
            })
            .filter(|t| self.constraint.as_ref().is_none_or(|c| c.matches(&t.version)))
            .collect()
    }

    /// Sorts highest version first. Versions of equal precedence rank the
    /// lexically greater original tag first, so `1.0.0` precedes `1.0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_registry::{parse_version, SemverSelector, SemverTag};
    ///
    /// let mut tags: Vec<SemverTag> = ["1.0.0", "1.0", "2.0.0"]
    ///     .iter()
    ///     .map(|t| SemverTag { tag: t.to_string(), version: parse_version(t, false).unwrap() })
    ///     .collect();
    /// SemverSelector::sort(&mut tags);
    /// let order: Vec<_> = tags.iter().map(|t| t.tag.as_str()).collect();
    /// assert_eq!(order, ["2.0.0", "1.0.0", "1.0"]);
    /// ```
    pub fn sort(tags: &mut [SemverTag]) {
        tags.sort_by(|a, b| {
            b.version
                .cmp_precedence(&a.version)
                .then_with(|| b.tag.cmp(&a.tag))
        });
    }
}

#[async_trait]
impl Selector for SemverSelector {
    async fn select(&self, cancel: &CancellationToken) -> Result<Vec<Image>> {
        let mut candidates = self.candidates(self.client.tags(cancel).await?);
        Self::sort(&mut candidates);
        tracing::debug!(
            repository = %self.client.repo_url(),
            candidates = candidates.len(),
            "Resolving tags in semver order"
        );

        let mut images = Vec::new();
        for candidate in candidates {
            if self.options.limit_reached(images.len()) {
                break;
            }
            if let Some(mut image) = self
                .client
                .get_image_by_tag(&candidate.tag, self.options.platform.as_ref(), cancel)
                .await?
            {
                image.semver = Some(candidate.version);
                images.push(image);
            }
        }
        Ok(images)
    }
}

//! Resolved image metadata and platform constraints.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use yardmaster_core::DiscoveredImageReference;

use crate::error::RegistryError;
use crate::oci::Platform;

/// Image metadata resolved from a registry.
///
/// The digest is the stable identity. The tag is whatever the image was looked
/// up by and is only meaningful at discovery time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Tag the image was resolved from; empty when resolved by digest.
    pub tag: String,

    /// Digest of the manifest or, for multi-platform images, of the index.
    pub digest: String,

    /// Creation time, when known.
    pub created_at: Option<DateTime<Utc>>,

    /// Merged annotations.
    pub annotations: BTreeMap<String, String>,

    /// Platforms the image is available for; empty when unknown.
    pub platforms: Vec<PlatformVariant>,

    /// For multi-platform images, the variant whose manifest supplied the
    /// creation time and annotations.
    pub resolved_for: Option<PlatformVariant>,

    /// Parsed semantic version of the tag, set by the `SemVer` selector.
    pub semver: Option<semver::Version>,
}

impl Image {
    /// Converts to the reference recorded in Warehouse status.
    #[must_use]
    pub fn to_discovered(&self) -> DiscoveredImageReference {
        DiscoveredImageReference {
            tag: self.tag.clone(),
            digest: self.digest.clone(),
            annotations: self.annotations.clone(),
            created_at: self.created_at,
        }
    }
}

/// One platform-specific manifest of an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformVariant {
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// CPU variant; empty when not applicable.
    pub variant: String,
    /// Digest of the platform-specific manifest.
    pub digest: String,
    /// Annotations of the platform-specific manifest descriptor.
    pub annotations: BTreeMap<String, String>,
}

impl PlatformVariant {
    /// Builds a variant from an OCI platform.
    #[must_use]
    pub fn from_platform(platform: &Platform, digest: impl Into<String>) -> Self {
        Self {
            os: platform.os.clone(),
            arch: platform.architecture.clone(),
            variant: platform.variant.clone().unwrap_or_default(),
            digest: digest.into(),
            annotations: BTreeMap::new(),
        }
    }
}

/// An `os/arch[/variant]` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlatformConstraint {
    /// Operating system.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// CPU variant; empty matches only variant-less platforms.
    pub variant: String,
}

impl PlatformConstraint {
    /// Returns true if `platform` matches on all three fields.
    #[must_use]
    pub fn matches_platform(&self, platform: &Platform) -> bool {
        self.os == platform.os
            && self.arch == platform.architecture
            && self.variant == platform.variant.as_deref().unwrap_or_default()
    }

    /// Returns true if the image has a variant matching all three fields.
    ///
    /// Images whose platforms are unknown satisfy every constraint.
    #[must_use]
    pub fn matches(&self, image: &Image) -> bool {
        image.platforms.is_empty() || image.platforms.iter().any(|p| self.matches_variant(p))
    }

    /// Returns true if `variant` matches all three fields.
    #[must_use]
    pub fn matches_variant(&self, variant: &PlatformVariant) -> bool {
        variant.os == self.os && variant.arch == self.arch && variant.variant == self.variant
    }
}

impl FromStr for PlatformConstraint {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidPlatform {
            platform: s.to_string(),
        };
        let parts: Vec<&str> = s.trim().split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        match parts.as_slice() {
            [os, arch] => Ok(Self {
                os: (*os).to_string(),
                arch: (*arch).to_string(),
                variant: String::new(),
            }),
            [os, arch, variant] => Ok(Self {
                os: (*os).to_string(),
                arch: (*arch).to_string(),
                variant: (*variant).to_string(),
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for PlatformConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)?;
        if !self.variant.is_empty() {
            write!(f, "/{}", self.variant)?;
        }
        Ok(())
    }
}

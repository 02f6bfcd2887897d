//! OCI Distribution Specification types.
//!
//! Covers the subset of the image and distribution specs needed to read
//! image metadata: manifests, indexes, image configs and tag lists, in both
//! their OCI and Docker v2 flavors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Annotation holding the image creation time.
pub const ANNOTATION_CREATED: &str = "org.opencontainers.image.created";

/// Legacy label-schema annotation holding the build date.
pub const ANNOTATION_BUILD_DATE: &str = "org.label-schema.build-date";

/// Media type constants.
pub struct MediaType;

impl MediaType {
    /// OCI image manifest.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// Docker v2 schema 2 manifest.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// Docker manifest list.
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Every manifest type this crate accepts, for the `Accept` header.
    pub const ACCEPT_ALL: [&'static str; 4] = [
        Self::OCI_INDEX,
        Self::DOCKER_MANIFEST_LIST,
        Self::OCI_MANIFEST,
        Self::DOCKER_MANIFEST,
    ];

    /// Returns true if the media type denotes a multi-platform index.
    #[must_use]
    pub fn is_index(media_type: &str) -> bool {
        media_type == Self::OCI_INDEX || media_type == Self::DOCKER_MANIFEST_LIST
    }

    /// Returns true if the media type denotes a single image manifest.
    #[must_use]
    pub fn is_manifest(media_type: &str) -> bool {
        media_type == Self::OCI_MANIFEST || media_type == Self::DOCKER_MANIFEST
    }
}

/// Platform a manifest was built for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system.
    pub os: String,

    /// CPU architecture.
    pub architecture: String,

    /// CPU variant (`v7`, `v8`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// Creates a platform.
    #[must_use]
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// Returns true for the `unknown/unknown` entries registries use for
    /// attestation manifests.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.os == "unknown" && self.architecture == "unknown"
    }
}

/// OCI content descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(default)]
    pub media_type: String,

    /// Digest of the targeted content.
    pub digest: String,

    /// Size in bytes of the content.
    #[serde(default)]
    pub size: u64,

    /// Platform, present on index entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// Single-platform image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this manifest.
    #[serde(default)]
    pub media_type: Option<String>,

    /// Image config descriptor.
    pub config: Descriptor,

    /// Layers.
    #[serde(default)]
    pub layers: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// Multi-platform image index (or Docker manifest list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this index.
    #[serde(default)]
    pub media_type: Option<String>,

    /// Per-platform manifests.
    #[serde(default)]
    pub manifests: Vec<Descriptor>,

    /// Optional annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
}

/// Image configuration blob (the fields needed for discovery).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Creation time recorded by the builder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,

    /// Operating system.
    #[serde(default)]
    pub os: String,

    /// CPU architecture.
    #[serde(default)]
    pub architecture: String,

    /// CPU variant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    /// Runtime configuration, which carries the labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,
}

impl ImageConfig {
    /// Returns the config labels, if any.
    #[must_use]
    pub fn labels(&self) -> Option<&HashMap<String, String>> {
        self.config.as_ref().and_then(|c| c.labels.as_ref())
    }

    /// Returns the platform this config was built for, if recorded.
    #[must_use]
    pub fn platform(&self) -> Option<Platform> {
        (!self.os.is_empty() && !self.architecture.is_empty()).then(|| Platform {
            os: self.os.clone(),
            architecture: self.architecture.clone(),
            variant: self.variant.clone(),
        })
    }
}

/// Runtime configuration section of an image config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Image labels.
    #[serde(rename = "Labels", default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Response of the tag listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagList {
    /// Repository name.
    #[serde(default)]
    pub name: String,

    /// Tags; registries return `null` for empty repositories.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// A manifest or index returned for a tag or digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestResponse {
    /// A single-platform manifest.
    Manifest {
        /// Digest of the manifest.
        digest: String,
        /// The manifest.
        manifest: ImageManifest,
    },
    /// A multi-platform index.
    Index {
        /// Digest of the index.
        digest: String,
        /// The index.
        index: ImageIndex,
    },
}

impl ManifestResponse {
    /// Returns the digest of the response.
    #[must_use]
    pub fn digest(&self) -> &str {
        match self {
            Self::Manifest { digest, .. } | Self::Index { digest, .. } => digest,
        }
    }

    /// Decodes a manifest body.
    ///
    /// The media type is taken from the body when present, otherwise from the
    /// `Content-Type` of the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON or the media type is
    /// neither a manifest nor an index.
    pub fn decode(
        reference: &str,
        content_type: Option<&str>,
        digest: String,
        body: &[u8],
    ) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Envelope {
            media_type: Option<String>,
            manifests: Option<serde_json::Value>,
        }

        let envelope: Envelope = serde_json::from_slice(body)?;
        let media_type = envelope
            .media_type
            .or_else(|| content_type.map(|c| c.split(';').next().unwrap_or(c).trim().to_string()))
            .unwrap_or_default();

        if MediaType::is_index(&media_type) || (media_type.is_empty() && envelope.manifests.is_some())
        {
            Ok(Self::Index {
                digest,
                index: serde_json::from_slice(body)?,
            })
        } else if MediaType::is_manifest(&media_type) || media_type.is_empty() {
            Ok(Self::Manifest {
                digest,
                manifest: serde_json::from_slice(body)?,
            })
        } else {
            Err(RegistryError::UnsupportedMediaType {
                media_type,
                reference: reference.to_string(),
            })
        }
    }
}

/// Determines the creation time of an image.
///
/// Sources are consulted in order: the `created` annotation, the same key as
/// a config label, the legacy build-date annotation, the same key as a config
/// label, and finally the config's own `created` field.
#[must_use]
pub fn creation_time<S: std::hash::BuildHasher>(
    annotations: &std::collections::BTreeMap<String, String>,
    labels: Option<&HashMap<String, String, S>>,
    config_created: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let label = |key: &str| labels.and_then(|l| l.get(key));
    [
        annotations.get(ANNOTATION_CREATED),
        label(ANNOTATION_CREATED),
        annotations.get(ANNOTATION_BUILD_DATE),
        label(ANNOTATION_BUILD_DATE),
    ]
    .into_iter()
    .flatten()
    .find_map(|value| parse_timestamp(value))
    .or(config_created)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

//! Semantic version parsing for tags.
//!
//! Tags commonly carry a leading `v` and are sometimes partial (`1.2`). Strict
//! mode accepts only complete versions; lenient mode pads missing components
//! with zeros.

use semver::{Version, VersionReq};

use crate::error::{RegistryError, Result};

/// Parses a tag as a semantic version.
///
/// Returns `None` if the tag is not a version.
///
/// # Examples
///
/// ```
/// use yardmaster_registry::parse_version;
///
/// assert_eq!(parse_version("v1.2.3", true).unwrap().to_string(), "1.2.3");
/// assert!(parse_version("1.2", true).is_none());
/// assert_eq!(parse_version("1.2", false).unwrap().to_string(), "1.2.0");
/// ```
#[must_use]
pub fn parse_version(tag: &str, strict: bool) -> Option<Version> {
    let raw = tag.strip_prefix(['v', 'V']).unwrap_or(tag);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    if strict {
        return None;
    }

    let split = raw.find(['-', '+']).unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty()
        || parts.len() > 3
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let mut padded = parts
        .iter()
        .map(|p| p.trim_start_matches('0'))
        .map(|p| if p.is_empty() { "0" } else { p })
        .collect::<Vec<_>>();
    padded.resize(3, "0");
    Version::parse(&format!("{}{suffix}", padded.join("."))).ok()
}

/// A semantic version range such as `^1.2` or `>=1.0, <2.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint(VersionReq);

impl VersionConstraint {
    /// Parses a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConstraint`] if the range is malformed.
    pub fn parse(constraint: &str) -> Result<Self> {
        VersionReq::parse(constraint.trim())
            .map(Self)
            .map_err(|source| RegistryError::InvalidConstraint {
                constraint: constraint.to_string(),
                source,
            })
    }

    /// Returns true if the version satisfies the range.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.0.matches(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parsing() {
        assert!(parse_version("1.0.0", true).is_some());
        assert!(parse_version("v2.1.0-rc.1", true).is_some());
        assert!(parse_version("1.0", true).is_none());
        assert!(parse_version("latest", true).is_none());
    }

    #[test]
    fn test_lenient_parsing_pads() {
        assert_eq!(parse_version("1", false).unwrap(), Version::new(1, 0, 0));
        assert_eq!(parse_version("v1.2", false).unwrap(), Version::new(1, 2, 0));
        assert_eq!(
            parse_version("1.2-alpha", false).unwrap().to_string(),
            "1.2.0-alpha"
        );
        assert_eq!(parse_version("01.02", false).unwrap(), Version::new(1, 2, 0));
        assert!(parse_version("1.2.3.4", false).is_none());
        assert!(parse_version("main", false).is_none());
        assert!(parse_version("1..2", false).is_none());
    }

    #[test]
    fn test_constraint() {
        let constraint = VersionConstraint::parse(">=1.2, <2.0").unwrap();
        assert!(constraint.matches(&Version::new(1, 5, 0)));
        assert!(!constraint.matches(&Version::new(2, 0, 0)));
        assert!(VersionConstraint::parse("not a range").is_err());
    }
}

//! Tag allow/ignore filtering.

use regex::Regex;

use crate::error::{RegistryError, Result};

/// Filters tags by regular expressions.
///
/// A tag passes when it matches no ignore pattern and, if allow patterns are
/// configured, at least one allow pattern.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    allow: Vec<Regex>,
    ignore: Vec<Regex>,
}

impl TagFilter {
    /// Compiles a filter.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidTagPattern`] for the first pattern that
    /// fails to compile.
    ///
    /// # Examples
    ///
    /// ```
    /// use yardmaster_registry::TagFilter;
    ///
    /// let filter = TagFilter::new(&["^v".to_string()], &["-rc".to_string()]).unwrap();
    /// assert!(filter.allows("v1.0.0"));
    /// assert!(!filter.allows("v1.0.0-rc1"));
    /// assert!(!filter.allows("1.0.0"));
    /// ```
    pub fn new(allow: &[String], ignore: &[String]) -> Result<Self> {
        Ok(Self {
            allow: compile(allow)?,
            ignore: compile(ignore)?,
        })
    }

    /// Returns true if the tag passes the filter.
    #[must_use]
    pub fn allows(&self, tag: &str) -> bool {
        if self.ignore.iter().any(|re| re.is_match(tag)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(tag))
    }

    /// Keeps the tags that pass the filter, preserving order.
    #[must_use]
    pub fn apply(&self, tags: Vec<String>) -> Vec<String> {
        tags.into_iter().filter(|tag| self.allows(tag)).collect()
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| RegistryError::InvalidTagPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

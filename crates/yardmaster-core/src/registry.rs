//! Ordered predicate-to-factory tables.
//!
//! Both the image selector registry and the subscriber registry are built on
//! [`Registry`]: entries are evaluated in registration order and the first
//! predicate that matches wins. Each entry carries a discriminant; registering
//! the same discriminant twice is rejected so that shadowed entries surface at
//! startup instead of at request time.

use std::fmt;

use crate::error::{Error, Result};

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Entry<T: ?Sized, F> {
    key: String,
    predicate: Predicate<T>,
    factory: F,
}

/// Ordered list of `(discriminant, predicate, factory)` entries.
pub struct Registry<T: ?Sized, F> {
    entries: Vec<Entry<T, F>>,
}

impl<T: ?Sized, F> Registry<T, F> {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateRegistration`] if `key` is already present.
    pub fn register<P>(&mut self, key: impl Into<String>, predicate: P, factory: F) -> Result<()>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let key = key.into();
        if self.contains(&key) {
            return Err(Error::DuplicateRegistration { key });
        }
        self.entries.push(Entry {
            key,
            predicate: Box::new(predicate),
            factory,
        });
        Ok(())
    }

    /// Returns the factory of the first entry whose predicate matches `value`.
    pub fn resolve(&self, value: &T) -> Option<&F> {
        self.entries
            .iter()
            .find(|entry| (entry.predicate)(value))
            .map(|entry| &entry.factory)
    }

    /// Returns true if an entry with the given discriminant exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// Iterates over the registered discriminants in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: ?Sized, F> Default for Registry<T, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, F> fmt::Debug for Registry<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

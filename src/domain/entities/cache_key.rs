//! Memory cache key.

use std::collections::BTreeMap;
use std::fmt;

/// Extra holding the `|`-joined cache keys of a request's transformations.
pub(crate) const TRANSFORMATIONS_EXTRA: &str = "imagepipe#transformations";
/// Extra holding the resolved size when transformations are present.
pub(crate) const SIZE_EXTRA: &str = "imagepipe#size";

/// Identity of a decoded image in the memory cache.
///
/// The base key identifies the data reference; extras fingerprint everything
/// else that changes the decoded output (transformations, and the size they
/// were applied at). Extras are kept sorted so equality and hashing are stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    key: String,
    extras: BTreeMap<String, String>,
}

impl CacheKey {
    /// Creates a key with no extras.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            extras: BTreeMap::new(),
        }
    }

    /// Adds an extra fingerprint component.
    #[must_use]
    pub fn with_extra(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(name.into(), value.into());
        self
    }

    /// Returns the base key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the extras.
    #[must_use]
    pub fn extras(&self) -> &BTreeMap<String, String> {
        &self.extras
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)?;
        for (name, value) in &self.extras {
            write!(f, "#{name}={value}")?;
        }
        Ok(())
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

//! The data reference a request loads from.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Opaque reference to the resource an [`ImageRequest`](super::ImageRequest) loads.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Data {
    /// No data. Requests complete with the fallback image.
    #[default]
    None,
    /// A URI such as `https://...`, `file:///...` or any custom scheme.
    Uri(String),
    /// A local file path.
    Path(PathBuf),
    /// An in-memory encoded blob.
    Bytes(Bytes),
}

impl Data {
    /// Creates a URI reference.
    #[must_use]
    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }

    /// Parses a command-line style reference: anything with a `scheme://`
    /// prefix is a URI, everything else a path.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        if input.contains("://") {
            Self::Uri(input.to_string())
        } else {
            Self::Path(PathBuf::from(input))
        }
    }

    /// Returns true if there is no data.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the URI scheme, lowercased, if this is a URI.
    #[must_use]
    pub fn scheme(&self) -> Option<String> {
        match self {
            Self::Uri(uri) => uri
                .split_once(':')
                .map(|(scheme, _)| scheme.to_ascii_lowercase())
                .filter(|scheme| !scheme.is_empty()),
            _ => None,
        }
    }

    /// Returns the local path for `Path` data and `file://` URIs.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Uri(uri) => uri.strip_prefix("file://").map(Path::new),
            _ => None,
        }
    }

    /// Key under which the source bytes are stored in the disk cache.
    ///
    /// Only remote URIs are disk cached; local files and blobs are already
    /// cheap to re-read.
    #[must_use]
    pub fn disk_cache_key(&self) -> Option<String> {
        match self {
            Self::Uri(uri) if self.local_path().is_none() => Some(uri.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "Data::None"),
            Self::Uri(uri) => write!(f, "Data::Uri({uri})"),
            Self::Path(path) => write!(f, "Data::Path({})", path.display()),
            Self::Bytes(bytes) => write!(f, "Data::Bytes({} bytes)", bytes.len()),
        }
    }
}

impl fmt::Display for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "<none>"),
            Self::Uri(uri) => write!(f, "{uri}"),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for Data {
    fn from(s: &str) -> Self {
        Self::Uri(s.to_string())
    }
}

impl From<String> for Data {
    fn from(s: String) -> Self {
        Self::Uri(s)
    }
}

impl From<PathBuf> for Data {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Bytes> for Data {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

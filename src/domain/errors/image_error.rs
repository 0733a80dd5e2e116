//! Request failure types.

use thiserror::Error;

/// Why a request produced an [`ErrorResult`](crate::domain::entities::ErrorResult).
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum ImageError {
    #[error("request data is null")]
    NullData,

    #[error("no fetcher supports data: {data}")]
    NoFetcher { data: String },

    #[error("no decoder supports the fetched source (mime type: {mime_type})")]
    NoDecoder { mime_type: String },

    #[error("failed to fetch {data}: {message}")]
    Fetch { data: String, message: String },

    #[error("network access is disabled for {data}")]
    NetworkDisabled { data: String },

    #[error("failed to decode image: {message}")]
    Decode { message: String },

    #[error("transformation {key} failed: {message}")]
    Transformation { key: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal pipeline error: {message}")]
    Internal { message: String },
}

impl ImageError {
    /// Creates a missing-fetcher error.
    #[must_use]
    pub fn no_fetcher(data: impl ToString) -> Self {
        Self::NoFetcher {
            data: data.to_string(),
        }
    }

    /// Creates a missing-decoder error.
    #[must_use]
    pub fn no_decoder(mime_type: Option<&str>) -> Self {
        Self::NoDecoder {
            mime_type: mime_type.unwrap_or("unknown").to_string(),
        }
    }

    /// Creates fetch error.
    #[must_use]
    pub fn fetch(data: impl ToString, message: impl Into<String>) -> Self {
        Self::Fetch {
            data: data.to_string(),
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates transformation error.
    #[must_use]
    pub fn transformation(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transformation {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns whether no component could handle the request.
    #[must_use]
    pub const fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::NoFetcher { .. } | Self::NoDecoder { .. })
    }

    /// Returns whether the failure happened while fetching.
    #[must_use]
    pub const fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            Self::Fetch { .. } | Self::NetworkDisabled { .. } | Self::Io(_)
        )
    }

    /// Returns whether the failure happened while decoding.
    #[must_use]
    pub const fn is_decode_failure(&self) -> bool {
        matches!(self, Self::Decode { .. })
    }
}

/// Returned instead of a result when a request is cancelled.
///
/// Cancellation is not a failure: the cancelled caller simply gets no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request was cancelled")]
pub struct Cancelled;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ImageError::no_fetcher("x").is_resolution_failure());
        assert!(ImageError::no_decoder(None).is_resolution_failure());
        assert!(ImageError::fetch("x", "boom").is_fetch_failure());
        assert!(ImageError::decode("bad").is_decode_failure());
        assert!(!ImageError::decode("bad").is_resolution_failure());
    }

    #[test]
    fn test_messages_name_the_cause() {
        assert_eq!(
            ImageError::no_decoder(Some("image/x-foo")).to_string(),
            "no decoder supports the fetched source (mime type: image/x-foo)"
        );
        assert_eq!(
            ImageError::decode("truncated header").to_string(),
            "failed to decode image: truncated header"
        );
    }
}

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::application::ImageLoader;
use crate::domain::entities::{Data, DataSource, Options};
use crate::domain::errors::ImageError;
use crate::domain::ports::{FetchResult, Fetcher, FetcherFactory, FileSystem, SourceResult};

/// Reads local files through the request's [`FileSystem`].
pub struct FileFetcher {
    path: PathBuf,
    file_system: Arc<dyn FileSystem>,
}

impl FileFetcher {
    /// Creates a fetcher for `path`.
    #[must_use]
    pub fn new(path: PathBuf, file_system: Arc<dyn FileSystem>) -> Self {
        Self { path, file_system }
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self) -> Result<FetchResult, ImageError> {
        let source = self
            .file_system
            .read(&self.path)
            .await
            .map_err(|e| ImageError::fetch(self.path.display(), e.to_string()))?;
        trace!(path = %self.path.display(), size = source.len(), "Read local file");

        Ok(FetchResult::Source(SourceResult {
            source,
            mime_type: mime_type_for_path(&self.path).map(str::to_owned),
            data_source: DataSource::Disk,
        }))
    }
}

impl std::fmt::Debug for FileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileFetcher")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Accepts [`Data::Path`] and `file://` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcherFactory;

impl FetcherFactory for FileFetcherFactory {
    fn create(&self, data: &Data, options: &Options, _: &ImageLoader) -> Option<Box<dyn Fetcher>> {
        let path = data.local_path()?;
        Some(Box::new(FileFetcher::new(
            path.to_path_buf(),
            Arc::clone(&options.file_system),
        )))
    }
}

/// Guesses a mime type from a file extension.
#[must_use]
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::LocalFileSystem;

    #[tokio::test]
    async fn test_reads_file_with_mime_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.PNG");
        std::fs::write(&path, b"png bytes").unwrap();

        let fetcher = FileFetcher::new(path, Arc::new(LocalFileSystem));
        let FetchResult::Source(source) = fetcher.fetch().await.unwrap() else {
            panic!("expected source");
        };

        assert_eq!(&source.source[..], b"png bytes");
        assert_eq!(source.mime_type.as_deref(), Some("image/png"));
        assert_eq!(source.data_source, DataSource::Disk);
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_error() {
        let fetcher = FileFetcher::new(PathBuf::from("/nonexistent/x.png"), Arc::new(LocalFileSystem));
        let error = fetcher.fetch().await.unwrap_err();
        assert!(error.is_fetch_failure());
    }
}

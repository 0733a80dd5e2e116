//! Port for local file access.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

/// File system used by local fetchers and keyers.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Reads the whole file.
    async fn read(&self, path: &Path) -> std::io::Result<Bytes>;

    /// Last modification time in milliseconds since the epoch.
    async fn modified_millis(&self, path: &Path) -> std::io::Result<u64>;
}

/// The host file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read(&self, path: &Path) -> std::io::Result<Bytes> {
        tokio::fs::read(path).await.map(Bytes::from)
    }

    async fn modified_millis(&self, path: &Path) -> std::io::Result<u64> {
        let modified = tokio::fs::metadata(path).await?.modified()?;
        let millis = chrono::DateTime::<chrono::Utc>::from(modified).timestamp_millis();
        Ok(u64::try_from(millis).unwrap_or(0))
    }
}

//! Exclusive write handle on one disk cache entry.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{DiskCache, DiskMetadata};
use crate::domain::errors::{CacheError, CacheResult};

/// Writes a new value for one key.
///
/// Data and metadata go to temporary files that are renamed into place only by
/// [`commit`](Self::commit). Dropping an editor without committing aborts it
/// and deletes the temporary files, so partial writes are never visible.
#[derive(Debug)]
pub struct Editor {
    cache: DiskCache,
    key: String,
    name: String,
    id: u64,
    data_tmp: PathBuf,
    meta_tmp: PathBuf,
    data_written: bool,
    meta_written: bool,
    closed: bool,
}

impl Editor {
    pub(super) fn new(cache: DiskCache, key: String, name: String, id: u64) -> Self {
        let data_tmp = cache.data_path(&name).with_extension("data.tmp");
        let meta_tmp = cache.meta_path(&name).with_extension("meta.tmp");
        Self {
            cache,
            key,
            name,
            id,
            data_tmp,
            meta_tmp,
            data_written: false,
            meta_written: false,
            closed: false,
        }
    }

    /// The key being written.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Writes the entry's data, replacing anything written before.
    ///
    /// # Errors
    /// Returns error if the temporary file cannot be written.
    pub async fn write_data(&mut self, bytes: &[u8]) -> CacheResult<()> {
        write_file(&self.data_tmp, bytes).await?;
        self.data_written = true;
        Ok(())
    }

    /// Writes the entry's metadata, replacing anything written before.
    ///
    /// # Errors
    /// Returns error if the metadata cannot be serialized or written.
    pub async fn write_metadata(&mut self, metadata: &DiskMetadata) -> CacheResult<()> {
        let json = serde_json::to_vec(metadata)?;
        write_file(&self.meta_tmp, &json).await?;
        self.meta_written = true;
        Ok(())
    }

    /// Publishes the written files and records the entry in the journal.
    ///
    /// # Errors
    /// Returns error if no data was written or the files cannot be moved into
    /// place. The edit is aborted in either case.
    pub async fn commit(mut self) -> CacheResult<()> {
        if !self.data_written {
            return Err(CacheError::EditorClosed("data was written"));
        }

        let data_path = self.cache.data_path(&self.name);
        let meta_path = self.cache.meta_path(&self.name);

        let data_len = fs::metadata(&self.data_tmp).await?.len();
        let meta_len = if self.meta_written {
            fs::metadata(&self.meta_tmp).await?.len()
        } else {
            0
        };

        // Metadata first: a data file is what makes an entry visible on rebuild.
        if self.meta_written {
            fs::rename(&self.meta_tmp, &meta_path).await?;
        } else if let Err(e) = fs::remove_file(&meta_path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            return Err(e.into());
        }
        fs::rename(&self.data_tmp, &data_path).await?;

        // The edit stays open until the index knows the new files, so a
        // concurrent remove or eviction leaves them to this commit.
        let (name, id, size) = (self.name.clone(), self.id, data_len + meta_len);
        self.cache
            .run_blocking(move |cache| cache.commit_edit(&name, id, size))
            .await?;
        self.closed = true;
        debug!(key = %self.key, size = data_len + meta_len, "Committed disk cache entry");
        Ok(())
    }

    /// Discards the edit.
    pub fn abort(self) {}
}

impl Drop for Editor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        for path in [&self.data_tmp, &self.meta_tmp] {
            if let Err(e) = std::fs::remove_file(path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove aborted cache file");
            }
        }
        self.cache.abort_edit(&self.name, self.id);
        debug!(key = %self.key, "Aborted disk cache edit");
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_data().await
}

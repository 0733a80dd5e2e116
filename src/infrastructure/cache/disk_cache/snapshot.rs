//! Read handle over one committed disk cache entry.

use std::io::SeekFrom;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::DiskMetadata;
use crate::domain::errors::CacheResult;

/// Open handles on an entry's data and metadata files.
///
/// The files are opened when the snapshot is taken, so the snapshot keeps
/// reading the committed bytes even if the entry is evicted, removed or
/// replaced afterwards.
#[derive(Debug)]
pub struct Snapshot {
    key: String,
    data: File,
    metadata: Option<File>,
    data_len: u64,
}

impl Snapshot {
    pub(super) fn new(key: String, data: File, metadata: Option<File>, data_len: u64) -> Self {
        Self {
            key,
            data,
            metadata,
            data_len,
        }
    }

    /// The key this snapshot was taken for.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Length of the data file when the snapshot was taken.
    #[must_use]
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Reads the whole data file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read.
    pub async fn read_data(&mut self) -> CacheResult<Bytes> {
        let capacity = usize::try_from(self.data_len).unwrap_or(0);
        let mut buf = Vec::with_capacity(capacity);
        self.data.seek(SeekFrom::Start(0)).await?;
        self.data.read_to_end(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Reads and parses the metadata file, if the entry has one.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not valid metadata.
    pub async fn read_metadata(&mut self) -> CacheResult<Option<DiskMetadata>> {
        let Some(file) = self.metadata.as_mut() else {
            return Ok(None);
        };
        let mut buf = Vec::new();
        file.seek(SeekFrom::Start(0)).await?;
        file.read_to_end(&mut buf).await?;
        Ok(Some(serde_json::from_slice(&buf)?))
    }
}

//! Chunk planning and byte-range reads
//!
//! A file is split into fixed-size, contiguous, non-overlapping ranges that
//! together cover `[0, total_file_size)`. A zero-byte file plans to zero chunks.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tracing::debug;

use crate::error::{Result, UploadError};

/// One contiguous byte range of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based part index
    pub index: usize,
    pub byte_start: u64,
    /// Inclusive end offset
    pub byte_end: u64,
    pub total_parts: usize,
    pub total_file_size: u64,
}

impl Chunk {
    /// Number of bytes in this chunk
    pub fn size(&self) -> u64 {
        self.byte_end - self.byte_start + 1
    }

    /// Half-open range covered by this chunk
    pub fn range(&self) -> std::ops::Range<u64> {
        self.byte_start..self.byte_end + 1
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total_parts
    }

    /// Open the source file positioned at this chunk, limited to its length.
    ///
    /// Each call opens a fresh handle; it is closed when the returned reader
    /// is dropped, whichever way the attempt ends.
    pub async fn open_reader(&self, file_path: &Path) -> Result<Take<File>> {
        let mut file = File::open(file_path)
            .await
            .map_err(|e| UploadError::filesystem(file_path, e))?;
        file.seek(SeekFrom::Start(self.byte_start))
            .await
            .map_err(|e| UploadError::filesystem(file_path, e))?;

        debug!(
            "Opened chunk #{}: bytes={}-{}, size={} bytes",
            self.index,
            self.byte_start,
            self.byte_end,
            self.size()
        );

        Ok(file.take(self.size()))
    }
}

/// Number of chunks a file of `total_file_size` bytes splits into
pub fn chunk_count(total_file_size: u64, chunk_size: u64) -> Result<usize> {
    if chunk_size == 0 {
        return Err(UploadError::InvalidArgument(
            "chunk size must be greater than zero".to_string(),
        ));
    }
    usize::try_from(total_file_size.div_ceil(chunk_size)).map_err(|_| {
        UploadError::InvalidArgument(format!(
            "file of {} bytes needs too many chunks of {} bytes",
            total_file_size, chunk_size
        ))
    })
}

/// Partition `[0, total_file_size)` into ordered chunks of `chunk_size` bytes
pub fn plan_chunks(total_file_size: u64, chunk_size: u64) -> Result<Vec<Chunk>> {
    let total_parts = chunk_count(total_file_size, chunk_size)?;
    let mut chunks = Vec::with_capacity(total_parts);
    let mut offset = 0u64;

    while offset < total_file_size {
        let end = std::cmp::min(offset.saturating_add(chunk_size), total_file_size);
        chunks.push(Chunk {
            index: chunks.len(),
            byte_start: offset,
            byte_end: end - 1,
            total_parts,
            total_file_size,
        });
        offset = end;
    }

    Ok(chunks)
}

use memmap2::MmapOptions;
use tracing::instrument;

use super::Transfer;
use crate::config::TransferSettings;
use crate::error::TransferError;

/// Copy through fixed-size windows of memory-mapped source and destination
#[derive(Debug, Clone, Copy)]
pub struct MemoryMapped {
    /// Ceiling of a single mapped window
    pub chunk_size: u64,
}

impl MemoryMapped {
    pub fn new(settings: &TransferSettings) -> Self {
        Self {
            chunk_size: settings.mmap_chunk_size,
        }
    }

    fn copy_window(
        &self,
        src_file: &std::fs::File,
        dst_file: &std::fs::File,
        dst: &std::path::Path,
        offset: u64,
        len: usize,
    ) -> Result<(), TransferError> {
        let mapping_error = |source| TransferError::Mapping {
            offset,
            len,
            source,
        };
        // SAFETY: the source must not be truncated by another process while mapped, which is the
        // usual caveat of mapped file I/O; we never hand out references beyond this function
        let src_map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map(src_file)
                .map_err(mapping_error)?
        };
        // SAFETY: the destination was created and sized by us and is only written here
        let mut dst_map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(dst_file)
                .map_err(mapping_error)?
        };
        dst_map.copy_from_slice(&src_map);
        dst_map
            .flush()
            .map_err(|error| TransferError::io(dst, error))?;
        // both windows are unmapped when dropped here
        Ok(())
    }
}

impl Transfer for MemoryMapped {
    #[instrument]
    fn execute(
        &self,
        src: &std::path::Path,
        dst: Option<&std::path::Path>,
        byte_size: u64,
    ) -> Result<(), TransferError> {
        let dst = dst.ok_or(TransferError::MissingDestination)?;
        if self.chunk_size == 0 {
            return Err(TransferError::Alignment {
                what: "mmap chunk size",
                value: 0,
                alignment: crate::platform::page_size() as u64,
            });
        }
        let src_file = std::fs::File::open(src).map_err(|error| TransferError::open(src, error))?;
        // touching a mapped page past the end of the file raises SIGBUS, so refuse up front
        let src_len = src_file
            .metadata()
            .map_err(|error| TransferError::io(src, error))?
            .len();
        if src_len < byte_size {
            return Err(TransferError::ShortTransfer {
                path: src.to_owned(),
                expected: byte_size,
                actual: src_len,
            });
        }
        let dst_file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(dst)
            .map_err(|error| TransferError::open(dst, error))?;
        dst_file
            .set_len(byte_size)
            .map_err(|error| TransferError::io(dst, error))?;
        let mut offset = 0;
        let mut remaining = byte_size;
        while remaining > 0 {
            let len = std::cmp::min(remaining, self.chunk_size);
            tracing::trace!("mapping window at {} of {} bytes", offset, len);
            self.copy_window(&src_file, &dst_file, dst, offset, len as usize)?;
            offset += len;
            remaining -= len;
        }
        debug_assert_eq!(offset, byte_size);
        tracing::debug!("copied {} bytes", offset);
        Ok(())
    }
}

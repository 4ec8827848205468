use std::io::{Read, Write};
use std::os::unix::fs::FileExt;

use tracing::instrument;

use super::{Transfer, retry_interrupted};
use crate::buffer::{AlignedBuffer, align_down, align_up};
use crate::config::TransferSettings;
use crate::error::TransferError;
use crate::platform;

/// Block-aligned copy bypassing the page cache
///
/// Every read and write submitted through the unbuffered handles is a multiple of `block_size`.
/// Files whose size is not a multiple of `block_size` have their last partial block copied through
/// ordinary buffered handles at the same offset, so the destination always ends up exactly
/// `byte_size` bytes long.
#[derive(Debug, Clone, Copy)]
pub struct DirectIo {
    pub block_size: u64,
    /// Ceiling of a single read, rounded down to `block_size`
    pub read_ceiling: u64,
    /// Use buffered handles if the filesystem rejects unbuffered opens
    pub fallback: bool,
}

impl DirectIo {
    pub fn new(settings: &TransferSettings) -> Self {
        Self {
            block_size: settings.block_size,
            read_ceiling: settings.read_ceiling,
            fallback: settings.direct_fallback,
        }
    }

    fn check_alignment(&self) -> Result<(), TransferError> {
        if !self.block_size.is_power_of_two() {
            return Err(TransferError::Alignment {
                what: "block size",
                value: self.block_size,
                alignment: self.block_size,
            });
        }
        if self.read_ceiling < self.block_size {
            return Err(TransferError::Alignment {
                what: "read ceiling",
                value: self.read_ceiling,
                alignment: self.block_size,
            });
        }
        Ok(())
    }

    fn open(
        &self,
        path: &std::path::Path,
        direct: fn(&std::path::Path) -> std::io::Result<std::fs::File>,
        buffered: fn(&std::path::Path) -> std::io::Result<std::fs::File>,
    ) -> Result<std::fs::File, TransferError> {
        match direct(path) {
            Ok(file) => Ok(file),
            Err(error) if self.fallback && platform::is_direct_unsupported(&error) => {
                tracing::warn!(
                    "{:?} does not support unbuffered I/O, falling back to buffered I/O",
                    path
                );
                buffered(path).map_err(|error| TransferError::open(path, error))
            }
            Err(error) => Err(TransferError::open(path, error)),
        }
    }

    /// Copies the last `len` bytes starting at `offset` through buffered handles.
    fn copy_tail(
        &self,
        src: &std::path::Path,
        dst: &std::path::Path,
        offset: u64,
        len: u64,
    ) -> Result<(), TransferError> {
        tracing::debug!("copying {} byte tail at offset {} buffered", len, offset);
        let reader = std::fs::File::open(src).map_err(|error| TransferError::open(src, error))?;
        let writer = std::fs::OpenOptions::new()
            .write(true)
            .open(dst)
            .map_err(|error| TransferError::open(dst, error))?;
        let mut tail = vec![0u8; len as usize];
        reader
            .read_exact_at(&mut tail, offset)
            .map_err(|error| match error.kind() {
                std::io::ErrorKind::UnexpectedEof => TransferError::ShortTransfer {
                    path: src.to_owned(),
                    expected: offset + len,
                    actual: offset,
                },
                _ => TransferError::io(src, error),
            })?;
        writer
            .write_all_at(&tail, offset)
            .map_err(|error| TransferError::io(dst, error))?;
        Ok(())
    }
}

fn open_buffered_read(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    std::fs::File::open(path)
}

fn open_buffered_write(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl Transfer for DirectIo {
    #[instrument]
    fn execute(
        &self,
        src: &std::path::Path,
        dst: Option<&std::path::Path>,
        byte_size: u64,
    ) -> Result<(), TransferError> {
        let dst = dst.ok_or(TransferError::MissingDestination)?;
        self.check_alignment()?;
        let mut reader = self.open(src, platform::open_direct_read, open_buffered_read)?;
        let mut writer = self.open(dst, platform::open_direct_write, open_buffered_write)?;
        let block_size = self.block_size;
        let ceiling = align_down(self.read_ceiling, block_size);
        let buffer_len = std::cmp::min(ceiling, align_up(byte_size, block_size)).max(block_size);
        let buffer_align = std::cmp::max(block_size as usize, platform::page_size());
        let mut buffer = AlignedBuffer::new(buffer_len as usize, buffer_align)?;
        let mut remaining = byte_size;
        while remaining >= block_size {
            let to_read = align_down(std::cmp::min(remaining, ceiling), block_size) as usize;
            let bytes_read = retry_interrupted(|| reader.read(&mut buffer[..to_read]))
                .map_err(|error| TransferError::io(src, error))? as u64;
            // a zero or ragged read means the source is shorter than we were told
            if bytes_read == 0 || bytes_read % block_size != 0 {
                return Err(TransferError::ShortTransfer {
                    path: src.to_owned(),
                    expected: byte_size,
                    actual: byte_size - remaining + bytes_read,
                });
            }
            let chunk = &buffer[..bytes_read as usize];
            let bytes_written = retry_interrupted(|| writer.write(chunk))
                .map_err(|error| TransferError::io(dst, error))? as u64;
            if bytes_written != bytes_read {
                return Err(TransferError::ShortTransfer {
                    path: dst.to_owned(),
                    expected: byte_size,
                    actual: byte_size - remaining + bytes_written,
                });
            }
            remaining -= bytes_read;
        }
        drop(writer);
        debug_assert!(remaining < block_size);
        if remaining > 0 {
            self.copy_tail(src, dst, byte_size - remaining, remaining)?;
        }
        tracing::debug!("copied {} bytes", byte_size);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::write_source;
    use tracing_test::traced_test;

    fn strategy(ceiling_blocks: u64) -> DirectIo {
        DirectIo {
            block_size: 512,
            read_ceiling: ceiling_blocks * 512,
            fallback: true,
        }
    }

    #[test]
    #[traced_test]
    fn block_multiple_copies_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let data = write_source(&src, 64 * 1024);
        // ceiling smaller than the file forces many iterations
        strategy(16).execute(&src, Some(&dst), 64 * 1024).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn unaligned_tail_is_copied() {
        let dir = tempfile::tempdir().unwrap();
        for size in [1usize, 100, 511, 513, 8 * 1024 + 77] {
            let src = dir.path().join(format!("src{size}"));
            let dst = dir.path().join(format!("dst{size}"));
            let data = write_source(&src, size);
            strategy(4).execute(&src, Some(&dst), size as u64).unwrap();
            assert_eq!(std::fs::read(&dst).unwrap(), data, "size {size}");
        }
    }

    #[test]
    fn unaligned_ceiling_is_rounded_down() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let data = write_source(&src, 10 * 512);
        let strategy = DirectIo {
            block_size: 512,
            read_ceiling: 3 * 512 + 100,
            fallback: true,
        };
        strategy.execute(&src, Some(&dst), 10 * 512).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn source_shorter_than_requested_fails() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write_source(&src, 4 * 512);
        match strategy(16).execute(&src, Some(&dst), 8 * 512) {
            Err(TransferError::ShortTransfer { path, expected, .. }) => {
                assert_eq!(path, src);
                assert_eq!(expected, 8 * 512);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_block_size_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        write_source(&src, 1024);
        let strategy = DirectIo {
            block_size: 500,
            read_ceiling: 5000,
            fallback: true,
        };
        let result = strategy.execute(&src, Some(&dir.path().join("dst")), 1024);
        assert!(matches!(result, Err(TransferError::Alignment { .. })));
    }

    #[test]
    fn truncates_stale_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let data = write_source(&src, 2048);
        std::fs::write(&dst, vec![7u8; 16 * 1024]).unwrap();
        strategy(16).execute(&src, Some(&dst), 2048).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    /// A tmpfs directory that refuses unbuffered opens, if the host has one.
    fn unbuffered_refusing_dir() -> Option<tempfile::TempDir> {
        let dir = tempfile::tempdir_in("/dev/shm").ok()?;
        let sample = dir.path().join("sample");
        std::fs::write(&sample, vec![0u8; 4096]).ok()?;
        match platform::open_direct_read(&sample) {
            Err(error) if platform::is_direct_unsupported(&error) => Some(dir),
            _ => None,
        }
    }

    #[test]
    fn refused_unbuffered_open_fails_without_fallback() {
        let Some(dir) = unbuffered_refusing_dir() else {
            return;
        };
        let src = dir.path().join("src");
        write_source(&src, 4 * 512);
        let strategy = DirectIo {
            fallback: false,
            ..strategy(16)
        };
        match strategy.execute(&src, Some(&dir.path().join("dst")), 4 * 512) {
            Err(TransferError::Open { path, source }) => {
                assert_eq!(path, src);
                assert!(platform::is_direct_unsupported(&source), "{source:?}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!dir.path().join("dst").exists());
    }

    #[test]
    #[traced_test]
    fn refused_unbuffered_open_falls_back_with_warning() {
        let Some(dir) = unbuffered_refusing_dir() else {
            return;
        };
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let data = write_source(&src, 3 * 512 + 100);
        strategy(2).execute(&src, Some(&dst), 3 * 512 + 100).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);
        assert!(logs_contain("does not support unbuffered I/O"));
    }
}

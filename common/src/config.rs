//! Configuration types for transfer strategies and output settings

use anyhow::anyhow;

use crate::rng::Lcg;

/// Block size for unbuffered I/O; buffers and transfer lengths are multiples of it.
pub const BLOCK_SIZE: u64 = 512;
/// Largest single read submitted by the direct I/O strategy, also the simulation buffer size.
pub const READ_CEILING: u64 = 1024 * 1024 * 1024;
/// Largest window mapped at once by the memory-mapped strategy.
pub const MMAP_CHUNK_SIZE: u64 = 512 * 1024 * 1024;
/// Sub-block copied (and read back) at a time by the bandwidth simulation.
pub const DMA_BLOCK_SIZE: u64 = 2 * 1024 * 1024;
/// Size of the buffer repeatedly written when generating test files.
pub const GENERATE_CHUNK_SIZE: u64 = 1024 * 1024;

/// Tunables shared by all transfer strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TransferSettings {
    /// Alignment of unbuffered transfer lengths and buffers (power of two)
    pub block_size: u64,
    /// Ceiling of a single direct read, rounded down to `block_size`
    pub read_ceiling: u64,
    /// Ceiling of a single mapped window (multiple of the page size)
    pub mmap_chunk_size: u64,
    /// Sub-block size of the in-memory copy
    pub dma_block_size: u64,
    /// Write chunk used when generating files
    pub generate_chunk_size: u64,
    /// Fall back to buffered handles when the filesystem refuses to bypass the page cache
    pub direct_fallback: bool,
    /// Generator used to fill synthetic data
    pub generator: Lcg,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            read_ceiling: READ_CEILING,
            mmap_chunk_size: MMAP_CHUNK_SIZE,
            dma_block_size: DMA_BLOCK_SIZE,
            generate_chunk_size: GENERATE_CHUNK_SIZE,
            direct_fallback: true,
            generator: Lcg::default(),
        }
    }
}

impl TransferSettings {
    /// Validate configuration and return errors if invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        let page_size = crate::platform::page_size() as u64;
        if !self.block_size.is_power_of_two() {
            return Err(anyhow!("block size ({}) must be a power of two", self.block_size));
        }
        if self.read_ceiling < self.block_size
            || !self.read_ceiling.is_multiple_of(self.block_size)
        {
            return Err(anyhow!(
                "read ceiling ({}) must be a non-zero multiple of the block size ({})",
                self.read_ceiling,
                self.block_size
            ));
        }
        if !self.read_ceiling.is_multiple_of(page_size) {
            return Err(anyhow!(
                "read ceiling ({}) must be a multiple of the page size ({})",
                self.read_ceiling,
                page_size
            ));
        }
        if self.mmap_chunk_size == 0 || !self.mmap_chunk_size.is_multiple_of(page_size) {
            return Err(anyhow!(
                "mmap chunk size ({}) must be a non-zero multiple of the page size ({})",
                self.mmap_chunk_size,
                page_size
            ));
        }
        if self.dma_block_size == 0 || !self.dma_block_size.is_multiple_of(page_size) {
            return Err(anyhow!(
                "DMA block size ({}) must be a non-zero multiple of the page size ({})",
                self.dma_block_size,
                page_size
            ));
        }
        if self.generate_chunk_size < self.block_size
            || !self.generate_chunk_size.is_multiple_of(self.block_size)
        {
            return Err(anyhow!(
                "generate chunk size ({}) must be a non-zero multiple of the block size ({})",
                self.generate_chunk_size,
                self.block_size
            ));
        }
        Ok(())
    }
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print progress counters at the end
    pub print_summary: bool,
    /// Print results as JSON instead of text
    pub json: bool,
}

/// Parses a human readable size such as "4096", "10M", "512KiB" or "1.5 GB".
///
/// Bare single-letter suffixes (`K`, `M`, `G`, `T`) are binary multiples, so "10M" is 10 MiB.
/// Anything else is handed to `bytesize`, which treats "MB" as decimal and "MiB" as binary.
pub fn parse_size(text: &str) -> anyhow::Result<u64> {
    let trimmed = text.trim();
    let binary = trimmed
        .char_indices()
        .last()
        .filter(|(idx, _)| trimmed[..*idx].ends_with(|c: char| c.is_ascii_digit()))
        .and_then(|(idx, last)| match last.to_ascii_uppercase() {
            unit @ ('K' | 'M' | 'G' | 'T') => Some(format!("{}{unit}iB", &trimmed[..idx])),
            _ => None,
        });
    let normalized = binary.as_deref().unwrap_or(trimmed);
    normalized
        .parse::<bytesize::ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|error| anyhow!("invalid size {:?}: {}", text, error))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_letter_suffixes_are_binary() {
        assert_eq!(parse_size("10M").unwrap(), 10_485_760);
        assert_eq!(parse_size("4k").unwrap(), 4096);
        assert_eq!(parse_size("1G").unwrap(), 1 << 30);
        assert_eq!(parse_size("512KiB").unwrap(), 512 * 1024);
        assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert!(parse_size("lots").is_err());
        assert!(parse_size("").is_err());
    }

    #[test]
    fn defaults_are_valid() {
        TransferSettings::default().validate().unwrap();
    }

    #[test]
    fn rejects_odd_block_size() {
        let settings = TransferSettings {
            block_size: 500,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_unaligned_ceiling() {
        let settings = TransferSettings {
            read_ceiling: 1024 * 1024 + 512,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        let settings = TransferSettings {
            read_ceiling: 256,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_zero_chunks() {
        for settings in [
            TransferSettings {
                mmap_chunk_size: 0,
                ..Default::default()
            },
            TransferSettings {
                dma_block_size: 0,
                ..Default::default()
            },
            TransferSettings {
                generate_chunk_size: 0,
                ..Default::default()
            },
        ] {
            assert!(settings.validate().is_err(), "{settings:?}");
        }
    }
}

use tracing::instrument;

use super::Transfer;
use crate::buffer::{AlignedBuffer, align_up};
use crate::config::TransferSettings;
use crate::error::TransferError;
use crate::rng::Lcg;

/// In-memory copy that mimics a DMA transfer between two buffers
///
/// The source file is never read and the destination is ignored: only `byte_size` matters. Both
/// buffers are `buffer_size` bytes regardless of `byte_size`, and the whole source buffer is filled
/// from the generator inside the measured region. The copy is split into windows of at most
/// `buffer_size` bytes (each window restarts at the start of the buffers) and every window into
/// `dma_block_size` sub-blocks. After each sub-block one word per page of the destination is read
/// back with a volatile load so the copy cannot be elided; a window whose read-back is all zero
/// fails verification.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBandwidthSimulation {
    /// Size of each of the two buffers, a multiple of the page size
    pub buffer_size: u64,
    pub dma_block_size: u64,
    pub generator: Lcg,
}

impl MemoryBandwidthSimulation {
    pub fn new(settings: &TransferSettings) -> Self {
        Self {
            buffer_size: settings.read_ceiling,
            dma_block_size: settings.dma_block_size,
            generator: settings.generator,
        }
    }

    fn check_alignment(&self, page_size: u64) -> Result<(), TransferError> {
        if self.buffer_size == 0 || !self.buffer_size.is_multiple_of(page_size) {
            return Err(TransferError::Alignment {
                what: "simulation buffer size",
                value: self.buffer_size,
                alignment: page_size,
            });
        }
        if self.dma_block_size == 0 {
            return Err(TransferError::Alignment {
                what: "DMA block size",
                value: 0,
                alignment: page_size,
            });
        }
        Ok(())
    }

    /// Allocates both buffers at full `buffer_size` and fills the source from the generator.
    fn prepare_buffers(
        &self,
        page_size: usize,
    ) -> Result<(AlignedBuffer, AlignedBuffer), TransferError> {
        let mut source = AlignedBuffer::new(self.buffer_size as usize, page_size)?;
        let destination = AlignedBuffer::new(self.buffer_size as usize, page_size)?;
        let mut generator = self.generator;
        generator.fill(&mut source);
        Ok((source, destination))
    }
}

/// XOR of the first word of every page in `block`.
fn read_back_pages(block: &[u8], page_size: usize) -> u64 {
    let mut checksum = 0u64;
    let mut offset = 0;
    while offset + 8 <= block.len() {
        // SAFETY: offset + 8 is within the block and [u8; 8] has no alignment requirement
        let word = unsafe {
            std::ptr::read_volatile(block.as_ptr().add(offset) as *const [u8; 8])
        };
        checksum ^= u64::from_ne_bytes(word);
        offset += page_size;
    }
    checksum
}

impl Transfer for MemoryBandwidthSimulation {
    #[instrument]
    fn execute(
        &self,
        _src: &std::path::Path,
        _dst: Option<&std::path::Path>,
        byte_size: u64,
    ) -> Result<(), TransferError> {
        let page_size = crate::platform::page_size();
        let page = page_size as u64;
        self.check_alignment(page)?;
        if byte_size == 0 {
            tracing::debug!("nothing to copy");
            return Ok(());
        }
        let (source, mut destination) = self.prepare_buffers(page_size)?;
        let buffer_len = source.len();
        let dma_block = self.dma_block_size as usize;
        let mut checksum = 0u64;
        let mut remaining = byte_size;
        while remaining > 0 {
            let window = std::cmp::min(remaining, buffer_len as u64) as usize;
            tracing::trace!("copying window of {} bytes", window);
            let mut window_checksum = 0u64;
            let mut offset = 0;
            while offset < window {
                let block = std::cmp::min(dma_block, window - offset);
                // a partial sub-block is copied up to the next page boundary
                let len = if block < dma_block {
                    std::cmp::min(align_up(block as u64, page) as usize, buffer_len - offset)
                } else {
                    block
                };
                let range = offset..offset + len;
                destination[range.clone()].copy_from_slice(&source[range.clone()]);
                window_checksum ^= read_back_pages(&destination[range], page_size);
                offset += block;
            }
            // windows repeat the same bytes, so each one is verified on its own
            if window_checksum == 0 {
                return Err(TransferError::Verification);
            }
            checksum = checksum.wrapping_add(window_checksum);
            remaining -= window as u64;
        }
        std::hint::black_box(checksum);
        tracing::debug!("simulated {} bytes, checksum {:#x}", byte_size, checksum);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn strategy(buffer_pages: u64, dma_pages: u64) -> MemoryBandwidthSimulation {
        let page = crate::platform::page_size() as u64;
        MemoryBandwidthSimulation {
            buffer_size: buffer_pages * page,
            dma_block_size: dma_pages * page,
            generator: Lcg::default(),
        }
    }

    #[test]
    #[traced_test]
    fn ignores_paths() {
        let missing = std::path::Path::new("/nonexistent/source");
        strategy(16, 4).execute(missing, None, 100_000).unwrap();
        strategy(16, 4)
            .execute(missing, Some(std::path::Path::new("/nonexistent/dst")), 1)
            .unwrap();
    }

    #[test]
    fn zero_bytes_succeed() {
        let path = std::path::Path::new("unused");
        strategy(1, 1).execute(path, None, 0).unwrap();
    }

    #[test]
    fn transfer_larger_than_buffer_restarts_windows() {
        let page = crate::platform::page_size() as u64;
        let path = std::path::Path::new("unused");
        // three full windows and a ragged remainder with a ragged sub-block
        strategy(8, 3)
            .execute(path, None, 3 * 8 * page + 5 * page + 17)
            .unwrap();
    }

    #[test]
    fn buffers_span_the_whole_ceiling() {
        let page_size = crate::platform::page_size();
        let (source, destination) = strategy(8, 2).prepare_buffers(page_size).unwrap();
        assert_eq!(source.len(), 8 * page_size);
        assert_eq!(destination.len(), 8 * page_size);
        assert_eq!(source.as_ptr() as usize % page_size, 0);
        // the generated stream reaches the last page
        assert!(source[7 * page_size..].iter().any(|&b| b != 0));
    }

    #[test]
    fn repeated_windows_verify() {
        let page = crate::platform::page_size() as u64;
        let path = std::path::Path::new("unused");
        for windows in 1..=4 {
            strategy(4, 1)
                .execute(path, None, windows * 4 * page)
                .unwrap_or_else(|error| panic!("{windows} windows: {error}"));
        }
    }

    #[test]
    fn constant_data_fails_verification() {
        let path = std::path::Path::new("unused");
        let simulation = MemoryBandwidthSimulation {
            generator: Lcg::new(0, 0, 0),
            ..strategy(4, 1)
        };
        assert!(matches!(
            simulation.execute(path, None, 4096),
            Err(TransferError::Verification)
        ));
    }

    #[test]
    fn misconfigured_buffers_are_rejected() {
        let path = std::path::Path::new("unused");
        let page = crate::platform::page_size() as u64;
        for simulation in [
            strategy(0, 1),
            strategy(4, 0),
            MemoryBandwidthSimulation {
                buffer_size: page + 1,
                ..strategy(4, 1)
            },
        ] {
            assert!(matches!(
                simulation.execute(path, None, 10),
                Err(TransferError::Alignment { .. })
            ));
        }
    }

    #[test]
    fn read_back_takes_one_word_per_page() {
        let mut block = vec![0u8; 3 * 64];
        block[0] = 1;
        block[64] = 2;
        block[128 + 8] = 0xFF;
        assert_eq!(
            read_back_pages(&block, 64),
            u64::from_ne_bytes([3, 0, 0, 0, 0, 0, 0, 0])
        );
    }
}

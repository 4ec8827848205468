use crate::config::TransferSettings;
use crate::rng::Lcg;

/// Settings with ceilings small enough that modest test files span several chunks.
pub fn small_settings() -> TransferSettings {
    let page = crate::platform::page_size() as u64;
    TransferSettings {
        read_ceiling: 64 * page,
        mmap_chunk_size: 16 * page,
        dma_block_size: 4 * page,
        generate_chunk_size: 8 * 1024,
        ..Default::default()
    }
}

/// Writes `size` bytes of pseudo-random data to `path` and returns them.
///
/// Uses different generator parameters than the defaults so that source files never coincide
/// with generated test files.
pub fn write_source(path: &std::path::Path, size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    Lcg::new(42, 6364136223846793005, 1442695040888963407).fill(&mut data);
    // the generator leaves the trailing partial word alone
    for (idx, byte) in data.iter_mut().enumerate().skip(size - size % 8) {
        *byte = idx as u8 | 1;
    }
    std::fs::write(path, &data).unwrap();
    data
}

//! Synthetic test file generation
//!
//! Every file is filled from a fresh generator, so files generated with the same settings and size
//! are byte-identical regardless of which worker wrote them.

use std::io::Write;

use tracing::instrument;

use crate::buffer::{AlignedBuffer, align_up};
use crate::config::TransferSettings;
use crate::error::TransferError;
use crate::progress;
use crate::task::{CopySummary, Task};

/// Name of the `index`-th generated file (1-based).
pub fn file_name(index: usize) -> String {
    format!("test_file_{index}")
}

/// Writes `size` bytes of generator output to `path`, replacing any existing file.
///
/// A single block-aligned buffer of at most `generate_chunk_size` bytes is filled once and written
/// repeatedly; the last write is the exact remainder. The file is synced before returning.
#[instrument(skip(settings))]
pub fn write_file(
    path: &std::path::Path,
    size: u64,
    settings: &TransferSettings,
) -> Result<(), TransferError> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|error| TransferError::open(path, error))?;
    let chunk = std::cmp::min(
        settings.generate_chunk_size,
        align_up(size, settings.block_size),
    );
    let mut buffer = AlignedBuffer::new(chunk as usize, settings.block_size as usize)?;
    let mut generator = settings.generator;
    generator.fill(&mut buffer);
    let mut remaining = size;
    while remaining > 0 {
        let len = std::cmp::min(remaining, chunk) as usize;
        file.write_all(&buffer[..len])
            .map_err(|error| TransferError::io(path, error))?;
        remaining -= len as u64;
    }
    file.sync_all()
        .map_err(|error| TransferError::io(path, error))?;
    tracing::debug!("generated {} bytes", size);
    Ok(())
}

/// Generates `num_files` files of `size` bytes named [`file_name`] under `root`, one worker per
/// file, and returns the finished tasks in order.
#[instrument(skip(prog_track, settings))]
pub fn filegen(
    prog_track: &progress::Progress,
    root: &std::path::Path,
    num_files: usize,
    size: u64,
    settings: &TransferSettings,
) -> Vec<Task> {
    let mut tasks: Vec<Task> = (1..=num_files)
        .map(|index| Task::generate(root.join(file_name(index)), size))
        .collect();
    crate::dispatch::run_tasks(prog_track, &mut tasks, settings);
    tasks
}

/// Like [`filegen`], summarized.
pub fn filegen_summary(
    prog_track: &progress::Progress,
    root: &std::path::Path,
    num_files: usize,
    size: u64,
    settings: &TransferSettings,
) -> CopySummary {
    CopySummary::from_tasks(&filegen(prog_track, root, num_files, size, settings))
}

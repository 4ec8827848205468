//! Transfer strategies
//!
//! Four interchangeable ways of moving `byte_size` bytes from a source file to a destination:
//!
//! - [`DelegatedCopy`]: hand the whole file to the OS copy facility
//! - [`MemoryMapped`]: copy through bounded windows of mapped memory
//! - [`DirectIo`]: block-aligned reads and writes that bypass the page cache
//! - [`MemoryBandwidthSimulation`]: an in-memory copy that never touches disk, used as the
//!   memory-bandwidth baseline of the benchmark
//!
//! The set is closed: [`Strategy`] is the tag callers pass around, and [`Strategy::transfer`]
//! resolves it to an implementation of [`Transfer`]. Dispatch code only sees the trait.

mod delegated;
mod direct;
mod mmap;
mod simulate;

pub use delegated::DelegatedCopy;
pub use direct::DirectIo;
pub use mmap::MemoryMapped;
pub use simulate::MemoryBandwidthSimulation;

use crate::config::TransferSettings;
use crate::error::TransferError;

/// Common contract of all transfer strategies.
pub trait Transfer: std::fmt::Debug + Send + Sync {
    /// Moves exactly `byte_size` bytes from `src` to `dst`.
    ///
    /// On error the destination (if any) is left in an unspecified, incomplete state.
    fn execute(
        &self,
        src: &std::path::Path,
        dst: Option<&std::path::Path>,
        byte_size: u64,
    ) -> Result<(), TransferError>;
}

/// Strategy tag selected by the caller
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    clap::ValueEnum,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// OS-delegated whole-file copy
    #[value(name = "cp")]
    #[serde(rename = "cp")]
    DelegatedCopy,
    /// Copy through memory-mapped windows
    #[value(name = "mmap")]
    #[serde(rename = "mmap")]
    MemoryMapped,
    /// Unbuffered, block-aligned read/write loop
    #[value(name = "direct-io")]
    #[serde(rename = "direct-io")]
    DirectIo,
    /// In-memory copy measuring memory bandwidth (no disk I/O)
    #[value(name = "memory-impact")]
    #[serde(rename = "memory-impact")]
    MemoryBandwidthSimulation,
    /// Synthetic test file generation
    #[value(skip)]
    Generate,
}

impl Strategy {
    /// Resolves the tag to its implementation, `None` for [`Strategy::Generate`].
    pub fn transfer(self, settings: &TransferSettings) -> Option<Box<dyn Transfer>> {
        match self {
            Strategy::DelegatedCopy => Some(Box::new(DelegatedCopy)),
            Strategy::MemoryMapped => Some(Box::new(MemoryMapped::new(settings))),
            Strategy::DirectIo => Some(Box::new(DirectIo::new(settings))),
            Strategy::MemoryBandwidthSimulation => {
                Some(Box::new(MemoryBandwidthSimulation::new(settings)))
            }
            Strategy::Generate => None,
        }
    }

    /// Whether the strategy writes to a destination path.
    pub fn needs_destination(self) -> bool {
        matches!(
            self,
            Strategy::DelegatedCopy | Strategy::MemoryMapped | Strategy::DirectIo
        )
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            Strategy::DelegatedCopy => "cp",
            Strategy::MemoryMapped => "mmap",
            Strategy::DirectIo => "direct-io",
            Strategy::MemoryBandwidthSimulation => "memory-impact",
            Strategy::Generate => "generate",
        };
        write!(f, "{name}")
    }
}

/// Retries `op` while it fails with `ErrorKind::Interrupted`.
fn retry_interrupted<T>(mut op: impl FnMut() -> std::io::Result<T>) -> std::io::Result<T> {
    loop {
        match op() {
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

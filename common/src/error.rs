/// Failure of a single transfer strategy or of the buffers it depends on.
///
/// Strategies fail fast: the first failing open/read/write/map aborts the transfer and the
/// destination must be treated as incomplete.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed opening {path:?}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{what} ({value}) is not a multiple of the required alignment ({alignment})")]
    Alignment {
        what: &'static str,
        value: u64,
        alignment: u64,
    },
    #[error("short transfer on {path:?}: expected {expected} bytes, got {actual}")]
    ShortTransfer {
        path: std::path::PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("failed mapping {len} bytes at offset {offset}")]
    Mapping {
        offset: u64,
        len: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("failed allocating {size} bytes aligned to {align}")]
    Allocation { size: usize, align: usize },
    #[error("memory copy read-back produced an empty checksum")]
    Verification,
    #[error("strategy requires a destination path")]
    MissingDestination,
    #[error("I/O error on {path:?}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    pub fn open(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Open {
            path: path.to_owned(),
            source,
        }
    }

    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_owned(),
            source,
        }
    }
}

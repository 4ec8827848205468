use tracing::instrument;

use super::Transfer;
use crate::error::TransferError;
use crate::platform;

/// Copy handed entirely to the platform's native whole-file copy
#[derive(Debug, Default, Clone, Copy)]
pub struct DelegatedCopy;

impl Transfer for DelegatedCopy {
    #[instrument]
    fn execute(
        &self,
        src: &std::path::Path,
        dst: Option<&std::path::Path>,
        byte_size: u64,
    ) -> Result<(), TransferError> {
        let dst = dst.ok_or(TransferError::MissingDestination)?;
        let copied = platform::native_copy(src, dst).map_err(|error| {
            match error.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    // the OS call does not tell us which side failed to open
                    if std::fs::File::open(src).is_err() {
                        TransferError::open(src, error)
                    } else {
                        TransferError::open(dst, error)
                    }
                }
                _ => TransferError::io(dst, error),
            }
        })?;
        if copied != byte_size {
            return Err(TransferError::ShortTransfer {
                path: dst.to_owned(),
                expected: byte_size,
                actual: copied,
            });
        }
        tracing::debug!("copied {} bytes", copied);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::write_source;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn overwrites_existing_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        let data = write_source(&src, 10_000);
        std::fs::write(&dst, vec![0u8; 50_000]).unwrap();
        DelegatedCopy.execute(&src, Some(&dst), 10_000).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), data);
    }

    #[test]
    fn size_mismatch_is_short_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        write_source(&src, 1000);
        match DelegatedCopy.execute(&src, Some(&dst), 2000) {
            Err(TransferError::ShortTransfer {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 2000);
                assert_eq!(actual, 1000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_destination_directory_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("nope").join("dst");
        write_source(&src, 100);
        match DelegatedCopy.execute(&src, Some(&dst), 100) {
            Err(TransferError::Open { path, .. }) => assert_eq!(path, dst),
            other => panic!("unexpected {other:?}"),
        }
    }
}

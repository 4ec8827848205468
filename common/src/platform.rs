//! Platform hooks used by the transfer strategies
//!
//! Every OS-specific detail lives here: page size discovery, opening files so that reads and
//! writes bypass the page cache, and the native whole-file copy. Strategies only see
//! `std::fs::File` handles.

use std::os::unix::fs::OpenOptionsExt;

/// System page size, queried once.
pub fn page_size() -> usize {
    static PAGE_SIZE: std::sync::OnceLock<usize> = std::sync::OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        match nix::unistd::sysconf(nix::unistd::SysconfVar::PAGE_SIZE) {
            Ok(Some(size)) if size > 0 => size as usize,
            other => {
                tracing::warn!("failed querying page size ({:?}), assuming 4096", other);
                4096
            }
        }
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn direct_options(options: &mut std::fs::OpenOptions) {
    options.custom_flags(libc::O_DIRECT);
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn direct_options(_options: &mut std::fs::OpenOptions) {}

#[cfg(target_os = "macos")]
fn bypass_cache(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::fd::AsRawFd;
    // SAFETY: fcntl on a valid, owned descriptor
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn bypass_cache(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

fn open_with(
    options: &mut std::fs::OpenOptions,
    path: &std::path::Path,
) -> std::io::Result<std::fs::File> {
    direct_options(options);
    let file = options.open(path)?;
    bypass_cache(&file)?;
    Ok(file)
}

/// Opens `path` for reading with the page cache bypassed.
pub fn open_direct_read(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    open_with(std::fs::OpenOptions::new().read(true), path)
}

/// Creates (or truncates) `path` for writing with the page cache bypassed.
pub fn open_direct_write(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    open_with(
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644),
        path,
    )
}

/// True when the error means the filesystem does not support cache-bypassing I/O.
pub fn is_direct_unsupported(error: &std::io::Error) -> bool {
    error.raw_os_error() == Some(libc::EINVAL)
}

/// Copies the whole file using the platform's native facility; returns the number of bytes copied.
pub fn native_copy(src: &std::path::Path, dst: &std::path::Path) -> std::io::Result<u64> {
    // std::fs::copy uses copy_file_range/sendfile on Linux and fcopyfile on macOS
    std::fs::copy(src, dst)
}

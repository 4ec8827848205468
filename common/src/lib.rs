//! Common library for the pcopy tools
//!
//! This crate holds the transfer engine shared by the `pcopy`, `filegen` and `pbench` binaries.
//!
//! # Overview
//!
//! A batch of files is described as a list of [`Task`]s, each naming a source file, an optional
//! destination and a [`Strategy`]. The [`dispatch`] module runs every task on its own OS thread
//! and leaves a [`task::Measurement`] and a [`task::Status`] behind in each task. The
//! [`benchmark`](mod@benchmark) module builds on top of that: it generates test files, measures an
//! in-memory baseline and a direct I/O disk pass, and reports whether the disk is running at
//! memory speed.
//!
//! # Strategies
//!
//! - **cp**: delegate the whole copy to the OS
//! - **mmap**: copy through memory-mapped windows of at most 512 MiB
//! - **direct-io**: block-aligned reads and writes bypassing the page cache
//! - **memory-impact**: simulate a DMA transfer between two buffers, no disk I/O
//!
//! All strategies share the settings in [`TransferSettings`]; see [`config`] for the defaults.
//!
//! # Error Handling
//!
//! Strategies return [`TransferError`]. The task runner attaches context with `anyhow` and never
//! lets a per-file failure abort the batch: failures are recorded in the task's status and counted
//! in [`progress::Progress`].
//!
//! # Logging
//!
//! All modules log through `tracing`. Binaries install a subscriber via [`run`], with the level
//! chosen by the `-v` count unless `RUST_LOG` is set.

pub mod benchmark;
pub mod buffer;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod filegen;
pub mod platform;
pub mod progress;
pub mod rng;
pub mod strategy;
pub mod task;

#[cfg(test)]
mod testutils;

pub use benchmark::{BenchmarkReport, BenchmarkSettings, benchmark};
pub use config::{OutputConfig, TransferSettings, parse_size};
pub use error::TransferError;
pub use strategy::Strategy;
pub use task::{CopySummary, Task};

fn init_tracing(output: &OutputConfig) {
    let level = if output.quiet {
        "off"
    } else {
        match output.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    // a subscriber may already be installed (e.g. by tests), keep it
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .try_init();
}

/// Runs `func` with logging configured from `output` and prints its result.
///
/// The result is printed to stdout as JSON when `output.json` is set, otherwise in its `Display`
/// form unless `output.quiet` is set. Errors go to stderr unless `output.quiet` is set. Returns
/// `None` on error so the caller can exit with a failure status.
pub fn run<S, F>(output: OutputConfig, func: F) -> Option<S>
where
    S: std::fmt::Display + serde::Serialize,
    F: FnOnce() -> anyhow::Result<S>,
{
    init_tracing(&output);
    match func() {
        Ok(result) => {
            if output.json {
                match serde_json::to_string_pretty(&result) {
                    Ok(json) => println!("{json}"),
                    Err(error) => {
                        if !output.quiet {
                            eprintln!("failed serializing result: {error:#}");
                        }
                        return None;
                    }
                }
            } else if !output.quiet {
                println!("{result}");
            }
            Some(result)
        }
        Err(error) => {
            if !output.quiet {
                eprintln!("{error:#}");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Serialize)]
    struct Answer(u32);

    impl std::fmt::Display for Answer {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "answer: {}", self.0)
        }
    }

    #[test]
    fn run_returns_result() {
        let output = OutputConfig {
            quiet: true,
            ..Default::default()
        };
        assert_eq!(run(output, || Ok(Answer(42))).map(|answer| answer.0), Some(42));
    }

    #[test]
    fn run_swallows_errors() {
        let output = OutputConfig {
            quiet: true,
            json: true,
            ..Default::default()
        };
        assert!(run::<Answer, _>(output, || Err(anyhow::anyhow!("boom"))).is_none());
    }
}

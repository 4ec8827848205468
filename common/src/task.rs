//! Per-file task runner
//!
//! A [`Task`] names one file and the strategy to apply to it. Running it times the strategy,
//! discovers the size and leaves a [`Measurement`] and a [`Status`] behind in the task.

use anyhow::{Context, anyhow};
use tracing::instrument;

use crate::config::TransferSettings;
use crate::progress;
use crate::strategy::Strategy;

const MIB: f64 = (1024 * 1024) as f64;

/// Size and wall-clock duration of one operation (or an aggregate of several)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Measurement {
    pub size_bytes: u64,
    pub duration: std::time::Duration,
}

impl Measurement {
    pub fn new(size_bytes: u64, duration: std::time::Duration) -> Self {
        Self {
            size_bytes,
            duration,
        }
    }

    pub fn size_mib(&self) -> f64 {
        self.size_bytes as f64 / MIB
    }

    /// MiB per second, `None` when no time elapsed.
    pub fn speed(&self) -> Option<f64> {
        let seconds = self.duration.as_secs_f64();
        if seconds > 0.0 {
            Some(self.size_mib() / seconds)
        } else {
            None
        }
    }

    /// Combines measurements of operations that ran concurrently: sizes add up, and the duration is
    /// the longest one since all of them ran side by side.
    pub fn concurrent<'a>(
        measurements: impl IntoIterator<Item = &'a Measurement>,
    ) -> Measurement {
        measurements
            .into_iter()
            .fold(Measurement::default(), |total, measurement| Measurement {
                size_bytes: total.size_bytes + measurement.size_bytes,
                duration: std::cmp::max(total.duration, measurement.duration),
            })
    }
}

impl serde::Serialize for Measurement {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Measurement", 4)?;
        state.serialize_field("size_bytes", &self.size_bytes)?;
        state.serialize_field("size_mib", &self.size_mib())?;
        state.serialize_field("duration_seconds", &self.duration.as_secs_f64())?;
        state.serialize_field("speed_mib_per_sec", &self.speed())?;
        state.end()
    }
}

/// Renders an optional speed, `n/a` when undefined.
pub(crate) struct Speed(pub Option<f64>);

impl std::fmt::Display for Speed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.0 {
            Some(speed) => match f.width() {
                Some(width) => write!(f, "{speed:>width$.2}"),
                None => write!(f, "{speed:.2}"),
            },
            None => f.pad("n/a"),
        }
    }
}

#[derive(Debug, Default)]
pub enum Status {
    #[default]
    Pending,
    Succeeded,
    Failed(anyhow::Error),
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Succeeded)
    }
}

/// One file and what to do with it
#[derive(Debug)]
pub struct Task {
    pub source: std::path::PathBuf,
    /// Absent for generation and for the in-memory simulation
    pub destination: Option<std::path::PathBuf>,
    pub strategy: Strategy,
    /// Bytes to generate, only used by [`Strategy::Generate`]
    pub target_size: Option<u64>,
    pub measurement: Option<Measurement>,
    pub status: Status,
}

impl Task {
    pub fn transfer(
        source: std::path::PathBuf,
        destination: Option<std::path::PathBuf>,
        strategy: Strategy,
    ) -> Self {
        Self {
            source,
            destination,
            strategy,
            target_size: None,
            measurement: None,
            status: Status::Pending,
        }
    }

    pub fn generate(path: std::path::PathBuf, size: u64) -> Self {
        Self {
            source: path,
            destination: None,
            strategy: Strategy::Generate,
            target_size: Some(size),
            measurement: None,
            status: Status::Pending,
        }
    }

    /// File name used in reports.
    pub fn name(&self) -> String {
        self.source
            .file_name()
            .unwrap_or(self.source.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{source:#}")]
pub struct Error {
    #[source]
    pub source: anyhow::Error,
    /// Whatever was measured before the failure
    pub measurement: Measurement,
}

impl Error {
    pub fn new(source: anyhow::Error, measurement: Measurement) -> Self {
        Error {
            source,
            measurement,
        }
    }
}

fn measure(
    prog_track: &progress::Progress,
    task: &Task,
    settings: &TransferSettings,
) -> Result<Measurement, Error> {
    let start = std::time::Instant::now();
    let Some(transfer) = task.strategy.transfer(settings) else {
        let size = task.target_size.ok_or_else(|| {
            Error::new(
                anyhow!("generation of {:?} requires a target size", &task.source),
                Measurement::default(),
            )
        })?;
        crate::filegen::write_file(&task.source, size, settings)
            .with_context(|| format!("failed generating {:?}", &task.source))
            .map_err(|err| Error::new(err, Measurement::new(size, start.elapsed())))?;
        prog_track.files_generated.inc();
        prog_track.bytes_generated.add(size);
        return Ok(Measurement::new(size, start.elapsed()));
    };
    let size = std::fs::metadata(&task.source)
        .map_err(|error| crate::error::TransferError::open(&task.source, error))
        .with_context(|| format!("failed reading size of {:?}", &task.source))
        .map_err(|err| Error::new(err, Measurement::new(0, start.elapsed())))?
        .len();
    transfer
        .execute(&task.source, task.destination.as_deref(), size)
        .with_context(|| {
            format!(
                "{} transfer of {:?} to {:?} failed",
                task.strategy, &task.source, &task.destination
            )
        })
        .map_err(|err| Error::new(err, Measurement::new(size, start.elapsed())))?;
    let measurement = Measurement::new(size, start.elapsed());
    prog_track.files_transferred.inc();
    prog_track.bytes_transferred.add(size);
    Ok(measurement)
}

/// Runs one task and returns its measurement. Progress counters are updated on success and on
/// failure alike.
#[instrument(
    skip(prog_track, task, settings),
    fields(source = ?task.source, strategy = %task.strategy)
)]
pub fn run_task(
    prog_track: &progress::Progress,
    task: &Task,
    settings: &TransferSettings,
) -> Result<Measurement, Error> {
    let _in_flight = prog_track.ops.enter();
    measure(prog_track, task, settings).inspect_err(|_| prog_track.files_failed.inc())
}

/// Runs `task` in place, recording its measurement and status.
pub fn execute(prog_track: &progress::Progress, task: &mut Task, settings: &TransferSettings) {
    match run_task(prog_track, task, settings) {
        Ok(measurement) => {
            tracing::info!(
                "{}: {:.2} MiB in {:?}",
                task.name(),
                measurement.size_mib(),
                measurement.duration
            );
            task.measurement = Some(measurement);
            task.status = Status::Succeeded;
        }
        Err(error) => {
            tracing::error!("{}: {:#}", task.name(), &error);
            task.measurement = Some(error.measurement);
            task.status = Status::Failed(error.source);
        }
    }
}

/// One row of a [`CopySummary`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileReport {
    pub name: String,
    pub strategy: Strategy,
    pub measurement: Option<Measurement>,
    /// Error chain of a failed task
    pub error: Option<String>,
}

/// Per-file results and totals of a batch of tasks
///
/// Totals only cover successful tasks. Since tasks run concurrently the total duration is the
/// longest task duration, not the sum.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CopySummary {
    pub files: Vec<FileReport>,
    pub files_succeeded: usize,
    pub files_failed: usize,
    pub total_bytes: u64,
    pub total_size_mib: f64,
    #[serde(rename = "total_duration_seconds", serialize_with = "serialize_seconds")]
    pub total_duration: std::time::Duration,
    pub average_speed_mib_per_sec: Option<f64>,
}

pub(crate) fn serialize_seconds<S: serde::Serializer>(
    duration: &std::time::Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

impl CopySummary {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let files: Vec<FileReport> = tasks
            .iter()
            .map(|task| FileReport {
                name: task.name(),
                strategy: task.strategy,
                measurement: task.measurement,
                error: match &task.status {
                    Status::Succeeded => None,
                    Status::Failed(error) => Some(format!("{error:#}")),
                    Status::Pending => Some("not executed".to_string()),
                },
            })
            .collect();
        let succeeded: Vec<&Measurement> = tasks
            .iter()
            .filter(|task| task.status.is_success())
            .filter_map(|task| task.measurement.as_ref())
            .collect();
        let total = Measurement::concurrent(succeeded.iter().copied());
        Self {
            files_succeeded: succeeded.len(),
            files_failed: files.len() - succeeded.len(),
            files,
            total_bytes: total.size_bytes,
            total_size_mib: total.size_mib(),
            total_duration: total.duration,
            average_speed_mib_per_sec: total.speed(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.files_failed == 0
    }
}

impl std::fmt::Display for CopySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(
            f,
            "{:<30} {:<14} {:>12} {:>14} {:>14}",
            "Filename", "Strategy", "Size (MiB)", "Duration (s)", "Speed (MiB/s)"
        )?;
        writeln!(f, "{}", "-".repeat(88))?;
        for file in &self.files {
            match (&file.error, &file.measurement) {
                (None, Some(measurement)) => writeln!(
                    f,
                    "{:<30} {:<14} {:>12.2} {:>14.3} {:>14}",
                    file.name,
                    file.strategy.to_string(),
                    measurement.size_mib(),
                    measurement.duration.as_secs_f64(),
                    Speed(measurement.speed()),
                )?,
                (error, _) => writeln!(
                    f,
                    "{:<30} {:<14} FAILED: {}",
                    file.name,
                    file.strategy.to_string(),
                    error.as_deref().unwrap_or("no measurement")
                )?,
            }
        }
        write!(
            f,
            "\nfiles succeeded: {}\n\
            files failed: {}\n\
            total size: {:.2} MiB ({})\n\
            total duration: {:.3} s\n\
            average speed: {} MiB/s",
            self.files_succeeded,
            self.files_failed,
            self.total_size_mib,
            bytesize::ByteSize(self.total_bytes),
            self.total_duration.as_secs_f64(),
            Speed(self.average_speed_mib_per_sec),
        )
    }
}

//! Memory versus disk benchmark
//!
//! Generates a set of test files, runs the in-memory bandwidth simulation over them, then copies
//! them with direct I/O, and compares the aggregate speeds of the two passes. A disk pass running
//! at (nearly) memory speed means the transfers are bounded by memory bandwidth rather than by the
//! storage devices.

use anyhow::{Context, anyhow};
use tracing::instrument;

use crate::config::TransferSettings;
use crate::filegen;
use crate::progress;
use crate::strategy::Strategy;
use crate::task::{Measurement, Speed, Status, Task, serialize_seconds};

/// Disk-to-memory speed ratio at which the disk pass counts as memory-bound.
pub const SATURATION_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct BenchmarkSettings {
    pub file_size: u64,
    pub num_files: usize,
    pub source_dir: std::path::PathBuf,
    pub destination_dir: std::path::PathBuf,
    pub transfer: TransferSettings,
    pub saturation_threshold: f64,
}

impl BenchmarkSettings {
    pub fn new(
        file_size: u64,
        num_files: usize,
        source_dir: std::path::PathBuf,
        destination_dir: std::path::PathBuf,
    ) -> Self {
        Self {
            file_size,
            num_files,
            source_dir,
            destination_dir,
            transfer: TransferSettings::default(),
            saturation_threshold: SATURATION_THRESHOLD,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.file_size == 0 {
            return Err(anyhow!("file size must be greater than 0"));
        }
        if self.num_files == 0 {
            return Err(anyhow!("number of files must be greater than 0"));
        }
        if !(self.saturation_threshold.is_finite() && self.saturation_threshold > 0.0) {
            return Err(anyhow!(
                "saturation threshold ({}) must be a positive number",
                self.saturation_threshold
            ));
        }
        self.transfer.validate()
    }
}

/// Memory and disk measurements of one test file
#[derive(Debug, Clone, serde::Serialize)]
pub struct BenchmarkResult {
    pub filename: String,
    pub memory: Option<Measurement>,
    pub disk: Option<Measurement>,
    /// Failures of either pass
    pub errors: Vec<String>,
}

impl BenchmarkResult {
    /// Pairs the two measurements of the same file, which must have the same size.
    pub fn pair(filename: String, memory: Measurement, disk: Measurement) -> anyhow::Result<Self> {
        if memory.size_bytes != disk.size_bytes {
            return Err(anyhow!(
                "{}: memory pass measured {} bytes but disk pass measured {}",
                filename,
                memory.size_bytes,
                disk.size_bytes
            ));
        }
        Ok(Self {
            filename,
            memory: Some(memory),
            disk: Some(disk),
            errors: Vec::new(),
        })
    }

    fn from_tasks(memory: &Task, disk: &Task) -> Self {
        let filename = memory.name();
        let mut errors = Vec::new();
        for (pass, task) in [("memory", memory), ("disk", disk)] {
            match &task.status {
                Status::Succeeded => {}
                Status::Failed(error) => errors.push(format!("{pass} pass: {error:#}")),
                Status::Pending => errors.push(format!("{pass} pass: not executed")),
            }
        }
        if let (true, Some(memory), Some(disk)) =
            (errors.is_empty(), memory.measurement, disk.measurement)
        {
            match Self::pair(filename.clone(), memory, disk) {
                Ok(result) => return result,
                Err(error) => errors.push(format!("{error:#}")),
            }
        }
        Self {
            filename,
            memory: memory.measurement,
            disk: disk.measurement,
            errors,
        }
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.memory.is_some() && self.disk.is_some()
    }
}

/// Aggregated outcome of a benchmark run
///
/// Totals cover successful pairs only. Both passes run all files concurrently, so each pass
/// duration is the longest file duration of that pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BenchmarkReport {
    pub results: Vec<BenchmarkResult>,
    pub files_succeeded: usize,
    pub total_size_mib: f64,
    #[serde(rename = "total_memory_duration_seconds", serialize_with = "serialize_seconds")]
    pub total_memory_duration: std::time::Duration,
    #[serde(rename = "total_disk_duration_seconds", serialize_with = "serialize_seconds")]
    pub total_disk_duration: std::time::Duration,
    pub avg_memory_speed: Option<f64>,
    pub avg_disk_speed: Option<f64>,
    /// Disk speed over memory speed
    pub speed_ratio: Option<f64>,
    pub saturation_threshold: f64,
    pub memory_bandwidth_wall: bool,
}

impl BenchmarkReport {
    pub fn from_results(results: Vec<BenchmarkResult>, saturation_threshold: f64) -> Self {
        let succeeded: Vec<&BenchmarkResult> =
            results.iter().filter(|result| result.is_success()).collect();
        let memory = Measurement::concurrent(succeeded.iter().filter_map(|r| r.memory.as_ref()));
        let disk = Measurement::concurrent(succeeded.iter().filter_map(|r| r.disk.as_ref()));
        let avg_memory_speed = memory.speed();
        let avg_disk_speed = disk.speed();
        let speed_ratio = match (avg_disk_speed, avg_memory_speed) {
            (Some(disk), Some(memory)) if memory > 0.0 => Some(disk / memory),
            _ => None,
        };
        let memory_bandwidth_wall = speed_ratio.is_some_and(|ratio| ratio >= saturation_threshold);
        Self {
            files_succeeded: succeeded.len(),
            total_size_mib: memory.size_mib(),
            total_memory_duration: memory.duration,
            total_disk_duration: disk.duration,
            avg_memory_speed,
            avg_disk_speed,
            speed_ratio,
            saturation_threshold,
            memory_bandwidth_wall,
            results,
        }
    }

    pub fn files_failed(&self) -> usize {
        self.results.len() - self.files_succeeded
    }
}

impl std::fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Benchmark results:")?;
        writeln!(
            f,
            "{:<20} {:>11} {:>12} {:>15} {:>12} {:>15}",
            "Filename", "Size (MiB)", "Memory (s)", "Memory (MiB/s)", "Disk (s)", "Disk (MiB/s)"
        )?;
        writeln!(f, "{}", "-".repeat(90))?;
        for result in &self.results {
            match (&result.memory, &result.disk) {
                (Some(memory), Some(disk)) if result.is_success() => writeln!(
                    f,
                    "{:<20} {:>11.2} {:>12.3} {:>15} {:>12.3} {:>15}",
                    result.filename,
                    memory.size_mib(),
                    memory.duration.as_secs_f64(),
                    Speed(memory.speed()),
                    disk.duration.as_secs_f64(),
                    Speed(disk.speed()),
                )?,
                _ => writeln!(
                    f,
                    "{:<20} FAILED: {}",
                    result.filename,
                    result.errors.join("; ")
                )?,
            }
        }
        writeln!(f, "\nTotal statistics:")?;
        writeln!(f, "total size: {:.2} MiB", self.total_size_mib)?;
        writeln!(
            f,
            "memory copy: {:.3} s, {} MiB/s",
            self.total_memory_duration.as_secs_f64(),
            Speed(self.avg_memory_speed)
        )?;
        writeln!(
            f,
            "disk copy:   {:.3} s, {} MiB/s",
            self.total_disk_duration.as_secs_f64(),
            Speed(self.avg_disk_speed)
        )?;
        match self.speed_ratio {
            Some(ratio) => writeln!(f, "disk/memory speed ratio: {ratio:.3}")?,
            None => writeln!(f, "disk/memory speed ratio: n/a")?,
        }
        if self.memory_bandwidth_wall {
            write!(
                f,
                "You may hit the memory bandwidth wall (ratio >= {:.2})",
                self.saturation_threshold
            )
        } else {
            write!(
                f,
                "Disk transfers are not memory-bound (threshold {:.2})",
                self.saturation_threshold
            )
        }
    }
}

fn failed_names(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .filter_map(|task| match &task.status {
            Status::Succeeded => None,
            Status::Failed(error) => Some(format!("{} ({:#})", task.name(), error)),
            Status::Pending => Some(format!("{} (not executed)", task.name())),
        })
        .collect()
}

/// Name of the disk pass copy of the `index`-th (1-based) test file.
pub fn disk_copy_name(index: usize) -> String {
    format!("{}_disk", filegen::file_name(index))
}

/// Runs the generation, memory and disk passes and aggregates them into a report.
///
/// A failed generation aborts the run. Failures during the memory or disk pass only exclude the
/// affected files from the totals.
#[instrument(skip(prog_track))]
pub fn benchmark(
    prog_track: &progress::Progress,
    settings: &BenchmarkSettings,
) -> anyhow::Result<BenchmarkReport> {
    settings.validate()?;
    for dir in [&settings.source_dir, &settings.destination_dir] {
        std::fs::create_dir_all(dir).with_context(|| format!("cannot create directory {dir:?}"))?;
    }
    tracing::info!(
        "generating {} test files of {} in {:?}",
        settings.num_files,
        bytesize::ByteSize(settings.file_size),
        &settings.source_dir
    );
    let generated = filegen::filegen(
        prog_track,
        &settings.source_dir,
        settings.num_files,
        settings.file_size,
        &settings.transfer,
    );
    let failed = failed_names(&generated);
    if !failed.is_empty() {
        return Err(anyhow!(
            "failed generating test files: {}",
            failed.join(", ")
        ));
    }
    tracing::info!("running memory copy pass");
    let mut memory_tasks: Vec<Task> = generated
        .iter()
        .map(|task| {
            Task::transfer(
                task.source.clone(),
                None,
                Strategy::MemoryBandwidthSimulation,
            )
        })
        .collect();
    crate::dispatch::run_tasks(prog_track, &mut memory_tasks, &settings.transfer);
    tracing::info!("running disk copy pass");
    let mut disk_tasks: Vec<Task> = generated
        .iter()
        .enumerate()
        .map(|(idx, task)| {
            Task::transfer(
                task.source.clone(),
                Some(settings.destination_dir.join(disk_copy_name(idx + 1))),
                Strategy::DirectIo,
            )
        })
        .collect();
    crate::dispatch::run_tasks(prog_track, &mut disk_tasks, &settings.transfer);
    let results = memory_tasks
        .iter()
        .zip(&disk_tasks)
        .map(|(memory, disk)| BenchmarkResult::from_tasks(memory, disk))
        .collect();
    Ok(BenchmarkReport::from_results(
        results,
        settings.saturation_threshold,
    ))
}

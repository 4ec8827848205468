use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pbench",
    version,
    about = "Compare in-memory copy bandwidth against direct I/O disk copies",
    long_about = "`pbench` generates NUM_FILES test files of FILE_SIZE bytes in SOURCE_DIR, measures an \
in-memory copy of each file (no disk I/O) and then a direct I/O copy of each file into DEST_DIR. \
Each pass runs all files in parallel. When the disk pass reaches the saturation threshold of the \
memory pass (0.95 by default) the transfers are bounded by memory bandwidth, not by the disks.

EXAMPLE:
    # Two 1 GiB files
    pbench --file-size 1G --num-files 2 /mnt/src /mnt/dst"
)]
struct Args {
    // Benchmark options
    /// Size of each test file. Accepts suffixes like "100M", "1G" (binary multiples)
    #[arg(long, value_name = "SIZE", value_parser = common::parse_size, help_heading = "Benchmark options")]
    file_size: u64,

    /// Number of test files
    #[arg(long, value_name = "N", help_heading = "Benchmark options")]
    num_files: usize,

    /// Disk to memory speed ratio considered memory-bound
    #[arg(long, default_value_t = common::benchmark::SATURATION_THRESHOLD, value_name = "RATIO", help_heading = "Benchmark options")]
    threshold: f64,

    /// Do not fall back to buffered I/O when the filesystem rejects unbuffered I/O
    #[arg(long, help_heading = "Benchmark options")]
    no_direct_fallback: bool,

    // Tuning
    /// Alignment of unbuffered transfers, a power of two
    #[arg(long, default_value = "512", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    block_size: u64,

    /// Largest single direct I/O read, also the size of the simulation buffers
    #[arg(long, default_value = "1G", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    read_ceiling: u64,

    /// Sub-block size of the simulated DMA copy
    #[arg(long, default_value = "2M", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    dma_block_size: u64,

    /// Size of the buffer written repeatedly when generating test files
    #[arg(long, default_value = "1M", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    generate_chunk_size: u64,

    // Progress & output
    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print progress counters at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    /// Print the report as JSON
    #[arg(long, help_heading = "Progress & output")]
    json: bool,

    // ARGUMENTS
    /// Directory where test files are generated, created if missing
    #[arg()]
    source_dir: std::path::PathBuf,

    /// Directory receiving the disk copies, created if missing
    #[arg()]
    destination_dir: std::path::PathBuf,
}

impl Args {
    fn settings(&self) -> common::BenchmarkSettings {
        common::BenchmarkSettings {
            transfer: common::TransferSettings {
                block_size: self.block_size,
                read_ceiling: self.read_ceiling,
                dma_block_size: self.dma_block_size,
                generate_chunk_size: self.generate_chunk_size,
                direct_fallback: !self.no_direct_fallback,
                ..Default::default()
            },
            saturation_threshold: self.threshold,
            ..common::BenchmarkSettings::new(
                self.file_size,
                self.num_files,
                self.source_dir.clone(),
                self.destination_dir.clone(),
            )
        }
    }
}

#[instrument(skip(prog_track))]
fn run_pbench(
    args: &Args,
    prog_track: &common::progress::Progress,
) -> Result<common::BenchmarkReport> {
    let report = common::benchmark(prog_track, &args.settings())?;
    if report.files_failed() > 0 {
        return Err(anyhow!("pbench encountered errors\n\n{}", &report));
    }
    Ok(report)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
        json: args.json,
    };
    let prog_track = common::progress::Progress::new();
    let res = common::run(output, || run_pbench(&args, &prog_track));
    if output.print_summary && !output.quiet {
        eprintln!("{prog_track}");
    }
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}

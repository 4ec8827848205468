use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pcopy",
    version,
    about = "Copy files in parallel with a selectable transfer strategy",
    long_about = "`pcopy` copies every SOURCE into DEST_DIR/<file name>, one thread per file, using \
the chosen transfer strategy, and reports the size, duration and speed of each copy.

STRATEGIES:
    cp             delegate the copy to the operating system
    mmap           copy through memory-mapped windows
    direct-io      block-aligned reads and writes bypassing the page cache
    memory-impact  simulate a DMA copy in memory, nothing is written

EXAMPLE:
    # Copy two files with direct I/O
    pcopy --strategy direct-io /data/a.bin /data/b.bin /mnt/target"
)]
struct Args {
    // Transfer options
    /// Transfer strategy
    #[arg(short = 's', long, value_name = "STRATEGY", help_heading = "Transfer options")]
    strategy: common::Strategy,

    /// Do not fall back to buffered I/O when the filesystem rejects unbuffered I/O
    #[arg(long, help_heading = "Transfer options")]
    no_direct_fallback: bool,

    // Tuning
    /// Alignment of unbuffered transfers, a power of two
    #[arg(long, default_value = "512", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    block_size: u64,

    /// Largest single direct I/O read, also the size of the simulation buffers
    #[arg(long, default_value = "1G", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    read_ceiling: u64,

    /// Largest memory-mapped window
    #[arg(long, default_value = "512M", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    mmap_chunk_size: u64,

    /// Sub-block size of the simulated DMA copy
    #[arg(long, default_value = "2M", value_name = "SIZE", value_parser = common::parse_size, help_heading = "Tuning")]
    dma_block_size: u64,

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

    /// Print the results as JSON
    #[arg(long, help_heading = "Progress & output")]
    json: bool,

    // ARGUMENTS
    /// Source file(s) followed by the destination directory
    #[arg(required = true, num_args = 2.., value_name = "PATH")]
    paths: Vec<std::path::PathBuf>,
}

impl Args {
    fn settings(&self) -> common::TransferSettings {
        common::TransferSettings {
            block_size: self.block_size,
            read_ceiling: self.read_ceiling,
            mmap_chunk_size: self.mmap_chunk_size,
            dma_block_size: self.dma_block_size,
            direct_fallback: !self.no_direct_fallback,
            ..Default::default()
        }
    }
}

fn build_tasks(
    strategy: common::Strategy,
    sources: &[std::path::PathBuf],
    dest_dir: &std::path::Path,
) -> Result<Vec<common::Task>> {
    sources
        .iter()
        .map(|source| {
            let name = source
                .file_name()
                .ok_or_else(|| anyhow!("source {:?} does not name a file", source))?;
            let destination = strategy.needs_destination().then(|| dest_dir.join(name));
            Ok(common::Task::transfer(source.clone(), destination, strategy))
        })
        .collect()
}

#[instrument(skip(prog_track))]
fn run_pcopy(
    args: &Args,
    prog_track: &common::progress::Progress,
) -> Result<common::CopySummary> {
    let settings = args.settings();
    settings.validate()?;
    let (dest_dir, sources) = args
        .paths
        .split_last()
        .ok_or_else(|| anyhow!("missing destination directory"))?;
    let metadata = std::fs::metadata(dest_dir)
        .with_context(|| format!("cannot access destination {:?}", dest_dir))?;
    if !metadata.is_dir() {
        return Err(anyhow!("destination {:?} is not a directory", dest_dir));
    }
    let mut tasks = build_tasks(args.strategy, sources, dest_dir)?;
    tracing::info!("copying {} files with {}", tasks.len(), args.strategy);
    common::dispatch::run_tasks(prog_track, &mut tasks, &settings);
    let summary = common::CopySummary::from_tasks(&tasks);
    if !summary.is_success() {
        return Err(anyhow!("pcopy encountered errors\n\n{}", &summary));
    }
    Ok(summary)
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
    let res = common::run(output, || run_pcopy(&args, &prog_track));
    if output.print_summary && !output.quiet {
        eprintln!("{prog_track}");
    }
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "filegen",
    version,
    about = "Generate deterministic synthetic test files",
    long_about = "`filegen` writes NUM_FILES files named test_file_1 .. test_file_N of FILESIZE bytes \
each into ROOT, one thread per file. Every file holds the same linear-congruential byte \
stream, so runs with the same generator parameters produce identical files.

EXAMPLE:
    # Generate 4 files of 1 GiB each
    filegen /mnt/scratch 4 1G --summary"
)]
struct Args {
    // Generation options
    /// Size of the buffer filled once and written repeatedly. Accepts suffixes like "4K", "1M"
    #[arg(
        long,
        default_value = "1M",
        value_name = "SIZE",
        value_parser = common::parse_size,
        help_heading = "Generation options"
    )]
    chunk_size: u64,

    /// Initial state of the generator
    #[arg(long, default_value_t = common::rng::DEFAULT_SEED, value_name = "N", help_heading = "Generation options")]
    seed: u64,

    /// Multiplier of the generator
    #[arg(long, default_value_t = common::rng::DEFAULT_MULTIPLIER, value_name = "N", help_heading = "Generation options")]
    multiplier: u64,

    /// Increment of the generator
    #[arg(long, default_value_t = common::rng::DEFAULT_INCREMENT, value_name = "N", help_heading = "Generation options")]
    increment: u64,

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
    /// Directory where files are generated, created if missing
    #[arg()]
    root: std::path::PathBuf,

    /// Number of files to generate
    #[arg()]
    num_files: usize,

    /// Size of each file. Accepts suffixes like "1K", "10M", "1G" (binary multiples) or "1MB"
    #[arg(value_parser = common::parse_size)]
    filesize: u64,
}

#[instrument(skip(prog_track))]
fn run_filegen(
    args: &Args,
    prog_track: &common::progress::Progress,
) -> Result<common::CopySummary> {
    if args.num_files == 0 {
        return Err(anyhow!("number of files must be greater than 0"));
    }
    if args.filesize == 0 {
        return Err(anyhow!("file size must be greater than 0"));
    }
    let settings = common::TransferSettings {
        generate_chunk_size: args.chunk_size,
        generator: common::rng::Lcg::new(args.seed, args.multiplier, args.increment),
        ..Default::default()
    };
    settings.validate()?;
    std::fs::create_dir_all(&args.root)
        .with_context(|| format!("cannot create directory {:?}", &args.root))?;
    let summary = common::filegen::filegen_summary(
        prog_track,
        &args.root,
        args.num_files,
        args.filesize,
        &settings,
    );
    if !summary.is_success() {
        return Err(anyhow!("filegen encountered errors\n\n{}", &summary));
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
    let res = common::run(output, || run_filegen(&args, &prog_track));
    if output.print_summary && !output.quiet {
        eprintln!("{prog_track}");
    }
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}

//! fwflash - build firmware and flash it to a device
//!
//! ## Commands
//!
//! - `flash`: stage a build, resolve the binary, record its integrity, flash it
//! - `inspect`: re-verify a persisted integrity record
//!
//! ## Exit codes
//!
//! | code | meaning                                   |
//! |------|-------------------------------------------|
//! | 0    | success                                   |
//! | 1    | project path missing or not a directory   |
//! | 2    | build manifest missing or unreadable      |
//! | 3    | build failed, could not start, timed out  |
//! | 4    | staging directory could not be created    |
//! | 5    | binary not found or ambiguous             |
//! | 6    | integrity record could not be written     |
//! | 7    | flash failed                              |
//! | 8    | configuration error                       |

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fwflash_core::IntegrityRecord;
use fwflash_pipeline::{CleanupPolicy, FlashPipeline, PipelineConfig, PipelineError};
use fwflash_transport::{DeviceTarget, TransportConfig};
use tracing::{info, Level};

const PROJECT_PROMPT: &str = "Please enter the path to the folder that contains the target Cargo.toml: ";

const EXIT_INVALID_PROJECT: i32 = 1;
const EXIT_INTEGRITY: i32 = 6;

#[derive(Parser)]
#[command(name = "fwflash")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build a firmware project and flash it to a device", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a project into a fresh staging directory and flash the result
    Flash(FlashArgs),

    /// Decode an integrity record and re-verify its checksum
    Inspect {
        /// Path to a `<staged-dir>.integrity.json` file
        record: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
struct FlashArgs {
    /// Project directory containing Cargo.toml (prompted for if omitted)
    path: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Build with --release
    #[arg(long)]
    release: bool,

    /// Staged build cleanup: retain, on-success, always
    #[arg(long)]
    cleanup: Option<CleanupPolicy>,

    /// Transport: probe (default), serial, mass-storage, network
    #[arg(short, long)]
    transport: Option<TransportConfig>,

    /// Device address (serial port, probe selector, mount point, host:port)
    #[arg(short, long, env = "FWFLASH_DEVICE")]
    device: Option<String>,

    /// Chip name for debug probes
    #[arg(long)]
    chip: Option<String>,

    /// Build timeout in seconds (0 disables)
    #[arg(long)]
    build_timeout: Option<u64>,

    /// Flash timeout in seconds
    #[arg(long)]
    flash_timeout: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fwflash_core::init_tracing(cli.json, level);

    let code = match cli.command {
        Commands::Flash(args) => cmd_flash(args).await,
        Commands::Inspect { record } => match cmd_inspect(&record) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("error: {e:#}");
                EXIT_INTEGRITY
            }
        },
    };
    std::process::exit(code);
}

async fn cmd_flash(args: FlashArgs) -> i32 {
    let config = match resolve_config(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };

    let project = match args.path.clone() {
        Some(p) => p,
        None => match prompt_for_project(&mut io::stdin().lock(), &mut io::stdout()) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("error: {e:#}");
                return EXIT_INVALID_PROJECT;
            }
        },
    };

    let pipeline = match FlashPipeline::from_config(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return e.exit_code();
        }
    };

    info!(
        project = %project.display(),
        transport = %pipeline.config().transport,
        device = %pipeline.device(),
        "starting run"
    );

    match pipeline.run(&project).await {
        Ok(run) => {
            println!("Flashed {}", run.artifact.path().display());
            println!("Device:     {}", run.receipt.device);
            println!("Bytes:      {}", run.receipt.bytes_written);
            println!("Checksum:   {}", run.record.checksum);
            println!("Record:     {}", run.record_path.display());
            if run.staged_removed {
                println!("Build dir:  removed");
            } else {
                println!("Build dir:  {}", run.staged_dir.display());
            }
            println!("Run:        {} ({} ms)", run.run_id, run.duration_ms);
            0
        }
        Err(aborted) => {
            eprintln!("error: {aborted}");
            if let Some(dir) = &aborted.staged_dir {
                eprintln!("build dir kept at {}", dir.display());
            }
            if let Some(record) = &aborted.record_path {
                eprintln!("integrity record at {}", record.display());
            }
            aborted.exit_code()
        }
    }
}

/// Config file, then `FWFLASH_*` environment, then flags.
fn resolve_config(args: &FlashArgs) -> Result<PipelineConfig, PipelineError> {
    let base = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    apply_flags(base.with_process_env()?, args)
}

fn apply_flags(mut config: PipelineConfig, args: &FlashArgs) -> Result<PipelineConfig, PipelineError> {
    if args.release {
        config.build.release = true;
    }
    if let Some(policy) = args.cleanup {
        config.cleanup = policy;
    }
    if let Some(transport) = &args.transport {
        config.transport = transport.clone();
    }
    if let Some(address) = &args.device {
        let chip = config.device.take().and_then(|d| d.chip);
        config.device = Some(DeviceTarget {
            address: address.clone(),
            chip,
        });
    }
    if let Some(chip) = &args.chip {
        match config.device.as_mut() {
            Some(device) => device.chip = Some(chip.clone()),
            None => {
                return Err(PipelineError::Config(
                    "--chip needs a device (--device or config file)".to_string(),
                ))
            }
        }
    }
    if let Some(secs) = args.build_timeout {
        config.build.timeout_secs = secs;
    }
    if let Some(secs) = args.flash_timeout {
        config.flash_timeout_secs = secs;
    }
    Ok(config)
}

fn prompt_for_project(input: &mut impl BufRead, output: &mut impl Write) -> Result<PathBuf> {
    write!(output, "{PROJECT_PROMPT}")?;
    output.flush()?;

    let mut line = String::new();
    let n = input.read_line(&mut line).context("failed to read project path")?;
    let path = line.trim();
    if n == 0 || path.is_empty() {
        anyhow::bail!("no project path given");
    }
    Ok(PathBuf::from(path))
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let record = IntegrityRecord::load(path)
        .with_context(|| format!("failed to load integrity record {}", path.display()))?;
    let content = record
        .verify()
        .with_context(|| format!("integrity record {} does not verify", path.display()))?;

    println!("Artifact:   {}", record.path);
    println!("Project:    {}", record.project);
    println!("Recorded:   {}", record.timestamp.to_rfc3339());
    println!("Bytes:      {}", content.len());
    println!("Checksum:   {} (verified)", record.checksum);
    Ok(())
}

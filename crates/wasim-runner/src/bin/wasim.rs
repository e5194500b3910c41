use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wasim_bridge::Console;
use wasim_runner::{Driver, RunConfig};

/// Run a WebAssembly guest built for a JavaScript host, without one.
#[derive(Debug, Parser)]
#[command(name = "wasim", version, about)]
struct Cli {
    /// Guest module (.wasm).
    guest: PathBuf,

    /// JSON run configuration; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the durable trace store.
    #[arg(long)]
    trace_dir: Option<PathBuf>,

    /// Inventory the guest's debug sections before running it.
    #[arg(long)]
    debug_info: bool,

    /// Write the run report as JSON to this path.
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wasim: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if cli.trace_dir.is_some() {
        config.trace_dir = cli.trace_dir.clone();
    }
    config.extract_debug_info |= cli.debug_info;

    let wasm = fs::read(&cli.guest)
        .with_context(|| format!("failed to read guest {}", cli.guest.display()))?;

    let store = config.trace_store();
    let mut driver = Driver::new(config, store);
    let report = driver.run(&wasm, Console::std())?;
    info!(
        entry = %report.entry,
        results = report.results.len(),
        functions_recorded = report.functions_recorded,
        "guest finished"
    );

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
    }
    Ok(())
}

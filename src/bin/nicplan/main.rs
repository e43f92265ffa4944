//! `nicplan` - applies a cloud-init `network-config` document to the
//! network adapters of a Windows host.
//!
//! # Usage
//!
//! ```sh
//! nicplan --config C:\ProgramData\nicplan\nicplan.toml
//! nicplan --document D:\network-config --dry-run
//! nicplan install
//! ```

mod settings;

use std::{env, fs, path::Path, process::ExitCode};

use anyhow::{Context, Result};
use clap::Parser;
use nicplan::{
    ConfigError, RunReport, apply_document,
    host::{self, DryRunInventory, NetshSink},
    load_document,
};
use settings::{Args, Command, Config, Settings};
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Initializes logging to stderr and, when `log_path` is set, to that file.
///
/// The log level can be controlled via the `RUST_LOG` environment variable,
/// defaulting to INFO.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened or created.
fn init_tracing(log_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let console = fmt::Layer::default()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter());

    let (file_layer, guard) = match log_path {
        Some(path) => {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open the log file: {}", path.display()))?;
            let (non_blocking, file_guard) = tracing_appender::non_blocking(file);
            let layer = fmt::Layer::default()
                .with_ansi(false)
                .with_target(false)
                .with_writer(non_blocking)
                .with_filter(env_filter());
            (Some(layer), Some(file_guard))
        }
        None => (None, None),
    };

    tracing_subscriber::Registry::default()
        .with(console)
        .with(file_layer)
        .init();
    Ok(guard)
}

fn run(settings: &Settings) -> Result<RunReport, ConfigError> {
    let path = match &settings.document {
        Some(path) => path.clone(),
        None => host::locate_document(
            &settings.config.drive_labels,
            &settings.config.document_name,
        )?,
    };
    tracing::info!("applying {}", path.display());
    let text = load_document(&path)?;

    if settings.dry_run {
        let mut inventory = DryRunInventory::new(host::host_inventory());
        let mut sink = NetshSink::new(true);
        apply_document(&text, &mut inventory, &mut sink)
    } else {
        let mut inventory = host::host_inventory();
        let mut sink = NetshSink::new(false);
        apply_document(&text, &mut inventory, &mut sink)
    }
}

fn log_report(report: &RunReport) {
    for err in &report.rejected {
        tracing::warn!("skipped: {err}");
    }
    for err in &report.unmatched {
        tracing::warn!("{err}");
    }
    for result in &report.results {
        if result.aborted {
            tracing::error!("{}: aborted", result.interface);
        }
        for err in &result.failures {
            tracing::error!("{err}");
        }
    }
    let failed = report.failed_interfaces();
    if !failed.is_empty() {
        tracing::warn!("interfaces with failures: {}", failed.join(", "));
    }
    tracing::info!("{report}");
}

fn install(settings: &Settings) -> Result<()> {
    let exe = env::current_exe().context("Failed to locate the nicplan executable")?;
    let args = settings.task_args()?;
    host::install_boot_task(&settings.config.task_name, &exe, &args)
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_tracing(config.log_path.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut settings = Settings::from_args(&args, config);
    if let Some(path) = &settings.config_path {
        tracing::info!("Loaded config from: {}", path.display());
    }

    if args.command == Some(Command::Install) {
        return match install(&settings) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{e:#}");
                ExitCode::FAILURE
            }
        };
    }

    if cfg!(not(windows)) && !settings.dry_run {
        tracing::warn!("not running on Windows; forcing a dry run");
        settings.dry_run = true;
    }

    match run(&settings) {
        Ok(report) => {
            log_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

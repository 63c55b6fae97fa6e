//! Plinth bring-up daemon (plinthd)
//!
//! Loads the platform description, registers every component and runs one
//! priority-ordered bring-up pass, then prints the resulting report.
//!
//! # Exit Codes
//! - `0`: every component is healthy
//! - `1`: configuration or structural error
//! - `2`: at least one component is degraded or failed

mod summary;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pl_core::{config_path, load_platform_config, Backend, CancelFlag, Platform, PlatformConfig};
use tracing::{debug, error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_ENV: &str = "PLINTH_LOG";
const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    json: bool,
    dry_run: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Options),
    Help,
    Version,
}

fn parse_args<I>(args: I) -> std::result::Result<Command, String>
where
    I: IntoIterator<Item = String>,
{
    let mut options = Options::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args.next().ok_or("--config requires a path argument")?;
                options.config = Some(PathBuf::from(path));
            }
            "--json" => options.json = true,
            "--dry-run" => options.dry_run = true,
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }
    Ok(Command::Run(options))
}

fn print_help() {
    eprintln!("plinthd {} - Plinth platform bring-up", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    plinthd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Platform description (JSON)");
    eprintln!("        --json          Print report and inventory as JSON");
    eprintln!("        --dry-run       Use simulated drivers instead of the kernel");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    PLINTH_CONFIG       Platform description path");
    eprintln!("    PLINTH_LOG          Log level (trace, debug, info, warn, error)");
}

// ============================================================================
// Setup
// ============================================================================

/// Journald when the systemd journal is reachable, stderr otherwise.
/// Returns true when logging to the journal.
fn init_logging() -> bool {
    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());

    if Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return true;
            }
            Err(e) => eprintln!("Failed to create journald layer: {}, falling back to stderr", e),
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(&log_level)
        .init();
    false
}

/// Kernel bring-up writes to sysfs `new_device`, which needs root
fn check_privileges(config: &PlatformConfig) {
    if config.backend != Backend::Kernel {
        return;
    }
    // SAFETY: geteuid is always safe - it just returns the process's effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Running as euid={}; binding kernel drivers will likely fail", euid);
    } else {
        debug!("Running as root");
    }
}

async fn load_config(path: PathBuf) -> Result<PlatformConfig> {
    let shown = path.display().to_string();
    tokio::task::spawn_blocking(move || load_platform_config(&path))
        .await
        .map_err(|e| anyhow::anyhow!("config load task panicked: {}", e))?
        .with_context(|| format!("failed to load platform description {}", shown))
}

// ============================================================================
// Main Entry Point
// ============================================================================

async fn run(options: Options) -> Result<i32> {
    let path = config_path(options.config.as_deref());
    info!("STARTUP: plinthd {} using {}", VERSION, path.display());

    let mut config = load_config(path).await?;
    if options.dry_run {
        info!("STARTUP: dry run, simulated drivers only");
        config.backend = Backend::Simulated;
    }
    check_privileges(&config);

    let platform = Platform::from_config(&config).context("failed to build component registry")?;

    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: interrupt received, stopping after the current band");
        handler_flag.cancel();
    }) {
        warn!("Failed to set signal handler: {}. Bring-up cannot be interrupted cleanly.", e);
    }

    let report = platform.bring_up(&cancel).await.context("bring-up aborted")?;
    let inventory = platform.inventory();

    if options.json {
        let output = summary::JsonOutput {
            report: &report,
            inventory: &inventory,
        };
        println!("{}", serde_json::to_string_pretty(&output).context("failed to encode report")?);
    } else {
        print!("{}", summary::render(&report, &inventory));
    }

    let code = summary::exit_code(&report, &inventory);
    let dropped = platform.shutdown();
    debug!("SHUTDOWN: released {} component(s)", dropped);
    Ok(code)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Command::Help) => {
            print_help();
            return;
        }
        Ok(Command::Version) => {
            println!("plinthd {}", VERSION);
            return;
        }
        Ok(Command::Run(options)) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(summary::EXIT_ERROR);
        }
    };

    let journald = init_logging();
    debug!("STARTUP: logging to {}", if journald { "systemd journal" } else { "stderr" });

    match run(options).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("plinthd: {:#}", e);
            std::process::exit(summary::EXIT_ERROR);
        }
    }
}

//! Thermal Control Daemon (hw-thermald)
//!
//! Privileged service that keeps a network switch cool: it polls ASIC,
//! module, fan, PSU, ambient and DPU temperatures and drives the fan PWM
//! attributes through sysfs.
//!
//! # Lifecycle
//! - **Init**: default configuration, signal listeners, then the real load
//! - **Running**: per-sensor polling and zone regulation
//! - **Stopping**: every zone commanded to its safe duty cycle
//!
//! # Signals
//! - `SIGTERM` / `SIGINT`: graceful stop
//! - `SIGHUP`: re-read the log-level file and reloadable parameters

mod lifecycle;
mod logging;
mod signals;

use std::path::PathBuf;

use tracing::{error, info, warn};

use tc_core::constants::{exit, paths};

use crate::lifecycle::{DaemonContext, DaemonOptions};
use crate::logging::LogControl;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    sku: Option<String>,
    log_level: Option<String>,
    log_level_file: Option<PathBuf>,
}

/// Warn when not root; sysfs writes will fail but the daemon keeps running
fn verify_privileges() {
    // SAFETY: geteuid always succeeds and only returns the effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!("Not running as root (euid={}), PWM writes are likely to fail", euid);
    } else {
        info!("Running as root");
    }
}

// ============================================================================
// CLI
// ============================================================================

fn print_help() {
    eprintln!("hw-thermald {} - switch thermal control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    hw-thermald [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH         Configuration file ({})", paths::CONFIG_FILE);
    eprintln!("        --sku NAME            Platform SKU (default: from DMI)");
    eprintln!("        --log-level LEVEL     Initial log level");
    eprintln!("        --log-level-file PATH Level file read on start and SIGHUP");
    eprintln!("    -v, --version             Print version");
    eprintln!("    -h, --help                Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    {}            Log level or filter directive", logging::LEVEL_ENV);
    eprintln!();
    eprintln!("SIGNALS:");
    eprintln!("    SIGTERM, SIGINT           Apply safe fan speed and exit");
    eprintln!("    SIGHUP                    Reload log level and zone tuning");
}

fn print_version() {
    println!("hw-thermald {}", VERSION);
}

/// Parse arguments; `Ok(None)` means help or version was printed
fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            "-v" | "--version" => {
                print_version();
                return Ok(None);
            }
            flag @ ("-c" | "--config" | "--sku" | "--log-level" | "--log-level-file") => {
                i += 1;
                let Some(value) = args.get(i) else {
                    return Err(format!("{} requires an argument", flag));
                };
                match flag {
                    "-c" | "--config" => parsed.config = Some(PathBuf::from(value)),
                    "--sku" => parsed.sku = Some(value.clone()),
                    "--log-level" => parsed.log_level = Some(value.clone()),
                    _ => parsed.log_level_file = Some(PathBuf::from(value)),
                }
            }
            arg => return Err(format!("Unknown argument: {}", arg)),
        }
        i += 1;
    }
    Ok(Some(parsed))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Panics are reported on stderr (captured by journald under systemd).
    // The control loop catches them and still runs the shutdown path.
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    let argv: Vec<String> = std::env::args().collect();
    let args = match parse_args(&argv) {
        Ok(Some(args)) => args,
        Ok(None) => return,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(exit::CONFIG);
        }
    };

    std::process::exit(run(args).await);
}

async fn run(args: Args) -> i32 {
    // Logging
    let level_file = args
        .log_level_file
        .unwrap_or_else(|| PathBuf::from(paths::LOG_LEVEL_FILE));
    let env_level = std::env::var(logging::LEVEL_ENV).ok();
    let level = logging::initial_level(args.log_level.as_deref(), env_level.as_deref(), &level_file);
    let (log, sink) = LogControl::init(&level, level_file);

    info!("STARTUP: hw-thermald {} starting", VERSION);
    info!("STARTUP: Logging to {} at level {}", sink.describe(), log.level());
    verify_privileges();

    // Init: default configuration is in place before any listener exists
    let mut options = DaemonOptions::default();
    if let Some(config) = args.config {
        options.config_path = config;
    }
    options.sku = args.sku;
    let mut ctx = DaemonContext::new(options, log);

    if let Err(e) = signals::install_listeners(&ctx.flags()) {
        error!("STARTUP: {:#}", e);
        ctx.stop();
        return exit::FATAL;
    }

    if let Err(e) = ctx.load() {
        error!("STARTUP: {:#}", e);
        ctx.stop();
        return exit::CONFIG;
    }
    info!("STARTUP: PID: {}", std::process::id());

    // Running
    let result = ctx.run().await;

    // Stopping
    ctx.stop();
    match result {
        Ok(()) => exit::CLEAN,
        Err(e) => {
            error!("{:#}", e);
            exit::FATAL
        }
    }
}

//! Logging module for the Corral orchestrator
//!
//! Structured logging with tracing: pretty output on a terminal, JSON
//! everywhere else, and always JSON to the log file.

use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::MakeWriterExt},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_DIRS: [&str; 2] = ["/var/log/corral", "./logs"];

fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Open the orchestrator log file in the first writable log directory
fn open_log_file() -> Result<File> {
    let mut last_error = None;
    for dir in LOG_DIRS {
        let opened = std::fs::create_dir_all(dir).and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(Path::new(dir).join("orchestrator.log"))
        });
        match opened {
            Ok(file) => return Ok(file),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error
        .map(anyhow::Error::from)
        .unwrap_or_else(|| anyhow::anyhow!("no log directory configured")))
    .context("Failed to open log file")
}

/// Initialize the logging/tracing system
pub fn init_logging(log_level: &str) -> Result<()> {
    let level = parse_level(log_level);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("corral_orchestrator={},tower_http=info", level)));

    let log_file = Mutex::new(open_log_file()?);

    if std::io::stdout().is_terminal() {
        let stdout_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .pretty()
            .with_writer(std::io::stdout);

        let file_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .with_writer(log_file.and(std::io::stderr.with_max_level(Level::ERROR)));

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .json()
            .with_writer(log_file.and(std::io::stdout));

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(())
}

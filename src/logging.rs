//! Tracing setup
//!
//! Everything goes to stderr, filtered by `RUST_LOG` or the verbosity flag.
//! Each component additionally appends to its own file in the log
//! directory, e.g. `logs/firecrawl.log` for the crawl watcher.

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::progress::LogWriterFactory;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::{warn, Level};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Log file name and the module targets written to it
pub const COMPONENT_LOGS: &[(&str, &[&str])] = &[
    ("firecrawl.log", &["crawldesk::crawl"]),
    ("vector_db.log", &["crawldesk::store", "crawldesk::embed"]),
    ("chat.log", &["crawldesk::chat"]),
    ("dashboard.log", &["crawldesk::dashboard"]),
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber
///
/// Failing to open the log files is not fatal; the process keeps logging
/// to stderr and reports why the files are missing.
pub fn init(config: &LoggingConfig, verbose: bool, json: bool) -> Result<()> {
    let (files, file_error) = match file_layers(&config.log_dir) {
        Ok(layers) => (layers, None),
        Err(e) => (Vec::new(), Some(e)),
    };

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("crawldesk={}", default_level)));

    let stderr = if json {
        fmt::layer()
            .json()
            .with_writer(LogWriterFactory)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(LogWriterFactory)
            .with_target(false)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(files)
        .with(stderr)
        .try_init()
        .map_err(|e| Error::Other(format!("Failed to install logger: {}", e)))?;

    if let Some(e) = file_error {
        warn!(
            "Log files in {} are unavailable: {}",
            config.log_dir.display(),
            e
        );
    }
    Ok(())
}

/// One append-only file layer per component
pub fn file_layers(log_dir: &Path) -> Result<Vec<BoxedLayer>> {
    fs::create_dir_all(log_dir)?;

    COMPONENT_LOGS
        .iter()
        .map(|(file_name, targets)| {
            let file = open_append(&log_dir.join(file_name))?;
            let filter = targets.iter().fold(Targets::new(), |acc, target| {
                acc.with_target(*target, Level::DEBUG)
            });

            Ok(fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(filter)
                .boxed())
        })
        .collect()
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })
}

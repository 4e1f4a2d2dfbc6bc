//! Logging setup and the run log.
//!
//! Console output is always on. When a log file is configured, every event
//! is also appended there with timestamp and level; the file is owned by
//! [`RunLog`] and synced when the run ends.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Subscriber};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Default filter for a `-v` count.
pub fn filter_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "catalog_etl=info,warn",
        1 => "catalog_etl=debug,info",
        _ => "trace",
    }
}

pub struct RunLog {
    file: Option<(PathBuf, Arc<File>)>,
    started: Instant,
}

impl RunLog {
    /// Install the global subscriber and open the log file, if any.
    pub fn open(verbose: u8, log_file: Option<&Path>) -> Result<Self> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_for(verbose)));

        let file = log_file.map(open_append).transpose()?;
        let to_file = file.as_ref().map(|(_, f)| file_layer(Arc::clone(f)));

        tracing_subscriber::registry()
            .with(fmt::layer().compact().with_target(false))
            .with(to_file)
            .with(filter)
            .try_init()
            .context("Logging already initialised")?;

        if let Some((path, _)) = &file {
            info!("Run log: {:?}", path);
        }
        Ok(Self { file, started: Instant::now() })
    }

    /// Write the closing line and sync the file to disk.
    pub fn close(mut self) -> Result<()> {
        info!("Run finished in {:.2?}", self.started.elapsed());
        if let Some((path, file)) = self.file.take() {
            file.sync_all().with_context(|| format!("Failed to sync {:?}", path))?;
        }
        Ok(())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        if let Some((path, file)) = self.file.take() {
            if let Err(e) = file.sync_all() {
                warn!("Could not sync {:?}: {}", path, e);
            }
        }
    }
}

/// Plain-text lines: timestamp, level, message.
fn file_layer<S>(file: Arc<File>) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer().with_ansi(false).with_target(false).with_writer(file)
}

fn open_append(path: &Path) -> Result<(PathBuf, Arc<File>)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Could not open log file {:?}", path))?;
    Ok((path.to_path_buf(), Arc::new(file)))
}

/// Logs how long a pipeline stage took when it goes out of scope.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Starting: {}", label);
        Self { label, start: Instant::now() }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("Finished: {} (took {:.2?})", self.label, self.start.elapsed());
    }
}

/// 1234567 → "1.234.567", the way the storefront prints counts.
pub fn group_digits(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    let sign = if n < 0 { "-" } else { "" };
    format!("{}{}", sign, groups.join("."))
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Runtime settings, read from `LODGEBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `bookings.wal`. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    /// WAL appends after which the log is compacted.
    pub compact_threshold: u64,
    /// How often properties with a failed post-write reconciliation are retried.
    pub reconcile_interval: Duration,
    pub metrics_port: Option<u16>,
    /// Capacity of the notification outbox.
    pub notify_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            compact_threshold: 1000,
            reconcile_interval: Duration::from_secs(30),
            metrics_port: None,
            notify_queue: 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Unset keys keep their defaults;
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("LODGEBOOK_DATA_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        Self {
            data_dir,
            compact_threshold: parsed(&lookup, "LODGEBOOK_COMPACT_THRESHOLD").unwrap_or(defaults.compact_threshold),
            reconcile_interval: parsed(&lookup, "LODGEBOOK_RECONCILE_INTERVAL_SECS")
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            metrics_port: parsed(&lookup, "LODGEBOOK_METRICS_PORT"),
            notify_queue: parsed(&lookup, "LODGEBOOK_NOTIFY_QUEUE")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.notify_queue),
        }
    }

    pub fn wal_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join("bookings.wal"))
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}

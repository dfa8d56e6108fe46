use std::path::PathBuf;

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding `salon.wal`.
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Compact the WAL once this many transactions were appended since the last compaction.
    pub compact_threshold: u64,
    /// Bound of the WAL writer's command queue.
    pub wal_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            wal_queue: 4096,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparsable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            data_dir: lookup("SALON_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: lookup("SALON_METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: lookup("SALON_COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.compact_threshold),
            wal_queue: lookup("SALON_WAL_QUEUE")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.wal_queue),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("salon.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_when_unset() {
        let cfg = Config::from_lookup(|_| None);
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.wal_path(), PathBuf::from("./data/salon.wal"));
    }

    #[test]
    fn reads_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("SALON_DATA_DIR", "/var/lib/salon"),
            ("SALON_METRICS_PORT", "9100"),
            ("SALON_COMPACT_THRESHOLD", "lots"),
            ("SALON_WAL_QUEUE", "0"),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/salon"));
        assert_eq!(cfg.metrics_port, Some(9100));
        assert_eq!(cfg.compact_threshold, 1000);
        assert_eq!(cfg.wal_queue, 4096);
    }
}

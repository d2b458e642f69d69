use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub remote: RemoteConfig,
    pub store: StoreConfig,
    pub download: DownloadConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the data origin; file names are appended directly, so
    /// this should end with a slash.
    pub base_url: String,
    /// Language of the data files to mirror.
    pub lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the local store.
    pub path: PathBuf,
    /// Records accumulated per progress tick inside a bulk write.
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Minimum advance of the read ratio between progress events.
    pub max_progress_resolution: f64,
    /// Seconds without a received byte before a download is abandoned.
    pub stall_timeout_secs: u64,
    /// Bound of the event channel between the downloader and the applier.
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// First retry is scheduled uniformly inside this window (ms).
    pub initial_backoff_min_ms: u64,
    pub initial_backoff_max_ms: u64,
    /// Upper bound on any backoff delay (ms).
    pub max_backoff_ms: u64,
    /// How many times a write-conflict failure is retried without backoff.
    pub max_constraint_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            remote: RemoteConfig {
                base_url: "https://data.jpdict.example/".to_string(),
                lang: "en".to_string(),
            },
            store: StoreConfig {
                path: PathBuf::from("jpdict-data"),
                batch_size: 4000,
            },
            download: DownloadConfig {
                max_progress_resolution: 0.05,
                stall_timeout_secs: 20,
                channel_capacity: 256,
            },
            retry: RetryConfig {
                initial_backoff_min_ms: 3_000,
                initial_backoff_max_ms: 6_000,
                max_backoff_ms: 12 * 60 * 60 * 1_000, // 12 hours
                max_constraint_retries: 2,
            },
        }
    }
}

impl DownloadConfig {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<DatabaseConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: DatabaseConfig = toml::from_str(&contents)?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &DatabaseConfig) -> anyhow::Result<()> {
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_toml() {
        let config = DatabaseConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: DatabaseConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.store.batch_size, config.store.batch_size);
        assert_eq!(parsed.retry.max_backoff_ms, config.retry.max_backoff_ms);
    }
}

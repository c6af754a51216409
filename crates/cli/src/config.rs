//! Environment configuration

use std::path::PathBuf;
use std::time::Duration;

use deck_core::sync::SyncConfig;
use deck_remote::{RestClientConfig, DEFAULT_BASE_URL};

const SNAPSHOT_FILE: &str = "storage.json";
const PENDING_FILE: &str = "pending.json";

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub api_url: String,
    pub poll_interval: Duration,
    pub sync_timeout: Option<Duration>,
    /// Sync after every command that edits the board
    pub auto_sync: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("DECK_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".deck-data"));
        let api_url = lookup("DECK_API_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let poll_ms = lookup("DECK_SYNC_POLL_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(1000);
        let sync_timeout = lookup("DECK_SYNC_TIMEOUT_SECS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let auto_sync = parse_flag(lookup("DECK_AUTO_SYNC").as_deref(), false);

        Self {
            data_dir,
            api_url,
            poll_interval: Duration::from_millis(poll_ms),
            sync_timeout,
            auto_sync,
        }
    }

    /// Last-synced snapshot
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }

    /// Working copy holding edits not yet synced
    pub fn pending_path(&self) -> PathBuf {
        self.data_dir.join(PENDING_FILE)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            poll_interval: self.poll_interval,
            timeout: self.sync_timeout,
        }
    }

    pub fn client_config(&self) -> RestClientConfig {
        RestClientConfig {
            base_url: self.api_url.clone(),
            ..RestClientConfig::default()
        }
    }
}

fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "ClinicQueue";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Queue snapshot lifetime: 5 minutes.
pub const DEFAULT_SNAPSHOT_TTL_SECS: u64 = 300;

/// Get the application data directory
/// ~/ClinicQueue/ on all platforms
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// SQLite database holding appointments and scheduler state
pub fn database_path() -> PathBuf {
    app_data_dir().join("clinic.db")
}

/// Optional JSON overrides for `BookingConfig`
pub fn config_path() -> PathBuf {
    app_data_dir().join("config.json")
}

/// Default `tracing` filter when `RUST_LOG` is unset
pub fn default_log_filter() -> &'static str {
    "clinic_queue_lib=info,clinic_queue=info,warn"
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Tunables for the queue cache and the guest-facing quotas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    /// Seconds before a cached queue snapshot is rebuilt regardless of invalidation.
    pub snapshot_ttl_secs: u64,
    /// Appointments a guest may create per calendar day, deleted ones included.
    pub max_daily_creations: u32,
    /// Unprocessed, undeleted appointments a guest may hold at once.
    pub max_open_appointments: u32,
    /// Urges per guest per calendar week (Monday start).
    pub weekly_urge_quota: u32,
    /// Guest edits per appointment per calendar day.
    pub daily_edit_quota: u32,
    /// Announcements kept; publishing past this drops the oldest.
    pub max_announcements: u32,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl_secs: DEFAULT_SNAPSHOT_TTL_SECS,
            max_daily_creations: 3,
            max_open_appointments: 3,
            weekly_urge_quota: 1,
            daily_edit_quota: 1,
            max_announcements: 5,
        }
    }
}

impl BookingConfig {
    pub fn snapshot_ttl(&self) -> chrono::Duration {
        // chrono::Duration::seconds panics beyond i64::MAX milliseconds
        let secs = self.snapshot_ttl_secs.min((i64::MAX / 1000) as u64) as i64;
        chrono::Duration::seconds(secs)
    }

    /// Load overrides from a JSON file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

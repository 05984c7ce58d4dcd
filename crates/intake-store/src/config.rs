use std::path::PathBuf;
use std::time::Duration;

use smol_str::SmolStr;
use url::Url;

use crate::backup::DEFAULT_BACKUP_KEY;
use crate::error::ConfigError;

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
    default: T,
) -> T {
    lookup(var)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Timing and retry settings for a session's save engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Base unit for backoff and the debounce window
    pub time_unit: Duration,
    /// Quiet window of the debounce gate, in time units
    pub debounce_units: u32,
    /// Full-payload attempts before falling back to the minimal payload
    pub max_attempts: u32,
    /// How far before "now" a loaded document's change stamp is placed
    pub load_offset: Duration,
    /// Key the local backup snapshot is stored under
    pub backup_key: SmolStr,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_millis(1000),
            debounce_units: 5,
            max_attempts: 3,
            load_offset: Duration::from_millis(1000),
            backup_key: SmolStr::new_static(DEFAULT_BACKUP_KEY),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional env vars:
    /// - `INTAKE_TIME_UNIT_MS`: Base time unit in ms (default: 1000)
    /// - `INTAKE_DEBOUNCE_UNITS`: Debounce quiet window in time units (default: 5)
    /// - `INTAKE_MAX_ATTEMPTS`: Full-payload save attempts (default: 3)
    /// - `INTAKE_LOAD_OFFSET_MS`: Change stamp offset after a load (default: 1000)
    /// - `INTAKE_BACKUP_KEY`: Local backup key (default: questionnaire_backup)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        Self {
            time_unit: Duration::from_millis(parse_or(
                &lookup,
                "INTAKE_TIME_UNIT_MS",
                default.time_unit.as_millis() as u64,
            )),
            debounce_units: parse_or(&lookup, "INTAKE_DEBOUNCE_UNITS", default.debounce_units),
            max_attempts: parse_or(&lookup, "INTAKE_MAX_ATTEMPTS", default.max_attempts),
            load_offset: Duration::from_millis(parse_or(
                &lookup,
                "INTAKE_LOAD_OFFSET_MS",
                default.load_offset.as_millis() as u64,
            )),
            backup_key: lookup("INTAKE_BACKUP_KEY")
                .map(|key| SmolStr::new(key.trim()))
                .filter(|key| !key.is_empty())
                .unwrap_or(default.backup_key),
        }
    }

    /// Attempt budget for the full payload, never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn quiet_window(&self) -> Duration {
        self.time_unit.saturating_mul(self.debounce_units)
    }

    /// Wait after a failed `attempt` (1-based): 1, 2, 4, ... time units.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.time_unit.saturating_mul(factor)
    }
}

/// Questionnaire API connection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    pub base_url: Url,
    pub timeout: Duration,
}

impl RemoteConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

    /// The base path always ends in `/` so relative joins nest under it.
    pub fn new(mut base_url: Url, timeout: Duration) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { base_url, timeout }
    }

    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `INTAKE_API_URL`: Base URL of the questionnaire API
    ///
    /// Optional env vars:
    /// - `INTAKE_REQUEST_TIMEOUT_MS`: Per-request timeout in ms (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url_str = lookup("INTAKE_API_URL").ok_or(ConfigError::MissingEnv {
            var: "INTAKE_API_URL",
        })?;

        let base_url = Url::parse(url_str.trim()).map_err(|e| ConfigError::UrlParse {
            url: url_str.clone(),
            message: e.to_string(),
        })?;

        let timeout = Duration::from_millis(parse_or(
            &lookup,
            "INTAKE_REQUEST_TIMEOUT_MS",
            Self::DEFAULT_TIMEOUT.as_millis() as u64,
        ));

        Ok(Self::new(base_url, timeout))
    }
}

/// Where file-backed local backups live
#[derive(Debug, Clone, PartialEq)]
pub struct BackupConfig {
    pub dir: PathBuf,
}

impl BackupConfig {
    pub const DEFAULT_DIR: &'static str = "./data/backup";

    /// Optional env vars:
    /// - `INTAKE_BACKUP_DIR`: Backup directory (default: ./data/backup)
    pub fn from_env() -> Self {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let dir = lookup("INTAKE_BACKUP_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_DIR.to_string());
        Self { dir: dir.into() }
    }
}

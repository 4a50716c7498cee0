//! Daemon configuration.
//!
//! Two layers, kept separate on purpose:
//!
//! - **Persisted policy** (`ConfigStore`): the TOML file holding `strategy`,
//!   `window-start`, and `window-duration`. The daemon rewrites it when the
//!   strategy or window is changed over the API, preserving unrelated keys.
//! - **Runtime settings** (`RuntimeConfig`): listen address, state directory
//!   and friends, taken from environment variables at startup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use reboot_window::{format_duration, parse_duration, MaintWindow};

use crate::types::RebootStrategy;

/// Default location of the persisted policy file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rebootd.toml";

const DEFAULT_WINDOW_START: &str = "03:30";
const DEFAULT_WINDOW_DURATION: &str = "1h";

/// Configuration persistence errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The policy the daemon starts with.
#[derive(Debug, Clone)]
pub struct Settings {
    pub strategy: RebootStrategy,
    pub window: Option<MaintWindow>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    strategy: Option<String>,
    #[serde(rename = "window-start")]
    window_start: Option<String>,
    #[serde(rename = "window-duration")]
    window_duration: Option<String>,
}

/// Read/write handle on the persisted policy file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted policy, falling back field by field on anything
    /// unreadable. A broken config file must not keep the daemon down.
    pub fn load(&self) -> Settings {
        let file = match fs::read_to_string(&self.path) {
            Ok(raw) => match toml::from_str::<ConfigFile>(&raw) {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "cannot parse config file");
                    ConfigFile::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no config file, using defaults");
                ConfigFile::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read config file");
                ConfigFile::default()
            }
        };

        let strategy = match &file.strategy {
            None => RebootStrategy::BestEffort,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to best-effort");
                RebootStrategy::BestEffort
            }),
        };

        let start_raw = file
            .window_start
            .as_deref()
            .unwrap_or(DEFAULT_WINDOW_START);
        let duration_raw = file
            .window_duration
            .as_deref()
            .unwrap_or(DEFAULT_WINDOW_DURATION);

        let window = match (start_raw.parse(), parse_duration(duration_raw)) {
            (Ok(start), Ok(duration)) => Some(MaintWindow { start, duration }),
            (Err(e), _) => {
                warn!(value = start_raw, error = %e, "cannot parse window-start, no maintenance window");
                None
            }
            (_, Err(e)) => {
                warn!(value = duration_raw, error = %e, "cannot parse window-duration, no maintenance window");
                None
            }
        };

        Settings { strategy, window }
    }

    /// Persist a strategy change.
    pub fn save_strategy(&self, strategy: RebootStrategy) -> Result<(), ConfigError> {
        self.update(|table| {
            table.insert(
                "strategy".to_string(),
                toml::Value::String(strategy.to_string()),
            );
        })
    }

    /// Persist a maintenance window change.
    pub fn save_window(&self, window: &MaintWindow) -> Result<(), ConfigError> {
        self.update(|table| {
            table.insert(
                "window-start".to_string(),
                toml::Value::String(window.start.to_string()),
            );
            table.insert(
                "window-duration".to_string(),
                toml::Value::String(format_duration(window.duration)),
            );
        })
    }

    /// Read-modify-write the file as a generic table so keys this daemon
    /// does not own survive a save.
    fn update(&self, apply: impl FnOnce(&mut toml::Table)) -> Result<(), ConfigError> {
        let mut table = match fs::read_to_string(&self.path) {
            Ok(raw) => toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        apply(&mut table);

        fs::write(&self.path, table.to_string()).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Process-level settings from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address the control API listens on. Loopback only by default; the
    /// API is a local control surface, not a fleet one.
    pub listen_addr: String,

    /// Directory for runtime state (the API auth token).
    pub state_dir: PathBuf,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen_addr =
            std::env::var("REBOOTD_LISTEN").unwrap_or_else(|_| "127.0.0.1:7421".to_string());
        let state_dir = std::env::var("REBOOTD_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/run/rebootd"));

        Self {
            listen_addr,
            state_dir,
        }
    }

    /// Where the API bearer token lives.
    pub fn token_path(&self) -> PathBuf {
        self.state_dir.join("token")
    }
}

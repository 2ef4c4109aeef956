//! Application configuration — TOML-based, platform-aware paths.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{MAX_SPI_CELLS, StripKind};
use crate::mapper::Palette;
use crate::presence::PresenceState;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# BusyIndicator configuration.\n\n";

/// Request timeout never drops below this, whatever the poll interval.
const MIN_FETCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Headroom left between the request timeout and the next tick.
const FETCH_TIMEOUT_HEADROOM: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure AD application (client) ID. Required.
    #[serde(default)]
    pub app_id: String,

    /// Requested permission scopes, separated by `;`, `,` or whitespace.
    #[serde(default = "default_scopes")]
    pub scopes: String,

    /// Directory tenant. Default: "common".
    #[serde(default = "default_tenant")]
    pub tenant: String,

    /// Identity platform base URL.
    #[serde(default = "default_authority")]
    pub authority: String,

    /// Graph API base URL.
    #[serde(default = "default_graph_url")]
    pub graph_url: String,

    /// Number of cells on the strip. Fixed for the process lifetime.
    #[serde(default = "default_cell_count")]
    pub cell_count: usize,

    /// Strip transport: "spi" or "console".
    #[serde(default = "default_device")]
    pub device: String,

    /// spidev node for the "spi" transport.
    #[serde(default = "default_spi_path")]
    pub spi_path: String,

    /// Global brightness, 0-255.
    #[serde(default = "default_brightness")]
    pub brightness: u8,

    /// Seconds between presence polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// HTTP request timeout in milliseconds. 0 = derive from the poll interval.
    #[serde(default)]
    pub fetch_timeout_ms: u64,

    /// Backoff ceiling as a multiple of the poll interval.
    #[serde(default = "default_max_backoff_factor")]
    pub max_backoff_factor: u32,

    /// Blank the strip when the loop is stopped by the user.
    #[serde(default = "default_true")]
    pub clear_on_exit: bool,

    /// Flash the startup test pattern before the first poll.
    #[serde(default)]
    pub self_test: bool,

    /// Per-state color overrides. Example: `[colors]` / `busy = "#FF0000"`.
    #[serde(default)]
    pub colors: HashMap<String, String>,
}

fn default_scopes() -> String {
    "User.Read;Presence.Read".into()
}
fn default_tenant() -> String {
    "common".into()
}
fn default_authority() -> String {
    "https://login.microsoftonline.com".into()
}
fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".into()
}
fn default_cell_count() -> usize {
    16
}
fn default_device() -> String {
    "spi".into()
}
fn default_spi_path() -> String {
    "/dev/spidev0.0".into()
}
fn default_brightness() -> u8 {
    255
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_max_backoff_factor() -> u32 {
    5
}
fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Config {
            app_id: String::new(),
            scopes: default_scopes(),
            tenant: default_tenant(),
            authority: default_authority(),
            graph_url: default_graph_url(),
            cell_count: default_cell_count(),
            device: default_device(),
            spi_path: default_spi_path(),
            brightness: default_brightness(),
            poll_interval_secs: default_poll_interval_secs(),
            fetch_timeout_ms: 0,
            max_backoff_factor: default_max_backoff_factor(),
            clear_on_exit: true,
            self_test: false,
            colors: HashMap::new(),
        }
    }
}

/// Longest accepted `poll_interval_secs`.
pub const MAX_POLL_INTERVAL_SECS: u64 = 60 * 60;

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `app_id` is empty.
    MissingAppId,
    /// `scopes` contains no scope.
    MissingScopes,
    /// `cell_count` is zero or too large for the transport.
    InvalidCellCount(usize),
    /// `device` names no known transport.
    UnknownDevice(String),
    /// `poll_interval_secs` is zero.
    ZeroPollInterval,
    /// `poll_interval_secs` is above [`MAX_POLL_INTERVAL_SECS`].
    PollIntervalTooLong(u64),
    /// `max_backoff_factor` is zero.
    ZeroBackoffFactor,
    /// A `[colors]` entry is invalid (unknown state or bad color value).
    InvalidColor { state: String, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingAppId => write!(f, "app_id is required"),
            ValidationError::MissingScopes => write!(f, "scopes must list at least one scope"),
            ValidationError::InvalidCellCount(n) => {
                write!(f, "cell_count must be between 1 and {MAX_SPI_CELLS}, got {n}")
            }
            ValidationError::UnknownDevice(d) => {
                write!(f, "device must be \"spi\" or \"console\", got \"{d}\"")
            }
            ValidationError::ZeroPollInterval => write!(f, "poll_interval_secs must be at least 1"),
            ValidationError::PollIntervalTooLong(n) => write!(
                f,
                "poll_interval_secs must be at most {MAX_POLL_INTERVAL_SECS}, got {n}"
            ),
            ValidationError::ZeroBackoffFactor => {
                write!(f, "max_backoff_factor must be at least 1")
            }
            ValidationError::InvalidColor { state, reason } => {
                write!(f, "Invalid colors[{state}]: {reason}")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("busyindicator"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("[config] {w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems; fall back to direct write + cleanup
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Split `scopes` into individual scope names.
    pub fn scope_list(&self) -> Vec<String> {
        self.scopes
            .split(|c: char| c == ';' || c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// HTTP request timeout: explicit value, or just under the poll interval.
    pub fn fetch_timeout(&self) -> Duration {
        if self.fetch_timeout_ms > 0 {
            return Duration::from_millis(self.fetch_timeout_ms);
        }
        self.poll_interval()
            .saturating_sub(FETCH_TIMEOUT_HEADROOM)
            .max(MIN_FETCH_TIMEOUT)
    }

    /// Palette with `[colors]` overrides applied.
    pub fn palette(&self) -> crate::error::Result<Palette> {
        Palette::from_overrides(&self.colors)
    }

    /// Validate the entire config, collecting all errors.
    ///
    /// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all problems found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.app_id.trim().is_empty() {
            errors.push(ValidationError::MissingAppId);
        }
        if self.scope_list().is_empty() {
            errors.push(ValidationError::MissingScopes);
        }
        if self.cell_count == 0 || self.cell_count > MAX_SPI_CELLS {
            errors.push(ValidationError::InvalidCellCount(self.cell_count));
        }
        if StripKind::parse(&self.device).is_none() {
            errors.push(ValidationError::UnknownDevice(self.device.clone()));
        }
        if self.poll_interval_secs == 0 {
            errors.push(ValidationError::ZeroPollInterval);
        } else if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            errors.push(ValidationError::PollIntervalTooLong(self.poll_interval_secs));
        }
        if self.max_backoff_factor == 0 {
            errors.push(ValidationError::ZeroBackoffFactor);
        }

        let mut keys: Vec<&String> = self.colors.keys().collect();
        keys.sort();
        for key in keys {
            if PresenceState::from_key(key).is_none() {
                errors.push(ValidationError::InvalidColor {
                    state: key.clone(),
                    reason: "not a presence state (available, busy, do_not_disturb, away, offline, unknown)".into(),
                });
            } else if let Err(e) = crate::led::parse_color(&self.colors[key]) {
                errors.push(ValidationError::InvalidColor {
                    state: key.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into a single startup-fatal error.
    pub fn require_valid(&self) -> crate::error::Result<()> {
        self.validate().map_err(fold_errors)
    }

    /// Check only the strip settings (`cell_count`, `device`).
    ///
    /// Enough for driving the strip locally without signing in.
    pub fn require_valid_strip(&self) -> crate::error::Result<()> {
        match self.validate() {
            Ok(()) => Ok(()),
            Err(errors) => {
                let strip: Vec<ValidationError> = errors
                    .into_iter()
                    .filter(|e| {
                        matches!(
                            e,
                            ValidationError::InvalidCellCount(_) | ValidationError::UnknownDevice(_)
                        )
                    })
                    .collect();
                if strip.is_empty() {
                    Ok(())
                } else {
                    Err(fold_errors(strip))
                }
            }
        }
    }
}

fn fold_errors(errors: Vec<ValidationError>) -> crate::BusyIndicatorError {
    let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    crate::BusyIndicatorError::Config(joined.join("; "))
}

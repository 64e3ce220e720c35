//! User-configurable settings for the sidecar supervisor.
//!
//! Settings are resolved in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. `~/.config/omnify-sidecar/config.toml` (or `$OMNIFY_SIDECAR_CONFIG_DIR/config.toml`)
//! 3. Built-in defaults (lowest priority)
//!
//! Example config.toml:
//! ```toml
//! [supervisor]
//! graceful_timeout = "2s"
//! forced_timeout = "1s"
//! poll_interval = "50ms"
//!
//! [launch]
//! mode = "development"
//! project_root = "/home/me/src/omnify"
//! ```

use crate::error::SettingsParseError;
use crate::launch::LaunchKind;
use crate::{Result, env};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

const DEFAULT_GRACEFUL_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_FORCED_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_MONITOR_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub supervisor: SupervisorSettings,
    pub launch: LaunchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    /// How long the daemon gets to exit after the quit request
    pub graceful_timeout: String,
    /// How long to wait for exit confirmation after a forced kill
    pub forced_timeout: String,
    /// Sentinel and liveness polling period
    pub poll_interval: String,
    /// Bound on joining the monitor task during teardown
    pub monitor_join_timeout: String,
    /// Prefix of the `<name>-<port>.ready` sentinel and `<name>-<port>.log` files
    pub sentinel_name: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            graceful_timeout: "2s".to_string(),
            forced_timeout: "1s".to_string(),
            poll_interval: "50ms".to_string(),
            monitor_join_timeout: "2s".to_string(),
            sentinel_name: "daemomnify".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSettings {
    pub mode: LaunchKind,
    /// Overrides the wrapper script location for either mode
    pub launcher_script: Option<PathBuf>,
    /// Checkout root used by development launches
    pub project_root: Option<PathBuf>,
    /// Directory holding the bundled launcher and daemon for packaged launches
    pub resources_dir: Option<PathBuf>,
    /// Command that hosts the daemon module in development mode
    pub interpreter: Vec<String>,
    pub daemon_module: String,
    pub daemon_executable: String,
    /// Base directory shared with the daemon; defaults to the OS temp dir
    pub temp_dir: Option<PathBuf>,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            mode: LaunchKind::default(),
            launcher_script: None,
            project_root: None,
            resources_dir: None,
            interpreter: vec!["uv".to_string(), "run".to_string(), "python".to_string()],
            daemon_module: "daemomnify".to_string(),
            daemon_executable: "daemomnify".to_string(),
            temp_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the user config file, then overlay environment variables.
    ///
    /// A config file that fails to parse is reported and ignored.
    pub fn load() -> Self {
        let mut settings = match Self::read(&env::SIDECAR_CONFIG_FILE) {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(e) => {
                warn!("ignoring settings file: {e:?}");
                Self::default()
            }
        };
        settings.load_from_env();
        settings
    }

    /// Read settings from a TOML file, `None` if it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let raw = xx::file::read_to_string(path)?;
        let settings = toml::from_str(&raw)
            .map_err(|e| SettingsParseError::from_toml_error(path, raw.clone(), e))?;
        debug!("loaded settings from {}", path.display());
        Ok(Some(settings))
    }

    pub fn load_from_env(&mut self) {
        if let Ok(v) = env::var("OMNIFY_SIDECAR_GRACEFUL_TIMEOUT") {
            self.supervisor.graceful_timeout = v;
        }
        if let Ok(v) = env::var("OMNIFY_SIDECAR_FORCED_TIMEOUT") {
            self.supervisor.forced_timeout = v;
        }
        if let Ok(v) = env::var("OMNIFY_SIDECAR_POLL_INTERVAL") {
            self.supervisor.poll_interval = v;
        }
        if let Ok(v) = env::var("OMNIFY_SIDECAR_LAUNCH_MODE") {
            match LaunchKind::from_str(&v) {
                Ok(mode) => self.launch.mode = mode,
                Err(_) => warn!("unknown OMNIFY_SIDECAR_LAUNCH_MODE '{v}', keeping {}", self.launch.mode),
            }
        }
        if let Some(dir) = env::var_path("OMNIFY_SIDECAR_TEMP_DIR") {
            self.launch.temp_dir = Some(dir);
        }
    }

    /// Parse a duration string (humantime format) to Duration
    pub fn parse_duration(s: &str) -> Option<Duration> {
        humantime::parse_duration(s).ok()
    }

    pub fn supervisor_graceful_timeout(&self) -> Duration {
        duration_or(&self.supervisor.graceful_timeout, DEFAULT_GRACEFUL_TIMEOUT)
    }

    pub fn supervisor_forced_timeout(&self) -> Duration {
        duration_or(&self.supervisor.forced_timeout, DEFAULT_FORCED_TIMEOUT)
    }

    pub fn supervisor_poll_interval(&self) -> Duration {
        duration_or(&self.supervisor.poll_interval, DEFAULT_POLL_INTERVAL)
    }

    pub fn supervisor_monitor_join_timeout(&self) -> Duration {
        duration_or(
            &self.supervisor.monitor_join_timeout,
            DEFAULT_MONITOR_JOIN_TIMEOUT,
        )
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.launch
            .temp_dir
            .clone()
            .unwrap_or_else(|| env::SIDECAR_TEMP_DIR.clone())
    }
}

fn duration_or(raw: &str, default: Duration) -> Duration {
    Settings::parse_duration(raw).unwrap_or_else(|| {
        warn!("invalid duration '{raw}', using {}", humantime::format_duration(default));
        default
    })
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Get the global settings instance
pub fn settings() -> &'static Settings {
    SETTINGS.get_or_init(Settings::load)
}

use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;

pub static SIDECAR_BIN: Lazy<PathBuf> = Lazy::new(|| {
    current_exe()
        .and_then(|p| p.canonicalize())
        .unwrap_or_else(|e| {
            eprintln!("Warning: Could not determine omnify-sidecar binary path: {e}");
            args()
                .next()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("omnify-sidecar"))
        })
});

pub static HOME_DIR: Lazy<PathBuf> = Lazy::new(|| {
    dirs::home_dir().unwrap_or_else(|| {
        eprintln!("Warning: Could not determine home directory");
        PathBuf::from("/tmp")
    })
});
pub static SIDECAR_CONFIG_DIR: Lazy<PathBuf> = Lazy::new(|| {
    var_path("OMNIFY_SIDECAR_CONFIG_DIR").unwrap_or(
        dirs::config_dir()
            .unwrap_or(HOME_DIR.join(".config"))
            .join("omnify-sidecar"),
    )
});
pub static SIDECAR_CONFIG_FILE: Lazy<PathBuf> =
    Lazy::new(|| SIDECAR_CONFIG_DIR.join("config.toml"));

pub static SIDECAR_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("OMNIFY_SIDECAR_LOG").unwrap_or(log::LevelFilter::Info));
pub static SIDECAR_LOG_FILE_LEVEL: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("OMNIFY_SIDECAR_LOG_FILE_LEVEL").unwrap_or(*SIDECAR_LOG));
pub static SIDECAR_LOG_FILE: Lazy<Option<PathBuf>> =
    Lazy::new(|| var_path("OMNIFY_SIDECAR_LOG_FILE"));

// Base directory shared with the daemon for sentinels and its log file
pub static SIDECAR_TEMP_DIR: Lazy<PathBuf> =
    Lazy::new(|| var_path("OMNIFY_SIDECAR_TEMP_DIR").unwrap_or_else(temp_dir));

pub(crate) fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}

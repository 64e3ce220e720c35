#![allow(dead_code)]

use omnify_sidecar::launch::LaunchKind;
use omnify_sidecar::settings::Settings;
use omnify_sidecar::supervisor::{DaemonListener, DaemonSupervisor, ShutdownCoordinator};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Get the path to a test script file
pub fn get_script_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scripts")
        .join(file)
}

pub fn launcher_script() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join("launch_daemon.sh")
}

/// Helper struct for supervisor tests: an isolated temp dir the fake daemon
/// reads its behaviour from and writes its sentinel, log and traces into.
pub struct TestEnv {
    temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let env = Self {
            temp_dir: TempDir::new().unwrap(),
        };
        env.configure(serde_json::json!({}));
        env
    }

    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Write the fake daemon's behaviour file
    pub fn configure(&self, mut config: serde_json::Value) {
        config["name"] = "daemon".into();
        fs::write(
            self.dir().join("fake_daemon.json"),
            serde_json::to_string(&config).unwrap(),
        )
        .unwrap();
    }

    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.supervisor.sentinel_name = "daemon".to_string();
        settings.launch.mode = LaunchKind::Development;
        settings.launch.launcher_script = Some(launcher_script());
        settings.launch.project_root = Some(get_script_path(""));
        settings.launch.interpreter = vec!["python3".to_string()];
        settings.launch.daemon_module = "fake_daemon".to_string();
        settings.launch.temp_dir = Some(self.dir().to_path_buf());
        settings
    }

    pub fn supervisor(&self, graceful: Duration, forced: Duration) -> DaemonSupervisor {
        DaemonSupervisor::new(&self.settings())
            .with_poll_interval(POLL_INTERVAL)
            .with_shutdown(ShutdownCoordinator::new(graceful, forced))
    }

    /// Number of times the fake daemon has been launched
    pub fn spawn_count(&self) -> usize {
        fs::read_to_string(self.dir().join("spawns.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// OSC addresses the fake daemon received, in order
    pub fn received(&self) -> Vec<String> {
        fs::read_to_string(self.dir().join("received.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn sentinel(&self, port: u16) -> PathBuf {
        self.dir().join(format!("daemon-{port}.ready"))
    }

    /// Run an omnify-sidecar command and return the output
    pub fn run_command(&self, args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_omnify-sidecar"))
            .args(args)
            .current_dir(self.dir())
            .env("HOME", self.dir())
            .env("OMNIFY_SIDECAR_CONFIG_DIR", self.dir().join("config"))
            .env("OMNIFY_SIDECAR_LOG", "debug")
            .env_remove("OMNIFY_SIDECAR_LAUNCH_MODE")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .expect("Failed to execute omnify-sidecar command")
    }

    pub fn read_log(&self, port: u16) -> String {
        fs::read_to_string(self.dir().join(format!("daemon-{port}.log"))).unwrap_or_default()
    }
}

/// Counts readiness deliveries and records which thread they arrived on.
#[derive(Default)]
pub struct CountingListener {
    calls: AtomicUsize,
    thread: std::sync::Mutex<Option<std::thread::ThreadId>>,
}

impl CountingListener {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn thread(&self) -> Option<std::thread::ThreadId> {
        *self.thread.lock().unwrap()
    }
}

impl DaemonListener for CountingListener {
    fn daemon_ready(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.thread.lock().unwrap() = Some(std::thread::current().id());
    }
}

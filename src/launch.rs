//! Launch command assembly for the daemon.
//!
//! Every launch goes through a wrapper script whose first two positional
//! arguments are the temp directory and the allocated port. The wrapper uses
//! them to pick its log destination, redirects stdout/stderr there and execs
//! the remaining arguments. The supervisor never pipes the daemon's output;
//! an unread pipe would stall the daemon once the OS buffer fills.

use crate::error::LaunchError;
use crate::settings::Settings;
use crate::{Result, env};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;

pub const LAUNCHER_SCRIPT: &str = "launch_daemon.sh";
/// Tells the wrapper script which `<name>-<port>.log` to write.
pub const LOG_NAME_ENV: &str = "OMNIFY_SIDECAR_LOG_NAME";

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIs,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum LaunchKind {
    /// Interpreter-hosted daemon module run from a source checkout
    Development,
    /// Bundled daemon executable shipped next to the host application
    Packaged,
}

impl Default for LaunchKind {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LaunchKind::Development
        } else {
            LaunchKind::Packaged
        }
    }
}

/// Fully resolved command for one daemon session. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchSpec {
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    #[serde(skip)]
    log_name: String,
    #[serde(skip)]
    log_path: PathBuf,
}

impl LaunchSpec {
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Where the wrapper script writes the daemon's stdout and stderr.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn command_line(&self) -> String {
        let program = self.program.to_string_lossy();
        shell_words::join(std::iter::once(program.as_ref()).chain(self.args.iter().map(String::as_str)))
    }

    /// A spawnable command with null stdio and kill-on-drop.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .env(LOG_NAME_ENV, &self.log_name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[derive(Debug, Clone)]
pub struct LaunchCommandBuilder {
    kind: LaunchKind,
    launcher_script: Option<PathBuf>,
    project_root: Option<PathBuf>,
    resources_dir: Option<PathBuf>,
    interpreter: Vec<String>,
    daemon_module: String,
    daemon_executable: String,
    log_name: String,
}

impl LaunchCommandBuilder {
    pub fn new(kind: LaunchKind) -> Self {
        Self::from_settings(&Settings::default()).kind(kind)
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let launch = &settings.launch;
        Self {
            kind: launch.mode,
            launcher_script: launch.launcher_script.clone(),
            project_root: launch.project_root.clone(),
            resources_dir: launch.resources_dir.clone(),
            interpreter: launch.interpreter.clone(),
            daemon_module: launch.daemon_module.clone(),
            daemon_executable: launch.daemon_executable.clone(),
            log_name: settings.supervisor.sentinel_name.clone(),
        }
    }

    pub fn kind(mut self, kind: LaunchKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn launcher_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.launcher_script = Some(path.into());
        self
    }

    pub fn project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    pub fn resources_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.resources_dir = Some(path.into());
        self
    }

    pub fn log_name(mut self, name: impl Into<String>) -> Self {
        self.log_name = name.into();
        self
    }

    pub fn build(&self, temp_dir: &Path, port: u16) -> Result<LaunchSpec> {
        let temp = temp_dir.to_string_lossy().to_string();
        let port_arg = port.to_string();
        // Leading pair is consumed by the wrapper, the trailing flags by the daemon.
        let daemon_flags = [
            "--osc-port".to_string(),
            port_arg.clone(),
            "--temp-dir".to_string(),
            temp.clone(),
        ];

        let (program, daemon_cmd, cwd) = match self.kind {
            LaunchKind::Development => {
                let root = self.resolve_project_root()?;
                let program = self
                    .launcher_script
                    .clone()
                    .unwrap_or_else(|| root.join("resources").join(LAUNCHER_SCRIPT));
                let cmd = self
                    .interpreter
                    .iter()
                    .cloned()
                    .chain(["-m".to_string(), self.daemon_module.clone()])
                    .collect_vec();
                (program, cmd, root)
            }
            LaunchKind::Packaged => {
                let resources = self.resolve_resources_dir()?;
                let program = self
                    .launcher_script
                    .clone()
                    .unwrap_or_else(|| resources.join(LAUNCHER_SCRIPT));
                let exe = resources.join(&self.daemon_executable);
                (program, vec![exe.to_string_lossy().to_string()], resources)
            }
        };

        let args = [temp, port_arg]
            .into_iter()
            .chain(daemon_cmd)
            .chain(daemon_flags)
            .collect_vec();

        Ok(LaunchSpec {
            program,
            args,
            cwd,
            log_name: self.log_name.clone(),
            log_path: log_path(temp_dir, &self.log_name, port),
        })
    }

    fn resolve_project_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.project_root {
            return Ok(root.clone());
        }
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        if root.is_dir() {
            Ok(root)
        } else {
            Err(LaunchError::ProjectRootUnknown.into())
        }
    }

    /// `<exe_dir>/../Resources`, the bundle layout the host ships with.
    fn resolve_resources_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.resources_dir {
            return Ok(dir.clone());
        }
        env::SIDECAR_BIN
            .parent()
            .and_then(Path::parent)
            .map(|contents| contents.join("Resources"))
            .ok_or_else(|| LaunchError::ResourcesDirUnknown.into())
    }
}

/// Log file the wrapper script writes for a session.
pub fn log_path(temp_dir: &Path, name: &str, port: u16) -> PathBuf {
    temp_dir.join(format!("{name}-{port}.log"))
}

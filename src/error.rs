//! Diagnostic error types for the sidecar supervisor.
//!
//! Only conditions that abort an operation live here. Degraded-but-recoverable
//! situations (a lost quit datagram, a failed pre-connect, a kill that could
//! not be confirmed) are logged where they happen and never become errors.

// False positive: fields are used in #[error] format strings and miette derive macros
#![allow(unused_assignments)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that make `start()` fail.
#[derive(Debug, Error, Diagnostic)]
pub enum SupervisorError {
    #[error("could not allocate a free loopback port for the daemon")]
    #[diagnostic(
        code(omnify_sidecar::supervisor::port_allocation),
        help("the OS refused to hand out an ephemeral UDP port on 127.0.0.1")
    )]
    PortAllocation,

    #[error("failed to spawn daemon launcher {}", program.display())]
    #[diagnostic(
        code(omnify_sidecar::supervisor::spawn_failed),
        help("check that the launcher script exists and is executable")
    )]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("daemon launcher {} exited before its pid could be captured", program.display())]
    #[diagnostic(code(omnify_sidecar::supervisor::missing_pid))]
    MissingPid { program: PathBuf },
}

/// Errors resolving where the daemon and its launcher live.
#[derive(Debug, Error, Diagnostic)]
pub enum LaunchError {
    #[error("could not determine the host executable's resources directory")]
    #[diagnostic(
        code(omnify_sidecar::launch::resources_unknown),
        help("set [launch] resources_dir in config.toml")
    )]
    ResourcesDirUnknown,

    #[error("could not determine the project root for development launches")]
    #[diagnostic(
        code(omnify_sidecar::launch::project_root_unknown),
        help("set [launch] project_root in config.toml or run from the project checkout")
    )]
    ProjectRootUnknown,
}

/// Errors on the one-way datagram channel.
#[derive(Debug, Error, Diagnostic)]
pub enum IpcError {
    #[error("failed to bind local datagram socket")]
    #[diagnostic(code(omnify_sidecar::ipc::bind_failed))]
    Bind {
        #[source]
        source: io::Error,
    },

    #[error("failed to connect datagram socket to 127.0.0.1:{port}")]
    #[diagnostic(code(omnify_sidecar::ipc::connect_failed))]
    Connect {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to send '{address}' to 127.0.0.1:{port}")]
    #[diagnostic(
        code(omnify_sidecar::ipc::send_failed),
        help("the daemon may not have bound its port yet; shutdown falls back to a forced kill")
    )]
    Send {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("invalid OSC address '{address}': {reason}")]
    #[diagnostic(code(omnify_sidecar::ipc::invalid_address))]
    InvalidAddress { address: String, reason: String },
}

/// Error for TOML settings parse failures with source code highlighting.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to parse settings")]
#[diagnostic(code(omnify_sidecar::settings::parse_error))]
pub struct SettingsParseError {
    #[source_code]
    pub src: NamedSource<String>,

    #[label("{message}")]
    pub span: SourceSpan,

    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl SettingsParseError {
    pub fn from_toml_error(path: &std::path::Path, contents: String, err: toml::de::Error) -> Self {
        let message = err.message().to_string();
        let span = err
            .span()
            .map(|r| SourceSpan::from(r.start..r.end))
            .unwrap_or_else(|| SourceSpan::from(0..0));

        Self {
            src: NamedSource::new(path.display().to_string(), contents),
            span,
            message,
            help: Some("check TOML syntax at https://toml.io".to_string()),
        }
    }
}

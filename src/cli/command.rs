use crate::Result;
use crate::launch::{LaunchCommandBuilder, LaunchKind};
use crate::sentinel::ReadySentinel;
use miette::IntoDiagnostic;
use std::path::PathBuf;

/// Prints the command used to launch the daemon
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "cmd",
    verbatim_doc_comment,
    long_about = "\
Prints the command used to launch the daemon

Shows the wrapper script, its arguments and working directory for the
given port without spawning anything.

Examples:
  omnify-sidecar command                   Use a freshly allocated port
  omnify-sidecar command --port 54321      Use a fixed port
  omnify-sidecar command --mode packaged --json"
)]
pub struct Command {
    /// Port to pass to the daemon (default: allocate one)
    #[clap(long, short)]
    port: Option<u16>,
    /// Launch mode
    #[clap(long, env = "OMNIFY_SIDECAR_LAUNCH_MODE")]
    mode: Option<LaunchKind>,
    /// Base directory for the sentinel and log file
    #[clap(long)]
    temp_dir: Option<PathBuf>,
    /// Output as JSON
    #[clap(long)]
    json: bool,
}

impl Command {
    pub async fn run(&self) -> Result<()> {
        let settings = super::launch_settings(self.mode, self.temp_dir.as_deref(), None);
        let port = self.port.unwrap_or_else(crate::port::allocate);
        let temp_dir = settings.temp_dir();
        let spec = LaunchCommandBuilder::from_settings(&settings).build(&temp_dir, port)?;
        let sentinel =
            ReadySentinel::for_session(&temp_dir, &settings.supervisor.sentinel_name, port);

        if self.json {
            let out = serde_json::json!({
                "spec": spec,
                "port": port,
                "sentinel": sentinel.path(),
                "log": spec.log_path(),
            });
            println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
        } else {
            println!("{}", spec.command_line());
            println!("cwd:      {}", spec.cwd().display());
            println!("sentinel: {}", sentinel.path().display());
            println!("log:      {}", spec.log_path().display());
        }
        Ok(())
    }
}

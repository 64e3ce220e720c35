use crate::Result;
use crate::launch::LaunchKind;
use crate::supervisor::{DaemonListener, DaemonSupervisor};
use miette::bail;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::{select, signal, time};

/// Runs the daemon in the foreground until interrupted
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "r",
    verbatim_doc_comment,
    long_about = "\
Runs the daemon in the foreground until interrupted

Starts the daemon, waits for its ready sentinel and keeps it running
until Ctrl-C, then asks it to quit and kills it if it does not.

Examples:
  omnify-sidecar run                         Launch with configured settings
  omnify-sidecar run --mode development      Run the daemon from the checkout
  omnify-sidecar run --timeout 30s           Fail if not ready within 30s"
)]
pub struct Run {
    /// Launch mode
    #[clap(long, env = "OMNIFY_SIDECAR_LAUNCH_MODE")]
    mode: Option<LaunchKind>,
    /// Base directory for the sentinel and log file
    #[clap(long)]
    temp_dir: Option<PathBuf>,
    /// Wrapper script to launch instead of the bundled one
    #[clap(long)]
    launcher: Option<PathBuf>,
    /// Give up if the daemon is not ready within this long (e.g. 30s)
    #[clap(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
}

struct ReadyPrinter;

impl DaemonListener for ReadyPrinter {
    fn daemon_ready(&self) {
        println!("daemon is ready");
    }
}

impl Run {
    pub async fn run(&self) -> Result<()> {
        let settings = super::launch_settings(
            self.mode,
            self.temp_dir.as_deref(),
            self.launcher.as_deref(),
        );
        let listener = Arc::new(ReadyPrinter);
        let mut supervisor = DaemonSupervisor::new(&settings);
        supervisor.set_listener(&listener);
        supervisor.start().await?;

        let ready = match self.timeout {
            Some(timeout) => match time::timeout(timeout, supervisor.wait_ready()).await {
                Ok(ready) => ready,
                Err(_) => {
                    let sentinel = supervisor
                        .sentinel_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    if let Some(spec) = supervisor.launch_spec() {
                        debug!("launched with: {}", spec.command_line());
                    }
                    let outcome = supervisor.stop().await;
                    bail!(
                        "daemon did not create {sentinel} within {} (stopped: {outcome})",
                        humantime::format_duration(timeout)
                    );
                }
            },
            None => supervisor.wait_ready().await,
        };
        if !ready {
            let log = supervisor
                .log_path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            supervisor.stop().await;
            bail!("daemon exited before becoming ready, see {log}");
        }
        if let Some(port) = supervisor.port() {
            info!("daemon listening on 127.0.0.1:{port}");
        }

        let ctrl_c = signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interval = time::interval(Duration::from_millis(100));
        loop {
            select! {
                _ = &mut ctrl_c => {
                    info!("interrupted, stopping daemon");
                    break;
                }
                _ = interval.tick() => {
                    if !supervisor.is_running() {
                        warn!("daemon exited on its own");
                        break;
                    }
                }
            }
        }

        let outcome = supervisor.shutdown().await;
        println!("daemon stopped: {outcome}");
        Ok(())
    }
}

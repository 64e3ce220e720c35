//! Owned handle to the spawned daemon.
//!
//! A reaper task owns the `tokio::process::Child`, publishes its exit status
//! on a watch channel and serves kill requests, so the monitor can observe
//! liveness while the controlling task issues termination without either
//! needing `&mut` access to the child.

use crate::error::SupervisorError;
use crate::launch::LaunchSpec;
use crate::procs::PROCS;
use crate::Result;
use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::{select, time};

/// What the supervisor needs from a running daemon.
pub trait DaemonProcess: Send + Sync + 'static {
    fn pid(&self) -> Option<u32>;

    /// Live process state, not readiness.
    fn is_running(&self) -> bool;

    /// Resolves once the process has been observed to exit.
    fn exited(&self) -> impl Future<Output = ()> + Send;

    /// Requests an immediate OS-level kill. Does not wait for exit.
    fn kill(&self) -> impl Future<Output = io::Result<()>> + Send;

    /// True if exit was observed within `timeout`.
    fn wait_for_exit(&self, timeout: Duration) -> impl Future<Output = bool> + Send {
        async move { time::timeout(timeout, self.exited()).await.is_ok() }
    }
}

/// Turns a launch spec into a running daemon.
pub trait DaemonSpawner: Send + Sync {
    type Process: DaemonProcess;

    fn spawn(&self, spec: &LaunchSpec) -> Result<Arc<Self::Process>>;
}

/// Spawns real OS processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildSpawner;

impl DaemonSpawner for ChildSpawner {
    type Process = ChildProcess;

    fn spawn(&self, spec: &LaunchSpec) -> Result<Arc<ChildProcess>> {
        ChildProcess::spawn(spec).map(Arc::new)
    }
}

type KillReply = oneshot::Sender<io::Result<()>>;

#[derive(Debug)]
pub struct ChildProcess {
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
    kill_tx: mpsc::Sender<KillReply>,
}

impl ChildProcess {
    pub fn spawn(spec: &LaunchSpec) -> Result<Self> {
        let child = spec
            .command()
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                program: spec.program().to_path_buf(),
                source,
            })?;
        Self::from_child(child).ok_or_else(|| {
            SupervisorError::MissingPid {
                program: spec.program().to_path_buf(),
            }
            .into()
        })
    }

    /// Takes ownership of `child` and starts its reaper task.
    pub fn from_child(mut child: tokio::process::Child) -> Option<Self> {
        let pid = child.id()?;
        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, mut kill_rx) = mpsc::channel::<KillReply>(4);

        tokio::spawn(async move {
            let mut handle_dropped = false;
            loop {
                select! {
                    result = child.wait() => {
                        match result {
                            Ok(status) => {
                                debug!("daemon pid {pid} exited with {status}");
                                exit_tx.send_replace(Some(status));
                            }
                            Err(e) => error!("waiting on daemon pid {pid} failed: {e}"),
                        }
                        break;
                    }
                    request = kill_rx.recv(), if !handle_dropped => match request {
                        Some(reply) => {
                            let _ = reply.send(child.start_kill());
                        }
                        None => {
                            debug!("handle for daemon pid {pid} dropped, killing");
                            handle_dropped = true;
                            if let Err(e) = child.start_kill() {
                                warn!("failed to kill abandoned daemon pid {pid}: {e}");
                            }
                        }
                    },
                }
            }
        });

        Some(Self {
            pid,
            exit_rx,
            kill_tx,
        })
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        *self.exit_rx.borrow()
    }
}

impl DaemonProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn is_running(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    fn exited(&self) -> impl Future<Output = ()> + Send {
        let mut rx = self.exit_rx.clone();
        async move {
            if rx.wait_for(Option::is_some).await.is_err() {
                // Reaper gave up without a status; exit can never be confirmed.
                std::future::pending::<()>().await;
            }
        }
    }

    fn kill(&self) -> impl Future<Output = io::Result<()>> + Send {
        let pid = self.pid;
        let kill_tx = self.kill_tx.clone();
        async move {
            let swept = PROCS.kill_descendants(pid).await;
            if swept > 0 {
                debug!("killed {swept} descendant(s) of daemon pid {pid}");
            }
            let (reply_tx, reply_rx) = oneshot::channel();
            kill_tx
                .send(reply_tx)
                .await
                .map_err(|_| io::Error::other(format!("reaper for pid {pid} is gone")))?;
            reply_rx
                .await
                .unwrap_or_else(|_| Err(io::Error::other(format!("reaper for pid {pid} is gone"))))
        }
    }
}

//! Sidecar daemon supervisor
//!
//! This module is split into focused submodules:
//! - `state`: session lifecycle state machine
//! - `monitor`: background sentinel and liveness polling
//! - `shutdown`: graceful-then-forced termination
//!
//! `DaemonSupervisor` composes them. It is driven by one controlling task:
//! `start`, `stop` and the readiness dispatchers take `&mut self`, and the
//! listener is only ever invoked from those calls, never from the monitor.

mod monitor;
mod shutdown;
mod state;

pub use monitor::{MonitorHandle, ReadinessMonitor, ReadyPoll};
pub use shutdown::{ShutdownCoordinator, ShutdownOutcome, ShutdownPhase};
pub use state::{DaemonState, SessionState};

use crate::Result;
use crate::error::SupervisorError;
use crate::ipc::IpcChannel;
use crate::launch::{LaunchCommandBuilder, LaunchSpec};
use crate::port::{OsPortAllocator, PortAllocator};
use crate::process::{ChildSpawner, DaemonProcess, DaemonSpawner};
use crate::sentinel::ReadySentinel;
use crate::settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Receives the single `ready` event of a session.
pub trait DaemonListener: Send + Sync {
    fn daemon_ready(&self);
}

struct DaemonSession<P> {
    port: u16,
    temp_dir: PathBuf,
    spec: LaunchSpec,
    process: Arc<P>,
    sentinel: ReadySentinel,
    ipc: Option<IpcChannel>,
    monitor: MonitorHandle,
    /// Listener delivery already happened for this session
    delivered: bool,
}

pub struct DaemonSupervisor<S: DaemonSpawner = ChildSpawner> {
    spawner: S,
    launcher: LaunchCommandBuilder,
    ports: Box<dyn PortAllocator>,
    coordinator: ShutdownCoordinator,
    temp_dir: PathBuf,
    sentinel_name: String,
    poll_interval: Duration,
    monitor_join_timeout: Duration,
    listener: Option<Weak<dyn DaemonListener>>,
    state: SessionState,
    session: Option<DaemonSession<S::Process>>,
    last_sentinel: Option<ReadySentinel>,
}

impl DaemonSupervisor {
    pub fn new(settings: &Settings) -> Self {
        Self::with_spawner(settings, ChildSpawner)
    }
}

impl<S: DaemonSpawner> DaemonSupervisor<S> {
    /// A supervisor that launches daemons through `spawner`.
    pub fn with_spawner(settings: &Settings, spawner: S) -> Self {
        let sentinel_name = settings.supervisor.sentinel_name.clone();
        Self {
            spawner,
            launcher: LaunchCommandBuilder::from_settings(settings),
            ports: Box::new(OsPortAllocator),
            coordinator: ShutdownCoordinator::from_settings(settings),
            temp_dir: settings.temp_dir(),
            sentinel_name,
            poll_interval: settings.supervisor_poll_interval(),
            monitor_join_timeout: settings.supervisor_monitor_join_timeout(),
            listener: None,
            state: SessionState::new(),
            session: None,
            last_sentinel: None,
        }
    }

    pub fn with_launcher(mut self, launcher: LaunchCommandBuilder) -> Self {
        self.launcher = launcher.log_name(self.sentinel_name.clone());
        self
    }

    pub fn with_port_allocator(mut self, ports: impl PortAllocator + 'static) -> Self {
        self.ports = Box::new(ports);
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_shutdown(mut self, coordinator: ShutdownCoordinator) -> Self {
        self.coordinator = coordinator;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Registers the readiness listener without extending its lifetime.
    pub fn set_listener<L: DaemonListener + 'static>(&mut self, listener: &Arc<L>) {
        let listener = Arc::<L>::downgrade(listener) as Weak<dyn DaemonListener>;
        self.listener = Some(listener);
    }

    /// Launches the daemon unless one is already running.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("daemon already running, not starting another");
            return Ok(());
        }
        self.retire_session().await;
        if let Some(stale) = self.last_sentinel.take() {
            stale.clear();
        }

        let port = self.ports.allocate();
        if port == 0 {
            error!("failed to find a free port for the daemon");
            return Err(SupervisorError::PortAllocation.into());
        }
        info!("starting daemon on port {port}");

        let sentinel = ReadySentinel::for_session(&self.temp_dir, &self.sentinel_name, port);
        sentinel.clear();

        let spec = self.launcher.build(&self.temp_dir, port)?;
        debug!("running: {}", spec.command_line());
        let process = self.spawner.spawn(&spec)?;
        info!(
            "daemon launched with pid {}, logging to {}",
            process.pid().unwrap_or_default(),
            spec.log_path().display()
        );
        self.state.advance(DaemonState::Starting);

        let monitor = ReadinessMonitor::spawn(
            process.clone(),
            sentinel.clone(),
            self.state.clone(),
            self.poll_interval,
        );

        let ipc = match IpcChannel::connect(port).await {
            Ok(channel) => Some(channel),
            Err(e) => {
                warn!("could not pre-connect to daemon: {e}");
                None
            }
        };

        self.session = Some(DaemonSession {
            port,
            temp_dir: self.temp_dir.clone(),
            spec,
            process,
            sentinel,
            ipc,
            monitor,
            delivered: false,
        });
        Ok(())
    }

    /// Stops the daemon and tears the session down. Returns within the sum
    /// of the graceful and forced windows plus the monitor join bound.
    pub async fn stop(&mut self) -> ShutdownOutcome {
        let Some(mut session) = self.session.take() else {
            return ShutdownOutcome::NotRunning;
        };
        if session.process.is_running() {
            info!("stopping daemon on port {}", session.port);
            self.state.advance(DaemonState::Stopping);
        }
        if session.ipc.is_none() {
            session.ipc = IpcChannel::connect(session.port)
                .await
                .inspect_err(|e| warn!("could not connect to daemon: {e}"))
                .ok();
        }

        let outcome = self
            .coordinator
            .stop(&*session.process, session.ipc.as_ref())
            .await;
        info!("daemon stop outcome: {outcome}");

        session.monitor.join(self.monitor_join_timeout).await;
        // The session is gone even when exit could not be confirmed.
        self.state.advance(DaemonState::Stopped);
        if !session.process.is_running() {
            session.sentinel.clear();
        }
        self.last_sentinel = Some(session.sentinel);
        outcome
    }

    /// Stops the daemon and consumes the supervisor.
    pub async fn shutdown(mut self) -> ShutdownOutcome {
        self.stop().await
    }

    /// Live process state, not readiness.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.process.is_running())
    }

    /// Whether the current session's sentinel has been observed.
    pub fn is_ready(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.monitor.is_ready())
    }

    pub fn state(&self) -> DaemonState {
        self.state.get()
    }

    pub fn port(&self) -> Option<u16> {
        self.session.as_ref().map(|s| s.port)
    }

    pub fn pid(&self) -> Option<u32> {
        self.session.as_ref().and_then(|s| s.process.pid())
    }

    pub fn temp_dir(&self) -> &Path {
        self.session
            .as_ref()
            .map(|s| s.temp_dir.as_path())
            .unwrap_or(self.temp_dir.as_path())
    }

    pub fn launch_spec(&self) -> Option<&LaunchSpec> {
        self.session.as_ref().map(|s| &s.spec)
    }

    pub fn sentinel_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.sentinel.path())
    }

    pub fn log_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.spec.log_path())
    }

    /// Delivers a pending readiness notification to the listener on the
    /// calling task. Non-blocking; meant to be pumped from the host's loop.
    /// Returns true only on the call that delivered.
    pub fn dispatch_ready(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.delivered || !session.monitor.poll_ready().is_ready() {
            return false;
        }
        session.delivered = true;
        self.notify_listener();
        true
    }

    /// Waits until the daemon is ready, delivering to the listener on the
    /// calling task. False if there is no session or the daemon exited
    /// before becoming ready. There is no timeout; wrap in one if needed.
    pub async fn wait_ready(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.delivered {
            return true;
        }
        if !session.monitor.ready().await {
            return false;
        }
        session.delivered = true;
        self.notify_listener();
        true
    }

    fn notify_listener(&self) {
        match self.listener.as_ref().and_then(Weak::upgrade) {
            Some(listener) => listener.daemon_ready(),
            None => debug!("daemon ready, no live listener"),
        }
    }

    /// Clears out a session whose process has already exited.
    async fn retire_session(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("retiring exited daemon session on port {}", session.port);
            session.monitor.join(self.monitor_join_timeout).await;
            self.state.advance(DaemonState::Stopped);
            session.sentinel.clear();
            self.last_sentinel = Some(session.sentinel);
        }
    }
}

impl<S: DaemonSpawner> Drop for DaemonSupervisor<S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            session.monitor.cancel();
            if session.process.is_running() {
                warn!(
                    "supervisor dropped while daemon pid {} is running, killing it",
                    session.process.pid().unwrap_or_default()
                );
            }
            // Dropping the last process handle makes the reaper kill the child.
        }
    }
}

//! Two-phase termination: ask the daemon to quit, then kill it.
//!
//! Worst-case latency is `graceful_timeout + forced_timeout`: the kill request
//! (including its descendant sweep) and the wait for exit share the forced
//! window. The call always returns; an exit that cannot be confirmed is
//! reported, not raised.

use crate::ipc::{IpcChannel, IpcMessage};
use crate::process::DaemonProcess;
use crate::settings::Settings;
use std::time::Duration;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
pub enum ShutdownOutcome {
    /// Exited within the graceful window after the quit request
    Graceful,
    /// Exited after a forced kill
    Forced,
    /// Both windows elapsed without confirmed exit
    Unknown,
    /// There was no running process to stop
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum ShutdownPhase {
    Check,
    RequestQuit,
    AwaitGraceful,
    ForceKill,
    AwaitForced { deadline: Instant },
    Done(ShutdownOutcome),
}

#[derive(Debug, Clone, Copy)]
pub struct ShutdownCoordinator {
    graceful_timeout: Duration,
    forced_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(graceful_timeout: Duration, forced_timeout: Duration) -> Self {
        Self {
            graceful_timeout,
            forced_timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.supervisor_graceful_timeout(),
            settings.supervisor_forced_timeout(),
        )
    }

    /// Drives the phases from `Check` to `Done`.
    pub async fn stop<P: DaemonProcess>(
        &self,
        process: &P,
        channel: Option<&IpcChannel>,
    ) -> ShutdownOutcome {
        let mut phase = ShutdownPhase::Check;
        loop {
            if let ShutdownPhase::Done(outcome) = phase {
                return outcome;
            }
            phase = self.step(phase, process, channel).await;
            trace!("shutdown phase -> {phase}");
        }
    }

    /// Performs one phase and returns the next.
    pub async fn step<P: DaemonProcess>(
        &self,
        phase: ShutdownPhase,
        process: &P,
        channel: Option<&IpcChannel>,
    ) -> ShutdownPhase {
        match phase {
            ShutdownPhase::Check => {
                if process.is_running() {
                    ShutdownPhase::RequestQuit
                } else {
                    ShutdownPhase::Done(ShutdownOutcome::NotRunning)
                }
            }
            ShutdownPhase::RequestQuit => {
                match channel {
                    Some(channel) => {
                        if let Err(e) = channel.send(&IpcMessage::Quit).await {
                            warn!("quit request not sent: {e}");
                        }
                    }
                    None => warn!("no ipc channel to the daemon, skipping quit request"),
                }
                ShutdownPhase::AwaitGraceful
            }
            ShutdownPhase::AwaitGraceful => {
                if process.wait_for_exit(self.graceful_timeout).await {
                    info!("daemon exited gracefully");
                    ShutdownPhase::Done(ShutdownOutcome::Graceful)
                } else {
                    ShutdownPhase::ForceKill
                }
            }
            ShutdownPhase::ForceKill => {
                warn!(
                    "daemon did not exit within {}, killing",
                    humantime::format_duration(self.graceful_timeout)
                );
                let deadline = Instant::now() + self.forced_timeout;
                match time::timeout_at(deadline, process.kill()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("failed to kill daemon: {e}"),
                    Err(_) => warn!("kill request did not complete in time"),
                }
                ShutdownPhase::AwaitForced { deadline }
            }
            ShutdownPhase::AwaitForced { deadline } => {
                if time::timeout_at(deadline, process.exited()).await.is_ok() {
                    ShutdownPhase::Done(ShutdownOutcome::Forced)
                } else {
                    warn!(
                        "could not confirm daemon exit within {} of kill",
                        humantime::format_duration(self.forced_timeout)
                    );
                    ShutdownPhase::Done(ShutdownOutcome::Unknown)
                }
            }
            ShutdownPhase::Done(outcome) => ShutdownPhase::Done(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::{FakeProcess, KillBehavior};
    use tokio::net::UdpSocket;

    const GRACEFUL: Duration = Duration::from_millis(300);
    const FORCED: Duration = Duration::from_millis(100);

    fn coordinator() -> ShutdownCoordinator {
        ShutdownCoordinator::new(GRACEFUL, FORCED)
    }

    #[tokio::test]
    async fn test_not_running_is_noop() {
        let process = FakeProcess::stubborn();
        process.exit();
        let started = Instant::now();
        let outcome = coordinator().stop(&*process, None).await;
        assert_eq!(outcome, ShutdownOutcome::NotRunning);
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(process.kills(), 0);
    }

    #[tokio::test]
    async fn test_graceful_exit_after_quit() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let channel = IpcChannel::connect(port).await.unwrap();
        let process = FakeProcess::stubborn();

        let daemon = process.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 32];
            let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
            if &buf[..len] == b"/quit\0\0\0,\0\0\0" {
                daemon.exit_after(Duration::from_millis(50));
            }
        });

        let outcome = coordinator().stop(&*process, Some(&channel)).await;
        assert_eq!(outcome, ShutdownOutcome::Graceful);
        assert_eq!(process.kills(), 0);
    }

    #[tokio::test]
    async fn test_stuck_daemon_is_forced() {
        let process = FakeProcess::stubborn();
        let started = Instant::now();
        let outcome = coordinator().stop(&*process, None).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, ShutdownOutcome::Forced);
        assert!(!process.is_running());
        assert_eq!(process.kills(), 1);
        assert!(elapsed >= GRACEFUL);
        assert!(elapsed < GRACEFUL + FORCED + Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_unkillable_daemon_is_unknown() {
        for behavior in [KillBehavior::Ignored, KillBehavior::Fails, KillBehavior::Hangs] {
            let process = FakeProcess::new(behavior);
            let started = Instant::now();
            let outcome = coordinator().stop(&*process, None).await;

            assert_eq!(outcome, ShutdownOutcome::Unknown, "{behavior:?}");
            assert!(started.elapsed() < GRACEFUL + FORCED + Duration::from_millis(200));
            assert!(process.is_running());
        }
    }

    #[tokio::test]
    async fn test_slow_kill_counts_against_forced_window() {
        let process = FakeProcess::new(KillBehavior::Hangs);
        let c = coordinator();
        let started = Instant::now();
        let phase = c.step(ShutdownPhase::ForceKill, &*process, None).await;
        let phase = c.step(phase, &*process, None).await;

        assert_eq!(phase, ShutdownPhase::Done(ShutdownOutcome::Unknown));
        let elapsed = started.elapsed();
        assert!(elapsed >= FORCED);
        assert!(elapsed < FORCED + Duration::from_millis(100), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_lost_quit_message_still_terminates() {
        // nothing listens on this port; the datagram goes nowhere
        let channel = IpcChannel::connect(crate::port::allocate()).await.unwrap();
        let process = FakeProcess::stubborn();
        let outcome = coordinator().stop(&*process, Some(&channel)).await;
        assert_eq!(outcome, ShutdownOutcome::Forced);
    }

    #[tokio::test]
    async fn test_steps_individually() {
        let c = coordinator();
        let process = FakeProcess::stubborn();

        let phase = c.step(ShutdownPhase::Check, &*process, None).await;
        assert_eq!(phase, ShutdownPhase::RequestQuit);
        let phase = c.step(phase, &*process, None).await;
        assert_eq!(phase, ShutdownPhase::AwaitGraceful);
        let phase = c.step(ShutdownPhase::ForceKill, &*process, None).await;
        assert!(matches!(phase, ShutdownPhase::AwaitForced { .. }));
        let phase = c.step(phase, &*process, None).await;
        assert_eq!(phase, ShutdownPhase::Done(ShutdownOutcome::Forced));
        let done = c.step(phase, &*process, None).await;
        assert_eq!(done, phase);
    }
}

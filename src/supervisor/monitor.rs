//! Background readiness and liveness polling.
//!
//! The monitor task watches for the ready sentinel and for process exit.
//! Readiness is reported exactly once through a oneshot; delivering it to the
//! listener is left to the controlling task.

use super::state::{DaemonState, SessionState};
use crate::process::DaemonProcess;
use crate::sentinel::ReadySentinel;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIs)]
pub enum ReadyPoll {
    /// No sentinel seen yet
    Pending,
    /// Sentinel seen; returned once per session
    Ready,
    /// Monitor finished without readiness, or readiness was already taken
    Closed,
}

pub struct ReadinessMonitor<P> {
    process: Arc<P>,
    sentinel: ReadySentinel,
    state: SessionState,
    ready: Arc<AtomicBool>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<P: DaemonProcess> ReadinessMonitor<P> {
    pub fn spawn(
        process: Arc<P>,
        sentinel: ReadySentinel,
        state: SessionState,
        poll_interval: Duration,
    ) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let ready = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let monitor = Self {
            process,
            sentinel,
            state,
            ready: ready.clone(),
            poll_interval,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(monitor.run(ready_tx));
        MonitorHandle {
            cancel,
            ready,
            ready_rx: Some(ready_rx),
            task,
        }
    }

    async fn run(self, ready_tx: oneshot::Sender<()>) {
        let mut ready_tx = Some(ready_tx);
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let exited = self.process.exited();
        tokio::pin!(exited);

        loop {
            select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("readiness monitor cancelled");
                    break;
                }
                _ = &mut exited => {
                    if self.ready.load(Ordering::Acquire) {
                        info!("daemon exited");
                    } else {
                        warn!("daemon exited before becoming ready");
                    }
                    self.state.advance(DaemonState::Stopped);
                    break;
                }
                _ = interval.tick() => {
                    if ready_tx.is_some() && self.sentinel.exists() {
                        self.mark_ready(ready_tx.take());
                    }
                }
            }
        }
    }

    fn mark_ready(&self, ready_tx: Option<oneshot::Sender<()>>) {
        if self.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("daemon ready: found {}", self.sentinel.path().display());
        self.state.advance(DaemonState::Ready);
        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            debug!("readiness receiver dropped before delivery");
        }
    }
}

/// Controller-side half of a running monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancellationToken,
    ready: Arc<AtomicBool>,
    ready_rx: Option<oneshot::Receiver<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// The latch: true once the sentinel has been observed, whether or not
    /// the notification has been consumed yet.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Non-blocking check for the readiness notification.
    pub fn poll_ready(&mut self) -> ReadyPoll {
        let Some(rx) = self.ready_rx.as_mut() else {
            return ReadyPoll::Closed;
        };
        match rx.try_recv() {
            Ok(()) => {
                self.ready_rx = None;
                ReadyPoll::Ready
            }
            Err(TryRecvError::Empty) => ReadyPoll::Pending,
            Err(TryRecvError::Closed) => {
                self.ready_rx = None;
                ReadyPoll::Closed
            }
        }
    }

    /// Waits for the readiness notification. False if the monitor ended first
    /// or the notification was already taken.
    pub async fn ready(&mut self) -> bool {
        match self.ready_rx.take() {
            Some(rx) => rx.await.is_ok(),
            None => false,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the task and waits up to `timeout` for it to wind down.
    pub async fn join(self, timeout: Duration) -> bool {
        self.cancel.cancel();
        let abort = self.task.abort_handle();
        match time::timeout(timeout, self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("readiness monitor ended abnormally: {e}");
                true
            }
            Err(_) => {
                warn!("readiness monitor did not stop within {timeout:?}, aborting");
                abort.abort();
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::testing::FakeProcess;
    use std::time::Instant;

    const POLL: Duration = Duration::from_millis(20);

    fn setup() -> (tempfile::TempDir, ReadySentinel, SessionState) {
        let dir = tempfile::tempdir().unwrap();
        let sentinel = ReadySentinel::for_session(dir.path(), "daemon", 54321);
        let state = SessionState::new();
        state.advance(DaemonState::Starting);
        (dir, sentinel, state)
    }

    #[tokio::test]
    async fn test_ready_fires_within_one_interval() {
        let (_dir, sentinel, state) = setup();
        let process = FakeProcess::stubborn();
        let mut handle =
            ReadinessMonitor::spawn(process.clone(), sentinel.clone(), state.clone(), POLL);

        time::sleep(Duration::from_millis(60)).await;
        assert!(handle.poll_ready().is_pending());

        std::fs::write(sentinel.path(), "").unwrap();
        let created = Instant::now();
        assert!(time::timeout(Duration::from_secs(2), handle.ready()).await.unwrap());
        assert!(created.elapsed() < POLL * 5, "took {:?}", created.elapsed());
        assert!(state.get().is_ready());
        assert!(handle.is_ready());

        handle.join(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_ready_is_delivered_once() {
        let (_dir, sentinel, state) = setup();
        std::fs::write(sentinel.path(), "").unwrap();
        let mut handle =
            ReadinessMonitor::spawn(FakeProcess::stubborn(), sentinel, state, POLL);

        assert!(handle.ready().await);
        assert!(!handle.ready().await);
        assert!(handle.poll_ready().is_closed());
        handle.join(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_deleting_sentinel_does_not_regress() {
        let (_dir, sentinel, state) = setup();
        std::fs::write(sentinel.path(), "").unwrap();
        let mut handle =
            ReadinessMonitor::spawn(FakeProcess::stubborn(), sentinel.clone(), state.clone(), POLL);
        assert!(handle.ready().await);

        sentinel.remove().unwrap();
        time::sleep(POLL * 4).await;
        assert!(state.get().is_ready());
        assert!(handle.is_ready());
        handle.join(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_exit_before_ready_closes_notification() {
        let (_dir, sentinel, state) = setup();
        let process = FakeProcess::stubborn();
        let mut handle = ReadinessMonitor::spawn(process.clone(), sentinel, state.clone(), POLL);

        process.exit();
        assert!(!time::timeout(Duration::from_secs(2), handle.ready()).await.unwrap());
        assert!(state.get().is_stopped());
        assert!(!handle.is_ready());
        assert!(handle.join(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let (_dir, sentinel, state) = setup();
        let process = FakeProcess::stubborn();
        let handle = ReadinessMonitor::spawn(process.clone(), sentinel.clone(), state.clone(), POLL);

        handle.cancel();
        time::sleep(POLL * 3).await;
        assert!(handle.is_finished());

        // a sentinel appearing after cancellation is never reported
        std::fs::write(sentinel.path(), "").unwrap();
        time::sleep(POLL * 3).await;
        assert!(state.get().is_starting());
        assert!(handle.join(Duration::from_secs(1)).await);
        assert!(process.is_running());
    }
}

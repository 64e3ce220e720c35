//! Session lifecycle state shared between the controlling task and the monitor.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumIs)]
#[strum(serialize_all = "snake_case")]
pub enum DaemonState {
    #[default]
    NotStarted,
    /// Spawned; the sentinel may not exist yet
    Starting,
    Ready,
    Stopping,
    Stopped,
}

impl DaemonState {
    /// Readiness is monotonic within a session: nothing leads back to `Starting`
    /// except a fresh session after `Stopped`.
    pub fn can_transition_to(self, next: DaemonState) -> bool {
        use DaemonState::*;
        matches!(
            (self, next),
            (NotStarted | Stopped, Starting)
                | (Starting, Ready)
                | (Starting | Ready, Stopping)
                | (Starting | Ready | Stopping, Stopped)
        )
    }
}

#[derive(Debug, Clone)]
pub struct SessionState(Arc<watch::Sender<DaemonState>>);

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self(Arc::new(watch::Sender::new(DaemonState::NotStarted)))
    }

    pub fn get(&self) -> DaemonState {
        *self.0.borrow()
    }

    /// Applies `next` if it is a legal transition; returns whether it was.
    pub fn advance(&self, next: DaemonState) -> bool {
        self.0.send_if_modified(|state| {
            if state.can_transition_to(next) {
                trace!("daemon state {state} -> {next}");
                *state = next;
                true
            } else {
                trace!("ignoring daemon state {state} -> {next}");
                false
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<DaemonState> {
        self.0.subscribe()
    }
}

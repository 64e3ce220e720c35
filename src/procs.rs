//! Process-table queries for reaching a daemon's descendants.
//!
//! Launchers such as `uv run` keep the real daemon as a grandchild, so a
//! forced kill of the launcher alone can orphan it.

use once_cell::sync::Lazy;
use std::sync::Mutex;
use sysinfo::ProcessesToUpdate;

pub struct Procs {
    system: Mutex<sysinfo::System>,
}

pub static PROCS: Lazy<Procs> = Lazy::new(Procs::new);

impl Default for Procs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procs {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Every process whose ancestor chain contains `pid`, deepest last.
    pub fn all_children(&self, pid: u32) -> Vec<u32> {
        let system = self.lock_system();
        let root = sysinfo::Pid::from_u32(pid);
        let mut children = vec![];
        for (child_pid, process) in system.processes() {
            let mut depth = 0;
            let mut process = process;
            while let Some(parent) = process.parent() {
                depth += 1;
                if parent == root {
                    children.push((depth, child_pid.as_u32()));
                    break;
                }
                match system.process(parent) {
                    Some(p) => process = p,
                    None => break,
                }
            }
        }
        children.sort();
        children.into_iter().map(|(_, pid)| pid).collect()
    }

    /// Sends an immediate kill; false when the pid is not in the table.
    pub fn kill(&self, pid: u32) -> bool {
        match self.lock_system().process(sysinfo::Pid::from_u32(pid)) {
            Some(process) => {
                debug!("killing process {pid}");
                process.kill()
            }
            None => false,
        }
    }

    pub async fn kill_descendants(&self, pid: u32) -> usize {
        let result = tokio::task::spawn_blocking(move || {
            PROCS.refresh_processes();
            let mut killed = 0;
            // Deepest first so no descendant is reparented mid-sweep.
            for child in PROCS.all_children(pid).into_iter().rev() {
                if PROCS.kill(child) {
                    killed += 1;
                }
            }
            killed
        })
        .await;
        result.unwrap_or_else(|e| {
            warn!("descendant sweep for pid {pid} panicked: {e}");
            0
        })
    }

    pub fn refresh_processes(&self) {
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::All, true);
    }
}

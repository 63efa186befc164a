//! Ownership of running machines
//!
//! Every launch runs under the supervisor. A launch ends when the emulator
//! exits, when its future is dropped (client gone), or when the supervisor
//! is shut down; in the last two cases the emulator is killed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

use crate::{Error, Result};

pub struct MachineSupervisor {
    stop: watch::Sender<bool>,
    running: Mutex<HashMap<u64, String>>,
    next_id: AtomicU64,
}

impl Default for MachineSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl MachineSupervisor {
    pub fn new() -> Self {
        let (stop, _) = watch::channel(false);
        Self {
            stop,
            running: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Drive `launch` for machine `name` until it finishes or the
    /// supervisor shuts down
    pub async fn supervise<F>(&self, name: &str, launch: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        if self.is_stopping() {
            return Err(stopped(name));
        }

        let mut stop = self.stop.subscribe();
        let _entry = self.register(name);

        tokio::select! {
            biased;
            _ = stop.wait_for(|stopping| *stopping) => {
                tracing::warn!(machine = %name, "Stopping machine for shutdown");
                Err(stopped(name))
            }
            result = launch => result,
        }
    }

    /// Kill every supervised machine and refuse new launches
    pub fn shutdown(&self) {
        let running = self.running();
        if !running.is_empty() {
            tracing::info!(machines = ?running, "Stopping running machines");
        }
        self.stop.send_replace(true);
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    /// Names of machines currently running, sorted
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.lock().values().cloned().collect();
        names.sort();
        names
    }

    fn register(&self, name: &str) -> RunningEntry<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.running.lock().insert(id, name.to_string());
        RunningEntry { supervisor: self, id }
    }
}

struct RunningEntry<'a> {
    supervisor: &'a MachineSupervisor,
    id: u64,
}

impl Drop for RunningEntry<'_> {
    fn drop(&mut self) {
        self.supervisor.running.lock().remove(&self.id);
    }
}

fn stopped(name: &str) -> Error {
    Error::Launch(format!("machine '{}' stopped: manager is shutting down", name))
}

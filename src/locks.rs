//! Per-disk advisory locks
//!
//! The disk utility is not safe against concurrent mutation of one file, so
//! every operation on a named disk runs under that name's mutex. Different
//! names never contend.

use parking_lot::{Mutex, RawMutex};
use std::collections::HashMap;
use std::sync::Arc;

pub type DiskGuard = parking_lot::ArcMutexGuard<RawMutex, ()>;

#[derive(Debug, Default)]
pub struct DiskLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DiskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock for `name` is held
    pub fn lock(&self, name: &str) -> DiskGuard {
        let entry = {
            let mut locks = self.locks.lock();
            // only the map references an idle entry
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_arc()
    }

    /// Number of names currently tracked
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

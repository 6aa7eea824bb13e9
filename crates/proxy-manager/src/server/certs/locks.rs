//! Per-domain mutual exclusion for certificate operations

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes certificate operations on the same domain
///
/// Operations on different domains never wait on each other. Entries are
/// pruned once no one holds or waits on them.
#[derive(Default)]
pub struct DomainLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `domain`
    pub async fn lock(&self, domain: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(domain.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Domains with a live lock entry
    pub fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}

//! One async mutex per workload id, so transitions on the same workload are serialized while
//! different workloads proceed independently.

use alloc::sync::Arc;
use std::{
    collections::HashMap,
    sync::{Mutex as StdMutex, MutexGuard, PoisonError},
};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = HashMap<Uuid, Arc<Mutex<()>>>;

/// Lock table keyed by workload id. Entries exist only while someone holds or awaits them.
#[derive(Debug, Default)]
pub(crate) struct WorkloadLocks {
    inner: StdMutex<LockMap>,
}

/// Held for the duration of one transition.
pub(crate) struct WorkloadGuard<'locks> {
    locks: &'locks WorkloadLocks,
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl WorkloadLocks {
    pub(crate) async fn acquire(&self, id: Uuid) -> WorkloadGuard<'_> {
        let mutex = self.map().entry(id).or_default().clone();
        let guard = mutex.lock_owned().await;
        WorkloadGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    fn map(&self) -> MutexGuard<'_, LockMap> {
        // The map holds no invariants a panicking holder could break.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

impl Drop for WorkloadGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.map();
        // Only the map itself still references the mutex: nobody is waiting.
        if map
            .get(&self.id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            map.remove(&self.id);
        }
    }
}

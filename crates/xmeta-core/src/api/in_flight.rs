//! Per-document run serialization.
//!
//! Concurrent requests for the same document path share one async mutex, so
//! the second caller waits for the first pipeline run instead of racing its
//! writes. Entries are held weakly and pruned once no caller holds them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub(crate) struct InFlight {
    locks: Mutex<HashMap<PathBuf, Weak<AsyncMutex<()>>>>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`.
    pub(crate) async fn acquire(&self, key: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.retain(|_, weak| weak.strong_count() > 0);

            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    locks.insert(key.to_path_buf(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

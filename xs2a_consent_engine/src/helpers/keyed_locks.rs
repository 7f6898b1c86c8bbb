//! Per-key async mutexes.
//!
//! Processing for a single authorisation or consent id must be serialised. [`KeyedLocks`] hands out one mutex per
//! key and drops the entry again once nobody holds or waits for it, including waiters that gave up.
use std::sync::Arc;

use dashmap::DashMap;
use log::*;
use tokio::sync::{Mutex, OwnedMutexGuard};

struct LockSlot {
    mutex: Arc<Mutex<()>>,
    /// Tasks holding or waiting for the lock
    users: usize,
}

#[derive(Clone, Default)]
pub struct KeyedLocks {
    slots: Arc<DashMap<String, LockSlot>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until the lock for `key` is free and returns a guard that releases it when dropped.
    ///
    /// Dropping the returned future before it completes releases the registration as well.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let registration = self.register(key);
        trace!("🔒️ Waiting for lock on {key}");
        let guard = registration.mutex.clone().lock_owned().await;
        KeyedGuard { _guard: guard, _registration: registration }
    }

    /// The number of keys currently locked or waited on.
    pub fn active_keys(&self) -> usize {
        self.slots.len()
    }

    fn register(&self, key: &str) -> Registration {
        let mut slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| LockSlot { mutex: Arc::new(Mutex::new(())), users: 0 });
        slot.users += 1;
        let mutex = slot.mutex.clone();
        drop(slot);
        Registration { key: key.to_string(), mutex, locks: self.clone() }
    }

    fn release(&self, key: &str) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.users = slot.users.saturating_sub(1);
        }
        if self.slots.remove_if(key, |_, slot| slot.users == 0).is_some() {
            trace!("🔒️ Lock on {key} released and removed");
        }
    }
}

/// One task's claim on a key. Dropping it, whether or not the lock was ever acquired, gives the claim back.
struct Registration {
    key: String,
    mutex: Arc<Mutex<()>>,
    locks: KeyedLocks,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

pub struct KeyedGuard {
    // Fields drop in order: the mutex is unlocked before the registration is given back.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}

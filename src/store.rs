//! Device-wide serialisation of persistence transactions.
//!
//! Every open/…/close sequence against the [`PersistenceStore`] runs under
//! one [`StoreLock`].  [`StoreLock::begin`] blocks until the lock is free,
//! then opens the namespace and returns a [`Transaction`] guard.  Dropping
//! the guard without [`Transaction::commit`] closes with `commit = false`,
//! so an early return rolls back and releases the lock on every path.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::app::ports::{OpenMode, PersistenceStore, StorageError};

/// Shared, mutually exclusive access to one persistence store.
pub struct StoreLock<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for StoreLock<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PersistenceStore> StoreLock<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        // A panic mid-transaction leaves the store closed-or-open; the next
        // `open` resets backend state either way.
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("STORE: lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Acquire the lock (waiting indefinitely) and open `namespace`.
    ///
    /// If `open` fails the lock is released before returning.
    pub fn begin(&self, namespace: &str, mode: OpenMode) -> Result<Transaction<'_, S>, StorageError> {
        let mut guard = self.lock();
        guard.open(namespace, mode)?;
        debug!("STORE: opened '{}' ({:?})", namespace, mode);
        Ok(Transaction {
            store: guard,
            finished: false,
        })
    }

    /// Run `f` against the store while holding the lock, outside any
    /// transaction.  Used by tests and tooling to inspect backend state.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.lock())
    }
}

/// An open transaction.  Holds the store lock until dropped.
pub struct Transaction<'a, S: PersistenceStore> {
    store: MutexGuard<'a, S>,
    finished: bool,
}

impl<S: PersistenceStore> Transaction<'_, S> {
    pub fn read_u8(&mut self, key: &str) -> Result<Option<u8>, StorageError> {
        self.store.read_u8(key)
    }

    pub fn read_u32(&mut self, key: &str) -> Result<Option<u32>, StorageError> {
        self.store.read_u32(key)
    }

    pub fn write_u8(&mut self, key: &str, value: u8) -> Result<(), StorageError> {
        self.store.write_u8(key, value)
    }

    pub fn write_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError> {
        self.store.write_u32(key, value)
    }

    /// Close with `commit = true` and release the lock.
    pub fn commit(mut self) -> Result<(), StorageError> {
        self.finished = true;
        self.store.close(true)
    }

    /// Close with `commit = false` and release the lock.
    pub fn rollback(mut self) {
        self.finished = true;
        if let Err(e) = self.store.close(false) {
            warn!("STORE: rollback close failed: {}", e);
        }
    }
}

impl<S: PersistenceStore> Drop for Transaction<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            debug!("STORE: transaction dropped, rolling back");
            if let Err(e) = self.store.close(false) {
                warn!("STORE: rollback close failed: {}", e);
            }
        }
    }
}

//! Persisted configuration manager.
//!
//! Restores the stack-size tunables and boot counter from NVS at boot and
//! writes them back on demand.  All access goes through one
//! [`StoreLock`] transaction per call.
//!
//! Restore policy:
//!
//! | Key kind     | Stored > default | Stored ≤ default | Absent          |
//! |--------------|------------------|------------------|-----------------|
//! | stack size   | adopt, save due  | keep default     | seed default    |
//! | boot counter | adopt            | adopt            | seed default    |
//!
//! A storage error aborts the transaction and leaves the in-memory values
//! untouched.  After a failed restore no save is scheduled until a later
//! restore succeeds, so the defaults in memory never overwrite the stored
//! values.

use log::{debug, error, info, warn};

use crate::app::ports::{ConfigError, OpenMode, PersistenceStore};
use crate::config::{ConfigKey, NVS_NAMESPACE, PersistedValues};
use crate::store::{StoreLock, Transaction};

/// A save that has been asked for but not started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSave {
    pending: bool,
    delay_secs: u8,
}

impl PendingSave {
    /// Mark a save due.  The delay is advisory; the dispatcher saves on
    /// its next iteration.
    pub fn mark(&mut self, delay_secs: u8) {
        self.pending = true;
        self.delay_secs = self.delay_secs.max(delay_secs);
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn delay_secs(&self) -> u8 {
        self.delay_secs
    }

    /// Clear the request, returning whether one was pending.
    pub fn take(&mut self) -> bool {
        let was = self.pending;
        *self = Self::default();
        was
    }
}

/// Owner of the persisted values.
pub struct ConfigManager<S: PersistenceStore> {
    store: StoreLock<S>,
    namespace: &'static str,
    values: PersistedValues,
    pending: PendingSave,
    save_delay_secs: u8,
    /// Set by a failed restore, cleared by a successful one.
    restore_failed: bool,
}

impl<S: PersistenceStore> ConfigManager<S> {
    /// Manager over `store` starting from the compiled-in defaults.
    pub fn new(store: StoreLock<S>, save_delay_secs: u8) -> Self {
        Self::with_defaults(store, PersistedValues::default(), save_delay_secs)
    }

    /// Manager starting from explicit defaults.
    pub fn with_defaults(store: StoreLock<S>, defaults: PersistedValues, save_delay_secs: u8) -> Self {
        Self {
            store,
            namespace: NVS_NAMESPACE,
            values: defaults,
            pending: PendingSave::default(),
            save_delay_secs,
            restore_failed: false,
        }
    }

    pub fn values(&self) -> &PersistedValues {
        &self.values
    }

    pub fn pending(&self) -> &PendingSave {
        &self.pending
    }

    pub fn store(&self) -> &StoreLock<S> {
        &self.store
    }

    /// Whether the last restore attempt failed.
    pub fn restore_failed(&self) -> bool {
        self.restore_failed
    }

    /// Schedule a save of the current values.
    pub fn request_save(&mut self) {
        self.schedule_save(0);
    }

    /// Clear and return the pending-save flag.  Always `false` while the
    /// last restore failed.
    pub fn take_pending_save(&mut self) -> bool {
        self.pending.take() && !self.restore_failed
    }

    fn schedule_save(&mut self, delay_secs: u8) {
        if self.restore_failed {
            warn!("CFG: save skipped, stored values were never restored");
            return;
        }
        self.pending.mark(delay_secs);
    }

    /// Load the persisted values, applying the ratchet to stack sizes.
    ///
    /// Absent keys are seeded with the in-memory value in the same
    /// transaction.  On any error nothing is committed and the in-memory
    /// values are left as they were.
    pub fn restore(&mut self) -> Result<(), ConfigError> {
        let result = self.restore_values();
        self.restore_failed = result.is_err();
        result
    }

    fn restore_values(&mut self) -> Result<(), ConfigError> {
        let mut tx = self
            .store
            .begin(self.namespace, OpenMode::ReadWrite)
            .map_err(|e| {
                error!("CFG: restore open failed: {}", e);
                ConfigError::Open(e)
            })?;

        let mut next = self.values;
        let mut raised = false;

        for key in ConfigKey::ALL {
            let result = if key.is_stack_size() {
                restore_stack_size(&mut tx, key, &mut next).map(|r| raised |= r)
            } else {
                restore_boot_count(&mut tx, &mut next)
            };
            if let Err(e) = result {
                error!("CFG: restore aborted: {}", e);
                tx.rollback();
                return Err(e);
            }
        }

        tx.commit().map_err(|e| {
            error!("CFG: restore commit failed: {}", e);
            ConfigError::Commit(e)
        })?;

        self.values = next;
        if raised {
            self.pending.mark(self.save_delay_secs);
        }
        info!(
            "CFG: restored run={}K gpio={}K timer={}K boots={}",
            next.run_stack_size_k, next.gpio_stack_size_k, next.timer_stack_size_k, next.boot_count
        );
        Ok(())
    }

    /// Write all values in restore order.  Commits only if every write
    /// succeeds.
    pub fn save(&self) -> Result<(), ConfigError> {
        let mut tx = self
            .store
            .begin(self.namespace, OpenMode::ReadWrite)
            .map_err(|e| {
                error!("CFG: save open failed: {}", e);
                ConfigError::Open(e)
            })?;

        for key in ConfigKey::ALL {
            let result = match self.values.stack_size(key) {
                Some(v) => tx.write_u8(key.name(), v),
                None => tx.write_u32(key.name(), self.values.boot_count),
            };
            if let Err(e) = result {
                error!("CFG: save '{}' failed: {}", key.name(), e);
                tx.rollback();
                return Err(ConfigError::Write(key.name(), e));
            }
        }

        tx.commit().map_err(|e| {
            error!("CFG: save commit failed: {}", e);
            ConfigError::Commit(e)
        })?;
        debug!("CFG: saved {:?}", self.values);
        Ok(())
    }

    /// Count this boot and schedule a save.  Returns the new count.
    pub fn record_boot(&mut self) -> u32 {
        self.values.boot_count = self.values.boot_count.wrapping_add(1);
        self.schedule_save(self.save_delay_secs);
        self.values.boot_count
    }

    /// Raise a stack-size tunable.  Lower or equal values are ignored.
    /// Returns `true` if the value changed.
    pub fn raise_stack_size(&mut self, key: ConfigKey, value: u8) -> bool {
        let Some(slot) = self.values.stack_size_mut(key) else {
            warn!("CFG: {} is not a stack size", key.name());
            return false;
        };
        if value <= *slot {
            return false;
        }
        info!("CFG: {} {}K -> {}K", key.name(), *slot, value);
        *slot = value;
        self.schedule_save(self.save_delay_secs);
        true
    }
}

/// Returns whether the stored value raised the tunable.
fn restore_stack_size<S: PersistenceStore>(
    tx: &mut Transaction<'_, S>,
    key: ConfigKey,
    values: &mut PersistedValues,
) -> Result<bool, ConfigError> {
    let name = key.name();
    let Some(slot) = values.stack_size_mut(key) else {
        return Ok(false);
    };
    match tx.read_u8(name).map_err(|e| ConfigError::Read(name, e))? {
        Some(stored) if stored > *slot => {
            debug!("CFG: {} raised {}K -> {}K", name, *slot, stored);
            *slot = stored;
            Ok(true)
        }
        Some(_) => Ok(false),
        None => {
            debug!("CFG: {} absent, seeding {}K", name, *slot);
            tx.write_u8(name, *slot)
                .map_err(|e| ConfigError::Write(name, e))?;
            Ok(false)
        }
    }
}

fn restore_boot_count<S: PersistenceStore>(
    tx: &mut Transaction<'_, S>,
    values: &mut PersistedValues,
) -> Result<(), ConfigError> {
    let name = ConfigKey::BootCount.name();
    match tx.read_u32(name).map_err(|e| ConfigError::Read(name, e))? {
        Some(stored) => values.boot_count = stored,
        None => {
            debug!("CFG: {} absent, seeding {}", name, values.boot_count);
            tx.write_u32(name, values.boot_count)
                .map_err(|e| ConfigError::Write(name, e))?;
        }
    }
    Ok(())
}

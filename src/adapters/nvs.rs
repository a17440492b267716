//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`PersistenceStore`] on top of the ESP-IDF NVS API, with an
//! in-memory simulation backend for host builds.
//!
//! - Writes are staged in RAM until `close(true)`, so `close(false)` is a
//!   real rollback on both backends.
//! - On commit, a staged value equal to the stored one is skipped to save
//!   flash wear.
//! - The simulation backend can export and import a `postcard` image of
//!   its contents, which is how tests model a power cycle.

#[cfg(not(target_os = "espidf"))]
use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::app::ports::{OpenMode, PersistenceStore, StorageError};
use crate::config::MAX_KEY_LEN;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::warn;

/// A typed scalar as held by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoredValue {
    U8(u8),
    U32(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Width {
    U8,
    U32,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NvsStats {
    /// Transactions closed with `commit = true`.
    pub commits: u32,
    /// Transactions closed with `commit = false`.
    pub rollbacks: u32,
    /// Values physically written to flash.
    pub writes_applied: u32,
    /// Staged values skipped because storage already held them.
    pub writes_skipped: u32,
}

struct OpenTx {
    namespace: String,
    mode: OpenMode,
    staged: Vec<(String, StoredValue)>,
    #[cfg(target_os = "espidf")]
    handle: nvs_handle_t,
}

impl OpenTx {
    fn staged(&self, key: &str) -> Option<StoredValue> {
        self.staged.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    fn stage(&mut self, key: &str, value: StoredValue) {
        match self.staged.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.staged.push((key.to_owned(), value)),
        }
    }
}

pub struct NvsStore {
    open: Option<OpenTx>,
    stats: NvsStats,
    #[cfg(not(target_os = "espidf"))]
    cells: BTreeMap<String, StoredValue>,
}

fn check_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(StorageError::KeyTooLong);
    }
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn composite_key(namespace: &str, key: &str) -> String {
    format!("{}::{}", namespace, key)
}

fn typed(value: StoredValue, width: Width) -> Result<StoredValue, StorageError> {
    match (value, width) {
        (StoredValue::U8(_), Width::U8) | (StoredValue::U32(_), Width::U32) => Ok(value),
        _ => Err(StorageError::TypeMismatch),
    }
}

impl NvsStore {
    /// Create the store, initialising NVS flash on device.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsStore: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsStore: simulation backend");

        Ok(Self {
            open: None,
            stats: NvsStats::default(),
            #[cfg(not(target_os = "espidf"))]
            cells: BTreeMap::new(),
        })
    }

    pub fn stats(&self) -> NvsStats {
        self.stats
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn tx(&mut self) -> Result<&mut OpenTx, StorageError> {
        self.open.as_mut().ok_or(StorageError::NotOpen)
    }

    fn read(&mut self, key: &str, width: Width) -> Result<Option<StoredValue>, StorageError> {
        check_key(key)?;
        let tx = self.open.as_ref().ok_or(StorageError::NotOpen)?;
        if let Some(v) = tx.staged(key) {
            return typed(v, width).map(Some);
        }
        self.backend_get(tx, key, width)
    }

    fn write(&mut self, key: &str, value: StoredValue) -> Result<(), StorageError> {
        check_key(key)?;
        let tx = self.tx()?;
        if tx.mode == OpenMode::ReadOnly {
            return Err(StorageError::ReadOnly);
        }
        tx.stage(key, value);
        Ok(())
    }

    fn apply(&mut self, tx: &OpenTx) -> Result<(), StorageError> {
        for (key, value) in &tx.staged {
            let width = match value {
                StoredValue::U8(_) => Width::U8,
                StoredValue::U32(_) => Width::U32,
            };
            // A width change surfaces as TypeMismatch; overwrite it.
            let current = self.backend_get(tx, key, width).unwrap_or(None);
            if current == Some(*value) {
                self.stats.writes_skipped += 1;
                continue;
            }
            self.backend_set(tx, key, *value)?;
            self.stats.writes_applied += 1;
        }
        self.backend_commit(tx)
    }
}

// ── Simulation backend ─────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
impl NvsStore {
    fn backend_open(&mut self, namespace: &str, mode: OpenMode) -> Result<OpenTx, StorageError> {
        check_key(namespace).map_err(|_| StorageError::OpenFailed)?;
        Ok(OpenTx {
            namespace: namespace.to_owned(),
            mode,
            staged: Vec::new(),
        })
    }

    fn backend_get(
        &self,
        tx: &OpenTx,
        key: &str,
        width: Width,
    ) -> Result<Option<StoredValue>, StorageError> {
        match self.cells.get(&composite_key(&tx.namespace, key)) {
            Some(v) => typed(*v, width).map(Some),
            None => Ok(None),
        }
    }

    fn backend_set(&mut self, tx: &OpenTx, key: &str, value: StoredValue) -> Result<(), StorageError> {
        self.cells.insert(composite_key(&tx.namespace, key), value);
        Ok(())
    }

    fn backend_commit(&mut self, _tx: &OpenTx) -> Result<(), StorageError> {
        Ok(())
    }

    fn backend_close(&mut self, _tx: OpenTx) {}

    /// Serialise the committed contents.
    pub fn export_image(&self) -> Result<Vec<u8>, StorageError> {
        postcard::to_allocvec(&self.cells).map_err(|_| StorageError::IoError)
    }

    /// Rebuild a store from an image produced by
    /// [`export_image`](Self::export_image).
    pub fn from_image(bytes: &[u8]) -> Result<Self, StorageError> {
        let cells: BTreeMap<String, StoredValue> =
            postcard::from_bytes(bytes).map_err(|_| StorageError::IoError)?;
        Ok(Self {
            open: None,
            stats: NvsStats::default(),
            cells,
        })
    }

    /// Committed value of `namespace::key`, bypassing transactions.
    pub fn peek(&self, namespace: &str, key: &str) -> Option<StoredValue> {
        self.cells.get(&composite_key(namespace, key)).copied()
    }
}

// ── ESP-IDF backend ────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn c_key(key: &str) -> [u8; 16] {
    let mut buf = [0u8; 16];
    let bytes = key.as_bytes();
    let len = bytes.len().min(MAX_KEY_LEN);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

#[cfg(target_os = "espidf")]
impl NvsStore {
    fn backend_open(&mut self, namespace: &str, mode: OpenMode) -> Result<OpenTx, StorageError> {
        let ns = c_key(namespace);
        let nvs_mode = match mode {
            OpenMode::ReadOnly => nvs_open_mode_t_NVS_READONLY,
            OpenMode::ReadWrite => nvs_open_mode_t_NVS_READWRITE,
        };
        let mut handle: nvs_handle_t = 0;
        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, nvs_mode, &mut handle) };
        if ret != ESP_OK {
            warn!("NvsStore: nvs_open('{}') failed: {}", namespace, ret);
            return Err(StorageError::OpenFailed);
        }
        Ok(OpenTx {
            namespace: namespace.to_owned(),
            mode,
            staged: Vec::new(),
            handle,
        })
    }

    fn backend_get(
        &self,
        tx: &OpenTx,
        key: &str,
        width: Width,
    ) -> Result<Option<StoredValue>, StorageError> {
        let k = c_key(key);
        let (ret, value) = match width {
            Width::U8 => {
                let mut v: u8 = 0;
                // SAFETY: valid handle from nvs_open; `k` is NUL-terminated.
                let ret = unsafe { nvs_get_u8(tx.handle, k.as_ptr() as *const _, &mut v) };
                (ret, StoredValue::U8(v))
            }
            Width::U32 => {
                let mut v: u32 = 0;
                // SAFETY: as above.
                let ret = unsafe { nvs_get_u32(tx.handle, k.as_ptr() as *const _, &mut v) };
                (ret, StoredValue::U32(v))
            }
        };
        match ret {
            ESP_OK => Ok(Some(value)),
            ESP_ERR_NVS_NOT_FOUND => Ok(None),
            ESP_ERR_NVS_TYPE_MISMATCH => Err(StorageError::TypeMismatch),
            other => {
                warn!("NvsStore: read '{}' failed: {}", key, other);
                Err(StorageError::IoError)
            }
        }
    }

    fn backend_set(&mut self, tx: &OpenTx, key: &str, value: StoredValue) -> Result<(), StorageError> {
        let k = c_key(key);
        // SAFETY: valid handle from nvs_open; `k` is NUL-terminated.
        let ret = unsafe {
            match value {
                StoredValue::U8(v) => nvs_set_u8(tx.handle, k.as_ptr() as *const _, v),
                StoredValue::U32(v) => nvs_set_u32(tx.handle, k.as_ptr() as *const _, v),
            }
        };
        match ret {
            ESP_OK => Ok(()),
            ESP_ERR_NVS_NOT_ENOUGH_SPACE => Err(StorageError::Full),
            other => {
                warn!("NvsStore: write '{}' failed: {}", key, other);
                Err(StorageError::IoError)
            }
        }
    }

    fn backend_commit(&mut self, tx: &OpenTx) -> Result<(), StorageError> {
        // SAFETY: valid handle from nvs_open.
        let ret = unsafe { nvs_commit(tx.handle) };
        if ret != ESP_OK {
            warn!("NvsStore: commit failed: {}", ret);
            return Err(StorageError::IoError);
        }
        Ok(())
    }

    fn backend_close(&mut self, tx: OpenTx) {
        // SAFETY: handle came from nvs_open and is closed exactly once.
        unsafe { nvs_close(tx.handle) };
    }
}

impl PersistenceStore for NvsStore {
    fn open(&mut self, namespace: &str, mode: OpenMode) -> Result<(), StorageError> {
        if let Some(stale) = self.open.take() {
            debug!("NvsStore: discarding unclosed transaction on '{}'", stale.namespace);
            self.stats.rollbacks += 1;
            self.backend_close(stale);
        }
        let tx = self.backend_open(namespace, mode)?;
        self.open = Some(tx);
        Ok(())
    }

    fn read_u8(&mut self, key: &str) -> Result<Option<u8>, StorageError> {
        Ok(match self.read(key, Width::U8)? {
            Some(StoredValue::U8(v)) => Some(v),
            _ => None,
        })
    }

    fn read_u32(&mut self, key: &str) -> Result<Option<u32>, StorageError> {
        Ok(match self.read(key, Width::U32)? {
            Some(StoredValue::U32(v)) => Some(v),
            _ => None,
        })
    }

    fn write_u8(&mut self, key: &str, value: u8) -> Result<(), StorageError> {
        self.write(key, StoredValue::U8(value))
    }

    fn write_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError> {
        self.write(key, StoredValue::U32(value))
    }

    fn close(&mut self, commit: bool) -> Result<(), StorageError> {
        let tx = self.open.take().ok_or(StorageError::NotOpen)?;
        let result = if commit && !tx.staged.is_empty() {
            self.apply(&tx)
        } else {
            Ok(())
        };
        if commit && result.is_ok() {
            self.stats.commits += 1;
        } else {
            self.stats.rollbacks += 1;
        }
        debug!(
            "NvsStore: close '{}' commit={} staged={}",
            tx.namespace,
            commit,
            tx.staged.len()
        );
        self.backend_close(tx);
        result
    }
}

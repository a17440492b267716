//! Port traits: the hexagonal boundary between the coordinator and the
//! outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ System (domain)
//! ```
//!
//! Driven adapters (NVS, ESP-IDF bring-up calls, diagnostics, event sinks)
//! implement these traits.  [`System`](super::service::System) consumes
//! them via generics, so the coordinator never touches ESP-IDF directly.

use std::sync::Arc;

use crate::config::FirmwareVersion;
use crate::diagnostics::{DiagFlags, DiagRequest};
use crate::error::PlatformError;
use crate::registry::ReadySignal;

// ───────────────────────────────────────────────────────────────
// Persistence store (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// How a namespace is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Transactional key → typed scalar store.
///
/// One transaction is `open` … reads/writes … `close`.  `close(false)`
/// must discard every write made since `open`; `close(true)` must make
/// them durable before returning.  Callers serialise transactions through
/// a [`StoreLock`](crate::store::StoreLock); implementations need not be
/// re-entrant.
pub trait PersistenceStore {
    fn open(&mut self, namespace: &str, mode: OpenMode) -> Result<(), StorageError>;

    /// Read a `u8`.  `Ok(None)` means the key is absent, which is not an
    /// error.
    fn read_u8(&mut self, key: &str) -> Result<Option<u8>, StorageError>;

    /// Read a `u32`.  `Ok(None)` means the key is absent.
    fn read_u32(&mut self, key: &str) -> Result<Option<u32>, StorageError>;

    fn write_u8(&mut self, key: &str, value: u8) -> Result<(), StorageError>;

    fn write_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError>;

    /// End the transaction, committing or discarding its writes.
    fn close(&mut self, commit: bool) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Platform bring-up (driven adapter: domain → ESP-IDF services)
// ───────────────────────────────────────────────────────────────

/// Parameters for the periodic background timer started at the end of
/// boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneralTimerSpec {
    /// Heap check request period in seconds (0 = never request).
    pub interval_secs: u32,
    /// Stack for the timer task, in KiB.
    pub stack_kb: usize,
}

/// Entry points of the subsystems the coordinator brings up.
pub trait Platform {
    /// Initialise the network abstraction layer (TCP/IP stack).
    fn init_network(&mut self) -> Result<(), PlatformError>;

    /// Create the process-wide default event loop.
    fn create_event_loop(&mut self) -> Result<(), PlatformError>;

    /// Construct the indication subsystem.  Returns the handshake the
    /// subsystem will publish its handles on, or `None` if construction
    /// failed and should be retried.
    fn create_indication(&mut self, version: FirmwareVersion) -> Option<ReadySignal>;

    /// Construct the WiFi subsystem.  Same contract as
    /// [`create_indication`](Self::create_indication).
    fn create_wifi(&mut self) -> Option<ReadySignal>;

    /// Start the periodic background timer service.
    fn start_general_timer(&mut self, spec: GeneralTimerSpec, diag: Arc<DiagFlags>);
}

// ───────────────────────────────────────────────────────────────
// Diagnostics (driven adapter: domain → heap/task introspection)
// ───────────────────────────────────────────────────────────────

/// Runs one diagnostic action.
pub trait DiagnosticsPort {
    /// Execute `kind`.  `iterations` is the dispatcher's loop count, used
    /// in runtime reports.
    fn run(&mut self, kind: DiagRequest, iterations: u64);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The coordinator emits structured [`SysEvent`](super::events::SysEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::SysEvent);
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`PersistenceStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The namespace could not be opened.
    OpenFailed,
    /// A call was made without an open transaction.
    NotOpen,
    /// A write was attempted on a read-only transaction.
    ReadOnly,
    /// Key is longer than the backend accepts.
    KeyTooLong,
    /// Stored value has a different width than requested.
    TypeMismatch,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

/// Errors from [`ConfigManager`](crate::persist::ConfigManager) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// The namespace could not be opened; nothing was read or written.
    Open(StorageError),
    /// Reading the named key failed; the transaction was rolled back.
    Read(&'static str, StorageError),
    /// Writing the named key failed; the transaction was rolled back.
    Write(&'static str, StorageError),
    /// The final commit failed.
    Commit(StorageError),
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OpenFailed => write!(f, "namespace open failed"),
            Self::NotOpen => write!(f, "no open transaction"),
            Self::ReadOnly => write!(f, "transaction is read-only"),
            Self::KeyTooLong => write!(f, "key too long"),
            Self::TypeMismatch => write!(f, "stored type mismatch"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Open(e) => write!(f, "open failed: {}", e),
            Self::Read(key, e) => write!(f, "read '{}' failed: {}", key, e),
            Self::Write(key, e) => write!(f, "write '{}' failed: {}", key, e),
            Self::Commit(e) => write!(f, "commit failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(e) | Self::Read(_, e) | Self::Write(_, e) | Self::Commit(e) => Some(e),
        }
    }
}

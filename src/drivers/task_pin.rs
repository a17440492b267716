//! Core-pinned thread spawning for ESP32 dual-core parts.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task pinned to a specific CPU core with explicit priority
//! and stack size. On non-ESP targets, falls back to a plain thread with
//! the requested stack.
//!
//! `esp_pthread_set_cfg()` sets thread-local configuration that applies to
//! the *next* `pthread_create()` from the calling thread, so the
//! config→spawn pair must not be interleaved with other thread creation
//! on the same thread.

use std::io;
use std::thread::JoinHandle;

/// CPU core identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU): protocol stacks (WiFi, lwIP).
    Pro = 0,
    /// Core 1 (APP_CPU): coordinator and indication.
    App = 1,
}

/// Smallest stack accepted, in KiB.  Persisted tunables below this are
/// raised to it.
pub const MIN_STACK_KB: usize = 2;

/// Parameters for one pinned thread.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    pub core: Core,
    pub priority: u8,
    pub stack_kb: usize,
    /// Must be NUL-terminated (e.g. `"sys-run\0"`).
    pub name: &'static str,
}

impl TaskSpec {
    fn display_name(&self) -> &'static str {
        self.name.trim_end_matches('\0')
    }

    fn stack_bytes(&self) -> usize {
        self.stack_kb.max(MIN_STACK_KB) * 1024
    }
}

/// Spawn a thread pinned to a core with explicit priority and stack.
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(spec: TaskSpec, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
    // SAFETY: the config struct is fully initialised by
    // esp_create_default_pthread_config and `name` is 'static.
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = spec.core as i32;
        cfg.prio = spec.priority as i32;
        cfg.stack_size = spec.stack_bytes() as _;
        cfg.thread_name = spec.name.as_ptr() as *const _;
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        if ret != esp_idf_sys::ESP_OK as i32 {
            return Err(io::Error::other(format!("esp_pthread_set_cfg failed: {ret}")));
        }
    }

    log::info!(
        "Spawning '{}' on {:?} (pri={}, stack={}KB)",
        spec.display_name(),
        spec.core,
        spec.priority,
        spec.stack_bytes() / 1024
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        .spawn(f)
}

/// Simulation fallback; ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(spec: TaskSpec, f: impl FnOnce() + Send + 'static) -> io::Result<JoinHandle<()>> {
    log::info!(
        "Spawning '{}' (sim, no core pinning, stack={}KB)",
        spec.display_name(),
        spec.stack_bytes() / 1024
    );

    std::thread::Builder::new()
        .name(spec.display_name().into())
        // std threads on the host need at least 64 KiB.
        .stack_size(spec.stack_bytes().max(64 * 1024))
        .spawn(f)
}

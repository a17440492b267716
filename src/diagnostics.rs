//! Commanded and periodic runtime diagnostics.
//!
//! Any thread may request a diagnostic by setting its bit in [`DiagFlags`].
//! The dispatcher clears and runs at most one per iteration, highest
//! priority first, so a burst of requests is spread over several
//! iterations.
//!
//! On device the actions call into the ESP-IDF heap and FreeRTOS task
//! APIs; on the host they report a synthetic [`RuntimeMetrics`] snapshot.

use core::sync::atomic::{AtomicU8, Ordering};

use log::{error, info};

use crate::adapters::time::UptimeClock;
use crate::app::ports::DiagnosticsPort;

/// One diagnostic action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiagRequest {
    /// Verify heap integrity across all capabilities.
    HeapCheck = 0b0000_0001,
    /// Dump per-task runtime statistics.
    RuntimeStats = 0b0000_0010,
    /// Dump heap usage.
    MemoryStats = 0b0000_0100,
    /// Dump task count and stack headroom.
    TaskInfo = 0b0000_1000,
}

impl DiagRequest {
    /// Service order when several bits are set.
    pub const PRIORITY: [DiagRequest; 4] = [
        DiagRequest::HeapCheck,
        DiagRequest::RuntimeStats,
        DiagRequest::MemoryStats,
        DiagRequest::TaskInfo,
    ];

    /// Return the bitmask for this request.
    pub const fn mask(self) -> u8 {
        self as u8
    }
}

/// Externally settable request bits.
#[derive(Debug, Default)]
pub struct DiagFlags {
    bits: AtomicU8,
}

impl DiagFlags {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    pub fn request(&self, kind: DiagRequest) {
        self.bits.fetch_or(kind.mask(), Ordering::AcqRel);
    }

    pub fn pending(&self) -> u8 {
        self.bits.load(Ordering::Acquire)
    }

    /// Clear and return the highest-priority pending request.
    pub fn take_next(&self) -> Option<DiagRequest> {
        let bits = self.bits.load(Ordering::Acquire);
        let kind = DiagRequest::PRIORITY
            .into_iter()
            .find(|k| bits & k.mask() != 0)?;
        // Producers only ever set bits, so clearing ours cannot lose theirs.
        self.bits.fetch_and(!kind.mask(), Ordering::AcqRel);
        Some(kind)
    }
}

// ───────────────────────────────────────────────────────────────
// Runtime metrics
// ───────────────────────────────────────────────────────────────

/// Runtime diagnostics snapshot collected on-demand.
#[derive(Debug, Clone)]
pub struct RuntimeMetrics {
    pub uptime_secs: u64,
    pub loop_iterations: u64,
    pub heap_free: u32,
    pub heap_min_free: u32,
    pub largest_free_block: u32,
    pub task_count: u32,
    pub stack_high_water: u32,
}

impl RuntimeMetrics {
    #[cfg(target_os = "espidf")]
    pub fn collect(uptime_secs: u64, loop_iterations: u64) -> Self {
        use esp_idf_svc::sys::*;
        // SAFETY: plain reads of allocator and scheduler counters.
        unsafe {
            Self {
                uptime_secs,
                loop_iterations,
                heap_free: esp_get_free_heap_size(),
                heap_min_free: esp_get_minimum_free_heap_size(),
                largest_free_block: heap_caps_get_largest_free_block(MALLOC_CAP_DEFAULT) as u32,
                task_count: uxTaskGetNumberOfTasks() as u32,
                stack_high_water: uxTaskGetStackHighWaterMark(core::ptr::null_mut()) as u32,
            }
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn collect(uptime_secs: u64, loop_iterations: u64) -> Self {
        // Synthetic values; heap "decays" slightly over time to model
        // fragmentation.
        let base_free: u32 = 307_200;
        let decay = (uptime_secs / 60) as u32 * 512;
        let heap_free = base_free.saturating_sub(decay);
        Self {
            uptime_secs,
            loop_iterations,
            heap_free,
            heap_min_free: (heap_free as f32 * 0.85) as u32,
            largest_free_block: heap_free / 2,
            task_count: 8,
            stack_high_water: 1024,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Diagnostics adapter
// ───────────────────────────────────────────────────────────────

/// [`DiagnosticsPort`] backed by the ESP-IDF heap and task APIs.
pub struct SystemDiagnostics {
    time: UptimeClock,
    last: Option<RuntimeMetrics>,
}

impl Default for SystemDiagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemDiagnostics {
    pub fn new() -> Self {
        Self {
            time: UptimeClock::new(),
            last: None,
        }
    }

    /// Snapshot taken by the most recent stats action.
    pub fn last_metrics(&self) -> Option<&RuntimeMetrics> {
        self.last.as_ref()
    }

    fn heap_check(&self) -> bool {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: walks the heap under the allocator's own locks.
            unsafe { esp_idf_svc::sys::heap_caps_check_integrity_all(true) }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            true
        }
    }
}

impl DiagnosticsPort for SystemDiagnostics {
    fn run(&mut self, kind: DiagRequest, iterations: u64) {
        match kind {
            DiagRequest::HeapCheck => {
                if self.heap_check() {
                    info!("DIAG: heap integrity OK");
                } else {
                    error!("DIAG: heap integrity check FAILED");
                }
            }
            DiagRequest::RuntimeStats => {
                let m = RuntimeMetrics::collect(self.time.uptime_secs(), iterations);
                info!(
                    "DIAG: uptime={}s loop_iterations={}",
                    m.uptime_secs, m.loop_iterations
                );
                self.last = Some(m);
            }
            DiagRequest::MemoryStats => {
                let m = RuntimeMetrics::collect(self.time.uptime_secs(), iterations);
                info!(
                    "DIAG: heap free={}B min_free={}B largest_block={}B",
                    m.heap_free, m.heap_min_free, m.largest_free_block
                );
                self.last = Some(m);
            }
            DiagRequest::TaskInfo => {
                let m = RuntimeMetrics::collect(self.time.uptime_secs(), iterations);
                info!(
                    "DIAG: tasks={} run-loop stack high water={}",
                    m.task_count, m.stack_high_water
                );
                self.last = Some(m);
            }
        }
    }
}

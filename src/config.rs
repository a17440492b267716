//! System configuration parameters
//!
//! Compiled-in defaults for the coordinator and the small set of values
//! that are persisted in NVS across power cycles.
//!
//! Persisted names double as NVS keys, so every name is kept to 15
//! characters or less.

use core::time::Duration;

use serde::{Deserialize, Serialize};

/// NVS namespace holding the persisted values.
pub const NVS_NAMESPACE: &str = "system";

/// Longest key the NVS backend accepts.
pub const MAX_KEY_LEN: usize = 15;

// ---------------------------------------------------------------------------
// Firmware version
// ---------------------------------------------------------------------------

/// Semantic version of the running firmware.  Handed to the indication
/// subsystem at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FirmwareVersion {
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this build, taken from the package manifest.
    pub fn current() -> Self {
        Self {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
        }
    }
}

impl core::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

// ---------------------------------------------------------------------------
// Persisted values
// ---------------------------------------------------------------------------

/// Identity of one persisted value.  The name is also the NVS key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    RunStackSizeK,
    GpioStackSizeK,
    TimerStackSizeK,
    BootCount,
}

impl ConfigKey {
    /// Restore and save order.
    pub const ALL: [ConfigKey; 4] = [
        ConfigKey::RunStackSizeK,
        ConfigKey::GpioStackSizeK,
        ConfigKey::TimerStackSizeK,
        ConfigKey::BootCount,
    ];

    /// The three ratcheted stack-size tunables.
    pub const STACK_SIZES: [ConfigKey; 3] = [
        ConfigKey::RunStackSizeK,
        ConfigKey::GpioStackSizeK,
        ConfigKey::TimerStackSizeK,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::RunStackSizeK => "runStackSizeK",
            Self::GpioStackSizeK => "gpioStackSizeK",
            Self::TimerStackSizeK => "timerStackSizeK",
            Self::BootCount => "bootCount",
        }
    }

    pub const fn is_stack_size(self) -> bool {
        !matches!(self, Self::BootCount)
    }
}

/// The values kept in NVS.
///
/// Stack sizes are in KiB and only ever ratchet upwards; `boot_count`
/// is adopted verbatim from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedValues {
    pub run_stack_size_k: u8,
    pub gpio_stack_size_k: u8,
    pub timer_stack_size_k: u8,
    pub boot_count: u32,
}

impl Default for PersistedValues {
    fn default() -> Self {
        Self {
            run_stack_size_k: 5,
            gpio_stack_size_k: 4,
            timer_stack_size_k: 4,
            boot_count: 0,
        }
    }
}

impl PersistedValues {
    /// Stack-size tunable for `key`.  `None` for the boot counter.
    pub fn stack_size(&self, key: ConfigKey) -> Option<u8> {
        match key {
            ConfigKey::RunStackSizeK => Some(self.run_stack_size_k),
            ConfigKey::GpioStackSizeK => Some(self.gpio_stack_size_k),
            ConfigKey::TimerStackSizeK => Some(self.timer_stack_size_k),
            ConfigKey::BootCount => None,
        }
    }

    pub(crate) fn stack_size_mut(&mut self, key: ConfigKey) -> Option<&mut u8> {
        match key {
            ConfigKey::RunStackSizeK => Some(&mut self.run_stack_size_k),
            ConfigKey::GpioStackSizeK => Some(&mut self.gpio_stack_size_k),
            ConfigKey::TimerStackSizeK => Some(&mut self.timer_stack_size_k),
            ConfigKey::BootCount => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Run loop ---
    /// Bounded wait on the notification channel each Run iteration (ms)
    pub notify_wait_ms: u32,
    /// Bounded wait on the command mailbox each Run iteration (ms)
    pub command_wait_ms: u32,
    /// Sleep per iteration while idle-silent (ms)
    pub idle_silent_interval_ms: u32,

    // --- Boot ---
    /// Bounded wait per iteration on a subsystem handshake (ms)
    pub handshake_wait_ms: u32,

    // --- Persistence ---
    /// Advisory delay recorded when restore raises a value (s)
    pub save_delay_secs: u8,

    // --- Diagnostics ---
    /// Period of the general timer's heap check request (s, 0 = off)
    pub diag_interval_secs: u32,

    /// Version handed to the indication subsystem
    pub version: FirmwareVersion,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Run loop
            notify_wait_ms: 95,
            command_wait_ms: 95,
            idle_silent_interval_ms: 5000,

            // Boot
            handshake_wait_ms: 100,

            // Persistence
            save_delay_secs: 2,

            // Diagnostics
            diag_interval_secs: 0,

            version: FirmwareVersion::current(),
        }
    }
}

impl SystemConfig {
    pub fn notify_wait(&self) -> Duration {
        Duration::from_millis(self.notify_wait_ms as u64)
    }

    pub fn command_wait(&self) -> Duration {
        Duration::from_millis(self.command_wait_ms as u64)
    }

    pub fn handshake_wait(&self) -> Duration {
        Duration::from_millis(self.handshake_wait_ms as u64)
    }

    pub fn idle_silent_interval(&self) -> Duration {
        Duration::from_millis(self.idle_silent_interval_ms as u64)
    }

    /// Range-check the timing parameters.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.notify_wait_ms > 1000 {
            return Err("notify_wait_ms must be 0–1000");
        }
        if self.command_wait_ms > 1000 {
            return Err("command_wait_ms must be 0–1000");
        }
        if self.handshake_wait_ms > 1000 {
            return Err("handshake_wait_ms must be 0–1000");
        }
        if !(1..=60_000).contains(&self.idle_silent_interval_ms) {
            return Err("idle_silent_interval_ms must be 1–60000");
        }
        Ok(())
    }
}

//! Error types shared across the system coordinator.
//!
//! Nothing here unwinds across component boundaries: callers log and carry
//! on.  Every type implements `std::error::Error`, so the binary edge can
//! wrap them with `anyhow` context directly.

use core::fmt;

// ---------------------------------------------------------------------------
// Platform error (bring-up entry points)
// ---------------------------------------------------------------------------

/// Error returned by a platform bring-up entry point (network layer,
/// default event loop).  Carries the raw platform code and its symbolic
/// name so a boot failure message can be rendered without the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformError {
    pub code: i32,
    pub name: &'static str,
}

impl PlatformError {
    pub const fn new(code: i32, name: &'static str) -> Self {
        Self { code, name }
    }

    /// Build from an ESP-IDF `esp_err_t`, resolving the name through
    /// `esp_err_to_name`.
    #[cfg(target_os = "espidf")]
    pub fn from_esp(code: esp_idf_svc::sys::esp_err_t) -> Self {
        // SAFETY: esp_err_to_name returns a pointer into a static table
        // (or a static "UNKNOWN ERROR" string); it is never freed.
        let name = unsafe { core::ffi::CStr::from_ptr(esp_idf_svc::sys::esp_err_to_name(code)) };
        Self {
            code,
            name: name.to_str().unwrap_or("UNKNOWN ERROR"),
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.code)
    }
}

impl std::error::Error for PlatformError {}

// ---------------------------------------------------------------------------
// Command submission errors
// ---------------------------------------------------------------------------

/// Why a command could not be placed in the single-slot mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The mailbox has not been opened yet (boot has not reached the
    /// queue initialisation step).
    NotReady,
    /// A request is already outstanding.
    Full,
    /// The bounded wait for a free slot expired.
    Timeout,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotReady => write!(f, "command mailbox not open"),
            Self::Full => write!(f, "command mailbox full"),
            Self::Timeout => write!(f, "timed out waiting for command mailbox"),
        }
    }
}

impl std::error::Error for SubmitError {}

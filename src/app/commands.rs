//! Inbound commands and notifications.
//!
//! Commands carry input and may return data; they travel through the
//! single-slot mailbox.  Notifications carry neither and travel through
//! the latest-value-wins notification channel.

use log::warn;
use serde::Serialize;

use crate::diagnostics::DiagRequest;

/// Capacity of a command's string payload.
pub const PAYLOAD_CAP: usize = 128;

/// Command tags understood by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysCommand {
    /// No-op.
    None,
    /// Persist the current values on the next iteration.
    SaveConfig,
    /// Reply with the persisted values.
    GetConfig,
    /// Request one diagnostic action.
    RunDiagnostic(DiagRequest),
    /// A tag this firmware does not know.  Logged and ignored.
    Unknown(u8),
}

impl SysCommand {
    /// Wire tag of the command.
    pub fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::SaveConfig => 1,
            Self::GetConfig => 2,
            Self::RunDiagnostic(DiagRequest::HeapCheck) => 10,
            Self::RunDiagnostic(DiagRequest::RuntimeStats) => 11,
            Self::RunDiagnostic(DiagRequest::MemoryStats) => 12,
            Self::RunDiagnostic(DiagRequest::TaskInfo) => 13,
            Self::Unknown(tag) => tag,
        }
    }
}

impl From<u8> for SysCommand {
    fn from(tag: u8) -> Self {
        match tag {
            0 => Self::None,
            1 => Self::SaveConfig,
            2 => Self::GetConfig,
            10 => Self::RunDiagnostic(DiagRequest::HeapCheck),
            11 => Self::RunDiagnostic(DiagRequest::RuntimeStats),
            12 => Self::RunDiagnostic(DiagRequest::MemoryStats),
            13 => Self::RunDiagnostic(DiagRequest::TaskInfo),
            other => Self::Unknown(other),
        }
    }
}

/// A request placed in the command mailbox.  Owned by the dispatcher once
/// received, so the sender's buffers are free as soon as submission
/// returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub command: SysCommand,
    pub payload: Option<heapless::String<PAYLOAD_CAP>>,
}

impl CommandRequest {
    pub fn new(command: SysCommand) -> Self {
        Self {
            command,
            payload: None,
        }
    }

    /// Attach a payload.
    ///
    /// A payload longer than [`PAYLOAD_CAP`] bytes is cut at the last char
    /// that fits and a warning is logged; the request is still built.
    pub fn with_payload(command: SysCommand, payload: &str) -> Self {
        let mut s = heapless::String::new();
        for c in payload.chars() {
            if s.push(c).is_err() {
                warn!(
                    "CMD: {:?} payload truncated {} -> {} bytes",
                    command,
                    payload.len(),
                    s.len()
                );
                break;
            }
        }
        Self {
            command,
            payload: Some(s),
        }
    }
}

/// Reply placed in the response mailbox.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub command: u8,
    pub payload: Option<serde_json::Value>,
}

/// Out-of-band signals from the network side.  Integer-coded so they can
/// be posted from C callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SysNotify {
    WifiConnected = 1,
    WifiDisconnecting = 2,
    WifiDisconnected = 3,
    WifiShutdown = 4,
}

impl SysNotify {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::WifiConnected),
            2 => Some(Self::WifiDisconnecting),
            3 => Some(Self::WifiDisconnected),
            4 => Some(Self::WifiShutdown),
            _ => None,
        }
    }
}

/// Message forwarded to a subsystem's own command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubsystemCommand {
    /// Network availability changed.
    Network(SysNotify),
}

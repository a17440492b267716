//! Outbound coordinator events.
//!
//! [`System`](super::service::System) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them.

use super::commands::{SysCommand, SysNotify};
use crate::config::PersistedValues;
use crate::diagnostics::DiagRequest;
use crate::fsm::InitStep;
use crate::fsm::context::FAILURE_MSG_CAP;
use super::service::OperationalMode;

/// Structured events emitted by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum SysEvent {
    /// The dispatcher started (carries the initial mode).
    Started(OperationalMode),

    /// The bring-up sequence moved to a new step.
    InitStep(InitStep),

    /// The top-level mode changed.
    ModeChanged {
        from: OperationalMode,
        to: OperationalMode,
    },

    /// Bring-up failed; carries the recorded message.
    BootFailed(heapless::String<FAILURE_MSG_CAP>),

    /// A network notification was taken and propagated.
    Network(SysNotify),

    /// A command was dispatched.
    Command(SysCommand),

    /// The persisted values were written and committed.
    ConfigSaved(PersistedValues),

    /// A save was attempted and rolled back.
    ConfigSaveFailed,

    /// One diagnostic action ran.
    Diagnostic(DiagRequest),
}

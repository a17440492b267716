//! Subsystem handle registry.
//!
//! Each dependent subsystem publishes a [`SubsystemHandle`] once it is
//! initialised.  The handshake is a one-shot [`ReadySignal`]: the subsystem
//! calls [`ReadySignal::publish`] from its own thread and the coordinator
//! takes the handle with a bounded wait during bring-up, so it can never
//! observe a partially constructed handle.
//!
//! ```text
//!  subsystem thread              coordinator (Init)
//!  ────────────────              ──────────────────
//!  build queue + task
//!  signal.publish(handle) ───▶  wait_bounded(signal.wait())
//!                               registry.record(kind, handle)
//! ```
//!
//! Handles are held for the process lifetime; the coordinator never tears
//! a subsystem down.

use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use log::warn;

use crate::app::commands::SubsystemCommand;

/// Depth of each subsystem's own command channel.
pub const SUBSYSTEM_QUEUE_DEPTH: usize = 4;

/// Command channel owned by a subsystem and shared with the coordinator.
pub type SubsystemQueue = Channel<CriticalSectionRawMutex, SubsystemCommand, SUBSYSTEM_QUEUE_DEPTH>;

/// Opaque identity of a subsystem's unit of work (a FreeRTOS task handle
/// on device, a thread counter in simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub usize);

/// Work handle plus command channel published by a ready subsystem.
#[derive(Clone)]
pub struct SubsystemHandle {
    pub task: TaskHandle,
    pub commands: Arc<SubsystemQueue>,
}

impl SubsystemHandle {
    pub fn new(task: TaskHandle, commands: Arc<SubsystemQueue>) -> Self {
        Self { task, commands }
    }
}

impl core::fmt::Debug for SubsystemHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubsystemHandle")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// One-shot completion signal carrying a subsystem's handles.
#[derive(Clone)]
pub struct ReadySignal {
    inner: Arc<Signal<CriticalSectionRawMutex, SubsystemHandle>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Signal::new()),
        }
    }

    /// Publish the handles.  Called once by the subsystem.
    pub fn publish(&self, handle: SubsystemHandle) {
        self.inner.signal(handle);
    }

    /// Resolve when the handles have been published, consuming them.
    pub async fn wait(&self) -> SubsystemHandle {
        self.inner.wait().await
    }

    /// Take the handles if already published.
    pub fn try_take(&self) -> Option<SubsystemHandle> {
        self.inner.try_take()
    }

    pub fn is_published(&self) -> bool {
        self.inner.signaled()
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadySignal")
            .field("published", &self.is_published())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Subsystems brought up by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Indication,
    Wifi,
}

impl Subsystem {
    pub const ALL: [Subsystem; 2] = [Subsystem::Indication, Subsystem::Wifi];
}

/// Handles of every subsystem that has completed its handshake.
#[derive(Debug, Default)]
pub struct SubsystemRegistry {
    indication: Option<SubsystemHandle>,
    wifi: Option<SubsystemHandle>,
}

impl SubsystemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, which: Subsystem) -> &mut Option<SubsystemHandle> {
        match which {
            Subsystem::Indication => &mut self.indication,
            Subsystem::Wifi => &mut self.wifi,
        }
    }

    /// Record the handles for `which`.  Each subsystem is recorded at most
    /// once; a second publication is ignored and returns `false`.
    pub fn record(&mut self, which: Subsystem, handle: SubsystemHandle) -> bool {
        let slot = self.slot(which);
        if slot.is_some() {
            warn!("REGISTRY: duplicate handles for {:?} ignored", which);
            return false;
        }
        *slot = Some(handle);
        true
    }

    pub fn get(&self, which: Subsystem) -> Option<&SubsystemHandle> {
        match which {
            Subsystem::Indication => self.indication.as_ref(),
            Subsystem::Wifi => self.wifi.as_ref(),
        }
    }

    pub fn is_ready(&self, which: Subsystem) -> bool {
        self.get(which).is_some()
    }

    /// Number of recorded subsystems.
    pub fn len(&self) -> usize {
        Subsystem::ALL.iter().filter(|s| self.is_ready(**s)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward `cmd` to every recorded subsystem without blocking.
    /// Returns how many accepted it; a full channel drops the message.
    pub fn broadcast(&self, cmd: SubsystemCommand) -> usize {
        let mut delivered = 0;
        for which in Subsystem::ALL {
            let Some(handle) = self.get(which) else {
                continue;
            };
            if handle.commands.try_send(cmd).is_ok() {
                delivered += 1;
            } else {
                warn!("REGISTRY: {:?} command queue full, dropped {:?}", which, cmd);
            }
        }
        delivered
    }
}

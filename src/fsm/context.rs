//! Context threaded through every bring-up step handler.
//!
//! `InitContext` borrows the parts of the coordinator the steps act on:
//! the platform entry points, the shared channels, the handle registry and
//! configuration.  State that must survive between ticks (handshakes in
//! flight, the failure message) lives in [`BootState`], owned by the
//! coordinator.

use core::fmt::Write as _;

use log::{error, info};

use crate::app::ports::Platform;
use crate::channels::{SystemShared, wait_bounded};
use crate::config::{PersistedValues, SystemConfig};
use crate::error::PlatformError;
use crate::registry::{ReadySignal, Subsystem, SubsystemRegistry};

use super::InitStep;

/// Capacity of the recorded failure message.
pub const FAILURE_MSG_CAP: usize = 128;

/// Bring-up state carried across ticks.
#[derive(Debug, Default)]
pub struct BootState {
    /// Handshake of a constructed indication subsystem not yet consumed.
    pub indication: Option<ReadySignal>,
    /// Handshake of a constructed WiFi subsystem not yet consumed.
    pub wifi: Option<ReadySignal>,
    /// Set when a step fails.
    pub failure: Option<heapless::String<FAILURE_MSG_CAP>>,
}

impl BootState {
    fn handshake(&mut self, which: Subsystem) -> &mut Option<ReadySignal> {
        match which {
            Subsystem::Indication => &mut self.indication,
            Subsystem::Wifi => &mut self.wifi,
        }
    }
}

/// The context passed to every step handler.
pub struct InitContext<'a, P> {
    pub platform: &'a mut P,
    pub shared: &'a SystemShared,
    pub registry: &'a mut SubsystemRegistry,
    pub config: &'a SystemConfig,
    pub persisted: &'a PersistedValues,
    pub state: &'a mut BootState,
    /// Steps entered during the current tick, in order.
    pub entered: heapless::Vec<InitStep, { InitStep::COUNT }>,
}

impl<'a, P: Platform> InitContext<'a, P> {
    pub fn new(
        platform: &'a mut P,
        shared: &'a SystemShared,
        registry: &'a mut SubsystemRegistry,
        config: &'a SystemConfig,
        persisted: &'a PersistedValues,
        state: &'a mut BootState,
    ) -> Self {
        Self {
            platform,
            shared,
            registry,
            config,
            persisted,
            state,
            entered: heapless::Vec::new(),
        }
    }

    pub(super) fn note_entered(&mut self, step: InitStep) {
        // Bounded by the forward-only table.
        let _ = self.entered.push(step);
    }

    /// Record a failed bring-up call.
    pub fn fail(&mut self, step: &str, err: PlatformError) {
        let mut msg = heapless::String::new();
        // Overflow truncates the message, which is acceptable for a log line.
        let _ = write!(msg, "{}: error: {}", step, err);
        error!("BOOT: {}", msg);
        self.state.failure = Some(msg);
    }

    /// Whether `which` has been constructed and its handshake is pending.
    pub fn is_constructed(&mut self, which: Subsystem) -> bool {
        self.state.handshake(which).is_some() || self.registry.is_ready(which)
    }

    pub fn set_constructed(&mut self, which: Subsystem, signal: ReadySignal) {
        *self.state.handshake(which) = Some(signal);
    }

    /// Wait (bounded) for `which` to publish its handles and record them.
    /// Returns `true` once the handles are in the registry.
    pub fn await_handshake(&mut self, which: Subsystem) -> bool {
        let wait = self.config.handshake_wait();
        let Some(signal) = self.state.handshake(which).as_ref() else {
            return self.registry.is_ready(which);
        };
        let handle = match signal.try_take() {
            Some(h) => Some(h),
            None => wait_bounded(signal.wait(), wait),
        };
        let Some(handle) = handle else {
            return false;
        };
        info!("BOOT: {:?} ready (task {:?})", which, handle.task);
        self.registry.record(which, handle);
        *self.state.handshake(which) = None;
        true
    }
}

//! Concrete step handlers and table builder.
//!
//! ```text
//!  Start ─▶ InitQueuesCommands ─▶ StartNetworkInterface ─▶ CreateDefaultEventLoop
//!                                        │                        │
//!                                     [error]                  [error]
//!                                        ▼                        ▼
//!                                      Error ◀────────────────────┘
//!
//!  CreateIndication ═▶ WaitOnIndication ─▶ CreateWifi ═▶ WaitOnWifi ─▶ Finished
//!        ↺ [not built]      ↺ [timeout]         ↺             ↺
//! ```
//!
//! `═▶` is a same-tick transition; `─▶` takes effect on the next tick.

use log::{debug, info};

use super::context::InitContext;
use super::{InitStep, StepDescriptor, Transition, BootOutcome};
use crate::app::ports::{GeneralTimerSpec, Platform};
use crate::registry::Subsystem;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the step table.  Called once per boot.
pub fn build_step_table<P: Platform>() -> [StepDescriptor<P>; InitStep::COUNT] {
    [
        StepDescriptor {
            id: InitStep::Start,
            name: "Start",
            on_enter: None,
            on_update: start_update,
        },
        StepDescriptor {
            id: InitStep::InitQueuesCommands,
            name: "Init_Queues_Commands",
            on_enter: None,
            on_update: init_queues_update,
        },
        StepDescriptor {
            id: InitStep::StartNetworkInterface,
            name: "Start_Network_Interface",
            on_enter: None,
            on_update: start_network_update,
        },
        StepDescriptor {
            id: InitStep::CreateDefaultEventLoop,
            name: "Create_Default_Event_Loop",
            on_enter: None,
            on_update: create_event_loop_update,
        },
        StepDescriptor {
            id: InitStep::CreateIndication,
            name: "Create_Indication",
            on_enter: None,
            on_update: create_indication_update,
        },
        StepDescriptor {
            id: InitStep::WaitOnIndication,
            name: "Wait_On_Indication",
            on_enter: None,
            on_update: wait_indication_update,
        },
        StepDescriptor {
            id: InitStep::CreateWifi,
            name: "Create_Wifi",
            on_enter: None,
            on_update: create_wifi_update,
        },
        StepDescriptor {
            id: InitStep::WaitOnWifi,
            name: "Wait_On_Wifi",
            on_enter: None,
            on_update: wait_wifi_update,
        },
        StepDescriptor {
            id: InitStep::Finished,
            name: "Finished",
            on_enter: Some(finished_enter),
            on_update: finished_update,
        },
        StepDescriptor {
            id: InitStep::Error,
            name: "Error",
            on_enter: None,
            on_update: error_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  Queues and platform services
// ═══════════════════════════════════════════════════════════════════════════

fn start_update<P: Platform>(_ctx: &mut InitContext<'_, P>) -> Transition {
    Transition::Immediate(InitStep::InitQueuesCommands)
}

fn init_queues_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    ctx.shared.open_mailbox();
    debug!("BOOT: command mailbox open");
    Transition::Next(InitStep::StartNetworkInterface)
}

fn start_network_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    match ctx.platform.init_network() {
        Ok(()) => Transition::Next(InitStep::CreateDefaultEventLoop),
        Err(e) => {
            ctx.fail("Start_Network_Interface", e);
            Transition::Next(InitStep::Error)
        }
    }
}

fn create_event_loop_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    match ctx.platform.create_event_loop() {
        Ok(()) => Transition::Next(InitStep::CreateIndication),
        Err(e) => {
            ctx.fail("Create_Default_Event_Loop", e);
            Transition::Next(InitStep::Error)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Subsystems
// ═══════════════════════════════════════════════════════════════════════════

fn create_indication_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    if !ctx.is_constructed(Subsystem::Indication) {
        match ctx.platform.create_indication(ctx.config.version) {
            Some(signal) => ctx.set_constructed(Subsystem::Indication, signal),
            None => return Transition::Stay,
        }
    }
    Transition::Immediate(InitStep::WaitOnIndication)
}

fn wait_indication_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    if ctx.await_handshake(Subsystem::Indication) {
        Transition::Next(InitStep::CreateWifi)
    } else {
        Transition::Stay
    }
}

fn create_wifi_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    if !ctx.is_constructed(Subsystem::Wifi) {
        match ctx.platform.create_wifi() {
            Some(signal) => ctx.set_constructed(Subsystem::Wifi, signal),
            None => return Transition::Stay,
        }
    }
    Transition::Immediate(InitStep::WaitOnWifi)
}

fn wait_wifi_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    if ctx.await_handshake(Subsystem::Wifi) {
        Transition::Next(InitStep::Finished)
    } else {
        Transition::Stay
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Terminal steps
// ═══════════════════════════════════════════════════════════════════════════

fn finished_enter<P: Platform>(ctx: &mut InitContext<'_, P>) {
    info!("BOOT: all subsystems up ({} registered)", ctx.registry.len());
}

fn finished_update<P: Platform>(ctx: &mut InitContext<'_, P>) -> Transition {
    let spec = GeneralTimerSpec {
        interval_secs: ctx.config.diag_interval_secs,
        stack_kb: ctx.persisted.timer_stack_size_k as usize,
    };
    ctx.platform
        .start_general_timer(spec, ctx.shared.diag_flags().clone());
    Transition::Done(BootOutcome::Succeeded)
}

fn error_update<P: Platform>(_ctx: &mut InitContext<'_, P>) -> Transition {
    Transition::Done(BootOutcome::Failed)
}

//! System service: the coordinator core.
//!
//! [`System`] owns the bring-up sequence, the subsystem registry and the
//! persisted configuration.  It runs on one dedicated thread; other
//! threads talk to it through a [`SystemHandle`].  All I/O flows through
//! port traits, so the whole service is testable with mock adapters.
//!
//! ```text
//!  Platform ──────▶ ┌──────────────────────────┐ ──▶ EventSink
//!  PersistenceStore │          System          │
//!  DiagnosticsPort  │ Init · Run · Error · Idle│
//!  SystemHandle ──▶ └──────────────────────────┘
//! ```

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::channels::{SystemHandle, SystemShared};
use crate::config::SystemConfig;
use crate::fsm::context::{BootState, InitContext};
use crate::fsm::states::build_step_table;
use crate::fsm::{BootOutcome, BootSequence, InitStep};
use crate::persist::ConfigManager;
use crate::registry::SubsystemRegistry;

use super::commands::{CommandRequest, CommandResponse, SubsystemCommand, SysCommand, SysNotify};
use super::events::SysEvent;
use super::ports::{DiagnosticsPort, EventSink, PersistenceStore, Platform};

/// Top-level mode governing what each dispatcher iteration does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationalMode {
    /// Bringing subsystems up.
    Init,
    /// Steady-state dispatch.
    Run,
    /// Bring-up failed; the message is logged on the next iteration.
    Error,
    /// Announces the idle state once.
    Idle,
    /// Sleeps forever, doing nothing else.
    IdleSilent,
}

// ───────────────────────────────────────────────────────────────
// System
// ───────────────────────────────────────────────────────────────

/// The coordinator.
pub struct System<S: PersistenceStore, P: Platform, D: DiagnosticsPort> {
    mode: OperationalMode,
    config: SystemConfig,
    boot: BootSequence<P>,
    boot_state: BootState,
    platform: P,
    registry: SubsystemRegistry,
    persist: ConfigManager<S>,
    diagnostics: D,
    shared: Arc<SystemShared>,
    network_up: bool,
    iterations: u64,
}

impl<S: PersistenceStore, P: Platform, D: DiagnosticsPort> System<S, P, D> {
    /// Construct the coordinator in `Init`.
    ///
    /// `persist` should already have been restored; the dispatcher only
    /// ever saves.
    pub fn new(config: SystemConfig, platform: P, persist: ConfigManager<S>, diagnostics: D) -> Self {
        Self {
            mode: OperationalMode::Init,
            config,
            boot: BootSequence::new(build_step_table()),
            boot_state: BootState::default(),
            platform,
            registry: SubsystemRegistry::new(),
            persist,
            diagnostics,
            shared: Arc::new(SystemShared::new()),
            network_up: false,
            iterations: 0,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    /// Producer handle for other threads.
    pub fn handle(&self) -> SystemHandle {
        SystemHandle::new(self.shared.clone())
    }

    pub fn mode(&self) -> OperationalMode {
        self.mode
    }

    pub fn boot_step(&self) -> InitStep {
        self.boot.current_step()
    }

    pub fn registry(&self) -> &SubsystemRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn config_manager(&self) -> &ConfigManager<S> {
        &self.persist
    }

    pub fn config_manager_mut(&mut self) -> &mut ConfigManager<S> {
        &mut self.persist
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }

    /// Message recorded by a failed bring-up step.
    pub fn failure_message(&self) -> Option<&str> {
        self.boot_state.failure.as_deref()
    }

    /// Whether the last network notification reported connectivity.
    pub fn network_up(&self) -> bool {
        self.network_up
    }

    /// Dispatcher iterations so far.
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce the initial mode.
    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&SysEvent::Started(self.mode));
        info!("System started in {:?}", self.mode);
    }

    /// Run the dispatcher forever.
    pub fn run(&mut self, sink: &mut impl EventSink) -> ! {
        self.start(sink);
        loop {
            self.run_once(sink);
            std::thread::yield_now();
        }
    }

    // ── Per-iteration dispatch ────────────────────────────────

    /// One dispatcher iteration for the current mode.
    pub fn run_once(&mut self, sink: &mut impl EventSink) {
        self.iterations = self.iterations.wrapping_add(1);

        match self.mode {
            OperationalMode::Init => self.init_tick(sink),
            OperationalMode::Run => self.run_tick(sink),
            OperationalMode::Error => {
                error!(
                    "SYS: bring-up failed: {}",
                    self.failure_message().unwrap_or("unknown error")
                );
                self.set_mode(OperationalMode::Idle, sink);
            }
            OperationalMode::Idle => {
                info!("SYS: Idle...");
                self.set_mode(OperationalMode::IdleSilent, sink);
                self.idle_silent();
            }
            OperationalMode::IdleSilent => self.idle_silent(),
        }
    }

    fn idle_silent(&self) {
        std::thread::sleep(self.config.idle_silent_interval());
    }

    fn set_mode(&mut self, to: OperationalMode, sink: &mut impl EventSink) {
        if to == self.mode {
            return;
        }
        let from = self.mode;
        self.mode = to;
        info!("SYS: mode {:?} -> {:?}", from, to);
        sink.emit(&SysEvent::ModeChanged { from, to });
    }

    // ── Init ──────────────────────────────────────────────────

    fn init_tick(&mut self, sink: &mut impl EventSink) {
        let (outcome, entered) = {
            let mut ctx = InitContext::new(
                &mut self.platform,
                &self.shared,
                &mut self.registry,
                &self.config,
                self.persist.values(),
                &mut self.boot_state,
            );
            let outcome = self.boot.tick(&mut ctx);
            (outcome, ctx.entered)
        };

        for step in entered {
            sink.emit(&SysEvent::InitStep(step));
        }

        match outcome {
            Some(BootOutcome::Succeeded) => self.set_mode(OperationalMode::Run, sink),
            Some(BootOutcome::Failed) => {
                let msg = self.boot_state.failure.clone().unwrap_or_default();
                sink.emit(&SysEvent::BootFailed(msg));
                self.set_mode(OperationalMode::Error, sink);
            }
            None => {}
        }
    }

    // ── Run ───────────────────────────────────────────────────

    fn run_tick(&mut self, sink: &mut impl EventSink) {
        // 1. Out-of-band notification (latest value only)
        if let Some(signal) = self.shared.take_notify(self.config.notify_wait()) {
            self.handle_notify(signal, sink);
        }

        // 2. One command from the mailbox
        if let Some(req) = self.shared.receive_command(self.config.command_wait()) {
            self.handle_command(req, sink);
        }

        // 3. Pending save; both flags are cleared before saving
        if self.shared.take_save_request() {
            self.persist.request_save();
        }
        if self.persist.take_pending_save() {
            match self.persist.save() {
                Ok(()) => sink.emit(&SysEvent::ConfigSaved(*self.persist.values())),
                Err(e) => {
                    warn!("SYS: config save failed: {}", e);
                    sink.emit(&SysEvent::ConfigSaveFailed);
                }
            }
        }

        // 4. At most one diagnostic
        if let Some(kind) = self.shared.diag_flags().take_next() {
            self.diagnostics.run(kind, self.iterations);
            sink.emit(&SysEvent::Diagnostic(kind));
        }
    }

    fn handle_notify(&mut self, signal: SysNotify, sink: &mut impl EventSink) {
        match signal {
            SysNotify::WifiConnected => {
                info!("NET: connected");
                self.network_up = true;
            }
            SysNotify::WifiDisconnecting => {
                info!("NET: disconnecting");
                self.network_up = false;
            }
            SysNotify::WifiDisconnected => {
                info!("NET: disconnected");
                self.network_up = false;
            }
            SysNotify::WifiShutdown => {
                warn!("NET: shutdown");
                self.network_up = false;
            }
        }
        let delivered = self.registry.broadcast(SubsystemCommand::Network(signal));
        debug!("NET: {:?} forwarded to {} subsystem(s)", signal, delivered);
        sink.emit(&SysEvent::Network(signal));
    }

    fn handle_command(&mut self, req: CommandRequest, sink: &mut impl EventSink) {
        let CommandRequest { command, payload } = req;
        if let Some(p) = &payload {
            debug!("CMD: {:?} payload={:?}", command, p.as_str());
        }

        match command {
            SysCommand::None => debug!("CMD: none"),
            SysCommand::SaveConfig => self.persist.request_save(),
            SysCommand::GetConfig => {
                let payload = serde_json::to_value(self.persist.values()).ok();
                self.shared.post_response(CommandResponse {
                    command: command.tag(),
                    payload,
                });
            }
            SysCommand::RunDiagnostic(kind) => self.shared.diag_flags().request(kind),
            SysCommand::Unknown(tag) => {
                warn!("CMD: unknown command tag {} ignored", tag);
            }
        }
        sink.emit(&SysEvent::Command(command));
    }
}

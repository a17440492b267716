//! System coordinator firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspPlatform        NvsStore            SystemDiagnostics      │
//! │  (netif, event loop (PersistenceStore)  (DiagnosticsPort)      │
//! │   indication, wifi)                     LogEventSink           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │          System (bring-up FSM · run-loop dispatch)     │    │
//! │  │          ConfigManager (ratchet · commit/rollback)     │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use log::{info, warn};

use syscoord::adapters::log_sink::LogEventSink;
use syscoord::adapters::nvs::NvsStore;
use syscoord::adapters::platform::{EspPlatform, SubsystemStacks};
use syscoord::app::service::System;
use syscoord::config::SystemConfig;
use syscoord::diagnostics::SystemDiagnostics;
use syscoord::drivers::task_pin::{Core, TaskSpec, spawn_on_core};
use syscoord::persist::ConfigManager;
use syscoord::store::StoreLock;

const RUN_PRIORITY: u8 = 5;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    let config = SystemConfig::default();
    info!("╔══════════════════════════════════════╗");
    info!("║  syscoord v{}                      ║", config.version);
    info!("╚══════════════════════════════════════╝");

    if let Err(e) = config.validate() {
        anyhow::bail!("invalid system config: {e}");
    }

    // ── 2. Persisted tunables ─────────────────────────────────
    let store = NvsStore::new().context("NVS flash init")?;
    let mut manager = ConfigManager::new(StoreLock::new(store), config.save_delay_secs);
    match manager.restore() {
        Ok(()) => info!("Boot #{}", manager.record_boot()),
        // Saves stay blocked, so the stored values survive this boot.
        Err(e) => warn!("Config restore failed ({}), running with defaults", e),
    }

    let values = *manager.values();

    // ── 3. Coordinator ────────────────────────────────────────
    let platform = EspPlatform::new(SubsystemStacks::from_persisted(&values));
    let mut system = System::new(config, platform, manager, SystemDiagnostics::new());

    let spec = TaskSpec {
        core: Core::App,
        priority: RUN_PRIORITY,
        stack_kb: values.run_stack_size_k as usize,
        name: "sys-run\0",
    };
    let dispatcher = spawn_on_core(spec, move || {
        let mut sink = LogEventSink::new();
        system.run(&mut sink)
    })
    .context("spawn dispatcher thread")?;

    // The dispatcher never returns.
    if dispatcher.join().is_err() {
        anyhow::bail!("dispatcher thread panicked");
    }
    Ok(())
}

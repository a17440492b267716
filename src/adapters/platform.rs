//! Platform bring-up adapter.
//!
//! Implements [`Platform`]: the TCP/IP stack and default event loop via
//! ESP-IDF, plus the indication and WiFi subsystems.  Each subsystem runs
//! on its own pinned thread, builds its command queue there and publishes
//! its handles through a [`ReadySignal`].
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_netif_init()` and
//!   `esp_event_loop_create_default()`; task handles are FreeRTOS handles.
//! - **all other targets**: both calls succeed immediately; task handles
//!   come from a process-wide counter.

use std::sync::Arc;
use std::thread::JoinHandle;

use futures_lite::future;
use log::{info, warn};

use crate::app::commands::SubsystemCommand;
use crate::app::ports::{GeneralTimerSpec, Platform};
use crate::config::{FirmwareVersion, PersistedValues};
use crate::diagnostics::DiagFlags;
use crate::drivers::gen_timer;
use crate::drivers::task_pin::{Core, TaskSpec, spawn_on_core};
use crate::error::PlatformError;
use crate::registry::{ReadySignal, Subsystem, SubsystemHandle, SubsystemQueue, TaskHandle};

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Stack for the WiFi service thread, in KiB.
const WIFI_STACK_KB: usize = 4;
const INDICATION_PRIORITY: u8 = 4;
const WIFI_PRIORITY: u8 = 6;

#[cfg(target_os = "espidf")]
fn current_task() -> TaskHandle {
    // SAFETY: returns the calling task's handle; never null inside a task.
    TaskHandle(unsafe { xTaskGetCurrentTaskHandle() } as usize)
}

#[cfg(not(target_os = "espidf"))]
fn current_task() -> TaskHandle {
    use core::sync::atomic::{AtomicUsize, Ordering};
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    TaskHandle(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Spawn a subsystem service thread.  The thread publishes its handles
/// as its first action, then serves its command queue forever.
fn spawn_subsystem(which: Subsystem, spec: TaskSpec, banner: Option<FirmwareVersion>) -> Option<(ReadySignal, JoinHandle<()>)> {
    let signal = ReadySignal::new();
    let publisher = signal.clone();

    let spawned = spawn_on_core(spec, move || {
        if let Some(version) = banner {
            info!("{:?}: firmware v{}", which, version);
        }
        let queue = Arc::new(SubsystemQueue::new());
        publisher.publish(SubsystemHandle::new(current_task(), queue.clone()));

        loop {
            match future::block_on(queue.receive()) {
                SubsystemCommand::Network(signal) => info!("{:?}: network {:?}", which, signal),
            }
        }
    });

    match spawned {
        Ok(handle) => Some((signal, handle)),
        Err(e) => {
            warn!("{:?}: construction failed: {}", which, e);
            None
        }
    }
}

/// Stack sizes handed to the subsystem threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemStacks {
    pub indication_kb: usize,
    pub wifi_kb: usize,
}

impl SubsystemStacks {
    /// Indication drives the status GPIOs, so it takes the GPIO tunable.
    pub fn from_persisted(values: &PersistedValues) -> Self {
        Self {
            indication_kb: values.gpio_stack_size_k as usize,
            wifi_kb: WIFI_STACK_KB,
        }
    }
}

/// ESP-IDF backed [`Platform`].
pub struct EspPlatform {
    stacks: SubsystemStacks,
    tasks: Vec<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl EspPlatform {
    pub fn new(stacks: SubsystemStacks) -> Self {
        Self {
            stacks,
            tasks: Vec::new(),
            timer: None,
        }
    }

    /// Number of subsystem threads started.
    pub fn subsystem_threads(&self) -> usize {
        self.tasks.len()
    }

    pub fn timer_running(&self) -> bool {
        self.timer.is_some()
    }

    fn construct(&mut self, which: Subsystem, spec: TaskSpec, banner: Option<FirmwareVersion>) -> Option<ReadySignal> {
        let (signal, handle) = spawn_subsystem(which, spec, banner)?;
        self.tasks.push(handle);
        Some(signal)
    }
}

impl Platform for EspPlatform {
    fn init_network(&mut self) -> Result<(), PlatformError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from the coordinator thread during boot.
            let ret = unsafe { esp_netif_init() };
            if ret != ESP_OK {
                return Err(PlatformError::from_esp(ret));
            }
        }
        info!("platform: network interface layer up");
        Ok(())
    }

    fn create_event_loop(&mut self) -> Result<(), PlatformError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: as above.
            let ret = unsafe { esp_event_loop_create_default() };
            if ret != ESP_OK {
                return Err(PlatformError::from_esp(ret));
            }
        }
        info!("platform: default event loop created");
        Ok(())
    }

    fn create_indication(&mut self, version: FirmwareVersion) -> Option<ReadySignal> {
        let spec = TaskSpec {
            core: Core::App,
            priority: INDICATION_PRIORITY,
            stack_kb: self.stacks.indication_kb,
            name: "indication\0",
        };
        self.construct(Subsystem::Indication, spec, Some(version))
    }

    fn create_wifi(&mut self) -> Option<ReadySignal> {
        let spec = TaskSpec {
            core: Core::Pro,
            priority: WIFI_PRIORITY,
            stack_kb: self.stacks.wifi_kb,
            name: "wifi\0",
        };
        self.construct(Subsystem::Wifi, spec, None)
    }

    fn start_general_timer(&mut self, spec: GeneralTimerSpec, diag: Arc<DiagFlags>) {
        if self.timer.is_some() {
            warn!("platform: general timer already running");
            return;
        }
        self.timer = gen_timer::start(spec, diag);
    }
}

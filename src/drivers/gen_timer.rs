//! General-purpose background timer service.
//!
//! Started once bring-up finishes.  Runs on its own pinned thread (stack
//! from the persisted `timerStackSizeK`) and periodically requests a heap
//! integrity check from the dispatcher.  The dispatcher does the actual
//! work, one diagnostic per iteration.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use super::task_pin::{Core, TaskSpec, spawn_on_core};
use crate::app::ports::GeneralTimerSpec;
use crate::diagnostics::{DiagFlags, DiagRequest};

const TIMER_PRIORITY: u8 = 3;

/// Start the timer thread.  Returns `None` when the interval is zero or
/// the thread could not be created.
pub fn start(spec: GeneralTimerSpec, diag: Arc<DiagFlags>) -> Option<JoinHandle<()>> {
    if spec.interval_secs == 0 {
        info!("gen_timer: periodic diagnostics disabled");
        return None;
    }

    let period = Duration::from_secs(spec.interval_secs as u64);
    let task = TaskSpec {
        core: Core::App,
        priority: TIMER_PRIORITY,
        stack_kb: spec.stack_kb,
        name: "gen-timer\0",
    };

    match spawn_on_core(task, move || {
        loop {
            std::thread::sleep(period);
            diag.request(DiagRequest::HeapCheck);
        }
    }) {
        Ok(handle) => {
            info!("gen_timer: heap check every {}s", spec.interval_secs);
            Some(handle)
        }
        Err(e) => {
            warn!("gen_timer: spawn failed: {}, continuing without periodic checks", e);
            None
        }
    }
}

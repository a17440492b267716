//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing coordinator events to the ESP-IDF
//! logger (UART / USB-CDC in production), one tagged line per event.

use log::{error, info, warn};

use crate::app::events::SysEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`SysEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &SysEvent) {
        match event {
            SysEvent::Started(mode) => {
                info!("START | mode={:?}", mode);
            }
            SysEvent::InitStep(step) => {
                info!("BOOT  | step {:?} ({})", step, *step as u8);
            }
            SysEvent::ModeChanged { from, to } => {
                info!("MODE  | {:?} -> {:?}", from, to);
            }
            SysEvent::BootFailed(msg) => {
                error!("BOOT  | failed: {}", msg);
            }
            SysEvent::Network(signal) => {
                info!("NET   | {:?}", signal);
            }
            SysEvent::Command(cmd) => {
                info!("CMD   | {:?} (tag {})", cmd, cmd.tag());
            }
            SysEvent::ConfigSaved(v) => {
                info!(
                    "CFG   | saved run={}K gpio={}K timer={}K boots={}",
                    v.run_stack_size_k, v.gpio_stack_size_k, v.timer_stack_size_k, v.boot_count
                );
            }
            SysEvent::ConfigSaveFailed => {
                warn!("CFG   | save failed, rolled back");
            }
            SysEvent::Diagnostic(kind) => {
                info!("DIAG  | ran {:?}", kind);
            }
        }
    }
}

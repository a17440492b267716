//! Cross-thread channels between the dispatcher and the rest of the
//! firmware.
//!
//! ```text
//! ┌──────────────┐  SysNotify (latest wins)  ┌──────────────┐
//! │  WiFi / ISR  │─────────────────────────▶│              │
//! └──────────────┘                           │              │
//! ┌──────────────┐  CommandRequest (depth 1) │  Dispatcher  │
//! │ any thread   │─────────────────────────▶│   (System)   │
//! │ SystemHandle │◀─────────────────────────│              │
//! └──────────────┘  CommandResponse (depth 1)└──────────────┘
//! ```
//!
//! Everything the dispatcher shares with other threads lives in
//! [`SystemShared`]; the dispatcher itself owns the rest of its state.
//! Other threads hold a cloneable [`SystemHandle`].

use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::warn;

use crate::app::commands::{CommandRequest, CommandResponse, SysNotify};
use crate::diagnostics::{DiagFlags, DiagRequest};
use crate::error::SubmitError;

/// Single outstanding request, single outstanding reply.
pub const MAILBOX_DEPTH: usize = 1;

/// Run `fut` for at most `timeout` on the current thread.
///
/// Returns `None` if the timer fires first.  A future that is already
/// ready wins even with a zero timeout.
pub fn wait_bounded<T>(fut: impl Future<Output = T>, timeout: Duration) -> Option<T> {
    future::block_on(future::or(async { Some(fut.await) }, async {
        async_io_mini::Timer::after(timeout).await;
        None
    }))
}

/// State shared between the dispatcher and every [`SystemHandle`].
pub struct SystemShared {
    notify: Signal<CriticalSectionRawMutex, SysNotify>,
    commands: Channel<CriticalSectionRawMutex, CommandRequest, MAILBOX_DEPTH>,
    responses: Channel<CriticalSectionRawMutex, CommandResponse, MAILBOX_DEPTH>,
    mailbox_open: AtomicBool,
    save_requested: AtomicBool,
    diag: Arc<DiagFlags>,
}

impl Default for SystemShared {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemShared {
    pub fn new() -> Self {
        Self {
            notify: Signal::new(),
            commands: Channel::new(),
            responses: Channel::new(),
            mailbox_open: AtomicBool::new(false),
            save_requested: AtomicBool::new(false),
            diag: Arc::new(DiagFlags::new()),
        }
    }

    /// Start accepting commands.  Submissions before this fail with
    /// [`SubmitError::NotReady`].
    pub(crate) fn open_mailbox(&self) {
        self.mailbox_open.store(true, Ordering::Release);
    }

    pub fn is_mailbox_open(&self) -> bool {
        self.mailbox_open.load(Ordering::Acquire)
    }

    pub fn diag_flags(&self) -> &Arc<DiagFlags> {
        &self.diag
    }

    /// Take the latest notification, waiting at most `wait`.
    pub(crate) fn take_notify(&self, wait: Duration) -> Option<SysNotify> {
        if let Some(n) = self.notify.try_take() {
            return Some(n);
        }
        wait_bounded(self.notify.wait(), wait)
    }

    /// Receive the next command, waiting at most `wait`.
    pub(crate) fn receive_command(&self, wait: Duration) -> Option<CommandRequest> {
        if let Ok(req) = self.commands.try_receive() {
            return Some(req);
        }
        wait_bounded(self.commands.receive(), wait)
    }

    /// Place a reply in the response mailbox.  An uncollected earlier
    /// reply is discarded.
    pub(crate) fn post_response(&self, resp: CommandResponse) {
        if let Err(embassy_sync::channel::TrySendError::Full(resp)) = self.responses.try_send(resp)
        {
            if let Ok(stale) = self.responses.try_receive() {
                warn!("CMD: discarding uncollected response for tag {}", stale.command);
            }
            let _ = self.responses.try_send(resp);
        }
    }

    /// Clear and return the externally requested save flag.
    pub(crate) fn take_save_request(&self) -> bool {
        self.save_requested.swap(false, Ordering::AcqRel)
    }
}

// ---------------------------------------------------------------------------
// Producer-side handle
// ---------------------------------------------------------------------------

/// Cloneable producer handle for posting to a running dispatcher.
#[derive(Clone)]
pub struct SystemHandle {
    shared: Arc<SystemShared>,
}

impl SystemHandle {
    pub fn new(shared: Arc<SystemShared>) -> Self {
        Self { shared }
    }

    /// Post a notification.  Overwrites any notification not yet taken.
    pub fn notify(&self, signal: SysNotify) {
        self.shared.notify.signal(signal);
    }

    /// Post a raw notification code from a C callback.  Unknown codes are
    /// dropped.
    pub fn notify_raw(&self, raw: u8) -> bool {
        match SysNotify::from_u8(raw) {
            Some(n) => {
                self.notify(n);
                true
            }
            None => {
                warn!("NET: ignoring unknown notification code {}", raw);
                false
            }
        }
    }

    /// Submit a command without waiting.
    pub fn try_submit(&self, req: CommandRequest) -> Result<(), SubmitError> {
        if !self.shared.is_mailbox_open() {
            return Err(SubmitError::NotReady);
        }
        self.shared
            .commands
            .try_send(req)
            .map_err(|_| SubmitError::Full)
    }

    /// Submit a command, waiting at most `timeout` for the slot to free.
    pub fn submit(&self, req: CommandRequest, timeout: Duration) -> Result<(), SubmitError> {
        if !self.shared.is_mailbox_open() {
            return Err(SubmitError::NotReady);
        }
        wait_bounded(self.shared.commands.send(req), timeout).ok_or(SubmitError::Timeout)
    }

    /// Collect the reply to an earlier command, waiting at most `timeout`.
    pub fn response(&self, timeout: Duration) -> Option<CommandResponse> {
        if let Ok(resp) = self.shared.responses.try_receive() {
            return Some(resp);
        }
        wait_bounded(self.shared.responses.receive(), timeout)
    }

    /// Ask the dispatcher to persist the current values on its next
    /// iteration.
    pub fn request_save(&self) {
        self.shared.save_requested.store(true, Ordering::Release);
    }

    pub fn request_diagnostic(&self, kind: DiagRequest) {
        self.shared.diag.request(kind);
    }
}

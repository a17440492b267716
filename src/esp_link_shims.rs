//! `critical-section` provider for the ESP-IDF std runtime.
//!
//! embassy-sync's `CriticalSectionRawMutex` needs an implementation of the
//! `critical-section` 1.x ABI.  This one is a process-wide re-entrant
//! mutex: the outermost acquire on a thread takes the lock, nested
//! acquires only bump the depth.

use core::cell::{Cell, RefCell};
use std::sync::{Mutex, MutexGuard, PoisonError};

static CRITICAL_SECTION_MUTEX: Mutex<()> = Mutex::new(());

thread_local! {
    static DEPTH: Cell<u8> = const { Cell::new(0) };
    static GUARD: RefCell<Option<MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_acquire() -> u8 {
    DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            // Nothing is held across a panic inside the section.
            let lock = CRITICAL_SECTION_MUTEX
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            GUARD.with(|guard| *guard.borrow_mut() = Some(lock));
        }
        let next = d.saturating_add(1);
        depth.set(next);
        next
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn _critical_section_1_0_release(_token: u8) {
    DEPTH.with(|depth| {
        let d = depth.get();
        if d == 0 {
            return;
        }
        depth.set(d - 1);
        if d == 1 {
            GUARD.with(|guard| *guard.borrow_mut() = None);
        }
    })
}

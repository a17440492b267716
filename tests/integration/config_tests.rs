//! Integration tests for `ConfigManager` against a fault-injecting store.

use syscoord::app::ports::{ConfigError, StorageError};
use syscoord::config::{ConfigKey, PersistedValues};

use super::mocks::{Cell, MockStore, manager};

fn closes(m: &syscoord::persist::ConfigManager<MockStore>) -> Vec<bool> {
    m.store().with(|s| s.closes.clone())
}

// ── restore ───────────────────────────────────────────────────

#[test]
fn first_restore_seeds_every_key() {
    let mut m = manager(MockStore::new());
    m.restore().unwrap();

    assert_eq!(*m.values(), PersistedValues::default());
    assert!(!m.pending().is_pending());
    m.store().with(|s| {
        assert_eq!(s.get("runStackSizeK"), Some(Cell::U8(5)));
        assert_eq!(s.get("gpioStackSizeK"), Some(Cell::U8(4)));
        assert_eq!(s.get("timerStackSizeK"), Some(Cell::U8(4)));
        assert_eq!(s.get("bootCount"), Some(Cell::U32(0)));
    });
    assert_eq!(closes(&m), vec![true]);
}

#[test]
fn absent_boot_count_keeps_initial_value() {
    let store = MockStore::with_cells(&[("runStackSizeK", Cell::U8(5))]);
    let mut m = manager(store);
    assert!(m.restore().is_ok());
    assert_eq!(m.values().boot_count, 0);
}

#[test]
fn stored_boot_count_is_adopted() {
    let mut m = manager(MockStore::with_cells(&[("bootCount", Cell::U32(41))]));
    m.restore().unwrap();
    assert_eq!(m.values().boot_count, 41);
    assert_eq!(m.record_boot(), 42);
}

#[test]
fn ratchet_adopts_only_larger_values() {
    let mut m = manager(MockStore::with_cells(&[
        ("runStackSizeK", Cell::U8(3)),
        ("gpioStackSizeK", Cell::U8(4)),
        ("timerStackSizeK", Cell::U8(12)),
    ]));
    m.restore().unwrap();

    assert_eq!(m.values().run_stack_size_k, 5, "smaller value ignored");
    assert_eq!(m.values().gpio_stack_size_k, 4, "equal value kept");
    assert_eq!(m.values().timer_stack_size_k, 12, "larger value adopted");
    assert!(m.pending().is_pending());
    assert_eq!(m.pending().delay_secs(), 2);
}

#[test]
fn open_failure_leaves_values_untouched() {
    let mut store = MockStore::with_cells(&[("runStackSizeK", Cell::U8(30))]);
    store.fail_open = true;
    let mut m = manager(store);

    assert_eq!(m.restore(), Err(ConfigError::Open(StorageError::OpenFailed)));
    assert_eq!(*m.values(), PersistedValues::default());
    assert_eq!(m.save(), Err(ConfigError::Open(StorageError::OpenFailed)));
    assert!(closes(&m).is_empty(), "nothing to close after a failed open");
}

#[test]
fn read_error_aborts_and_discards() {
    let mut store = MockStore::with_cells(&[("runStackSizeK", Cell::U8(9))]);
    store.fail_read = Some("gpioStackSizeK");
    let mut m = manager(store);

    assert_eq!(
        m.restore(),
        Err(ConfigError::Read("gpioStackSizeK", StorageError::IoError))
    );
    assert_eq!(m.values().run_stack_size_k, 5, "partial results are not applied");
    assert_eq!(closes(&m), vec![false]);
    assert_eq!(m.store().with(|s| s.get("timerStackSizeK")), None);
}

#[test]
fn width_mismatch_aborts_restore() {
    let mut m = manager(MockStore::with_cells(&[("bootCount", Cell::U8(1))]));
    assert_eq!(
        m.restore(),
        Err(ConfigError::Read("bootCount", StorageError::TypeMismatch))
    );
    assert_eq!(closes(&m), vec![false]);
}

#[test]
fn failed_restore_never_overwrites_stored_values() {
    let store = MockStore::with_cells(&[
        ("runStackSizeK", Cell::U8(9)),
        ("bootCount", Cell::U32(500)),
        ("timerStackSizeK", Cell::U32(7)),
    ]);
    let mut m = manager(store);

    let err = m.restore().unwrap_err();
    assert_eq!(err, ConfigError::Read("timerStackSizeK", StorageError::TypeMismatch));

    // Boot bookkeeping still runs, but nothing is scheduled.
    assert_eq!(m.record_boot(), 1);
    m.request_save();
    assert!(!m.raise_stack_size(ConfigKey::RunStackSizeK, 3));
    assert!(m.raise_stack_size(ConfigKey::GpioStackSizeK, 6));
    assert!(!m.pending().is_pending());
    assert!(!m.take_pending_save());

    m.store().with(|s| {
        assert_eq!(s.get("runStackSizeK"), Some(Cell::U8(9)));
        assert_eq!(s.get("bootCount"), Some(Cell::U32(500)));
        assert_eq!(s.get("timerStackSizeK"), Some(Cell::U32(7)));
        assert_eq!(s.get("gpioStackSizeK"), None);
    });
    assert_eq!(closes(&m), vec![false]);
}

#[test]
fn successful_restore_after_failure_reenables_saves() {
    let mut m = manager(MockStore::with_cells(&[("bootCount", Cell::U32(500))]));
    m.store().with(|s| s.fail_read = Some("bootCount"));
    assert!(m.restore().is_err());
    m.record_boot();
    assert!(!m.take_pending_save());

    m.store().with(|s| s.fail_read = None);
    m.restore().unwrap();
    assert_eq!(m.values().boot_count, 500);
    assert_eq!(m.record_boot(), 501);
    assert!(m.take_pending_save());
    m.save().unwrap();
    assert_eq!(m.store().with(|s| s.get("bootCount")), Some(Cell::U32(501)));
}

#[test]
fn commit_failure_is_reported() {
    let mut store = MockStore::with_cells(&[("runStackSizeK", Cell::U8(9))]);
    store.fail_commit = true;
    let mut m = manager(store);

    assert_eq!(m.restore(), Err(ConfigError::Commit(StorageError::IoError)));
    assert_eq!(m.values().run_stack_size_k, 5);
}

// ── save ──────────────────────────────────────────────────────

#[test]
fn save_writes_all_values_and_commits() {
    let mut m = manager(MockStore::new());
    assert!(m.raise_stack_size(ConfigKey::RunStackSizeK, 8));
    m.record_boot();
    m.save().unwrap();

    m.store().with(|s| {
        assert_eq!(s.get("runStackSizeK"), Some(Cell::U8(8)));
        assert_eq!(s.get("bootCount"), Some(Cell::U32(1)));
        assert_eq!(s.closes, vec![true]);
    });
}

#[test]
fn write_failure_mid_save_discards() {
    let mut store = MockStore::new();
    store.fail_write_at = Some(2);
    let mut m = manager(store);

    assert_eq!(
        m.save(),
        Err(ConfigError::Write("timerStackSizeK", StorageError::IoError))
    );
    assert_eq!(closes(&m), vec![false]);
    assert!(m.store().with(|s| s.cells.is_empty()));
}

#[test]
fn save_is_idempotent() {
    let m = manager(MockStore::new());
    m.save().unwrap();
    let first = m.store().with(|s| s.cells.clone());
    m.save().unwrap();
    assert_eq!(m.store().with(|s| s.cells.clone()), first);
}

#[test]
fn restore_save_restore_round_trip() {
    let mut m = manager(MockStore::with_cells(&[
        ("gpioStackSizeK", Cell::U8(7)),
        ("bootCount", Cell::U32(3)),
    ]));
    m.restore().unwrap();
    let restored = *m.values();
    m.save().unwrap();
    m.restore().unwrap();
    assert_eq!(*m.values(), restored);
}

#[test]
fn lowering_a_tunable_is_refused() {
    let mut m = manager(MockStore::new());
    assert!(!m.raise_stack_size(ConfigKey::RunStackSizeK, 1));
    assert!(!m.raise_stack_size(ConfigKey::BootCount, 200));
    assert_eq!(*m.values(), PersistedValues::default());
    assert!(!m.pending().is_pending());
}

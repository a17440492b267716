//! Integration tests for the System → bring-up → dispatcher pipeline.
//!
//! Everything runs on the host against the mocks in `mocks.rs`.

use std::time::Duration;

use syscoord::app::commands::{CommandRequest, SubsystemCommand, SysCommand, SysNotify};
use syscoord::app::events::SysEvent;
use syscoord::app::service::{OperationalMode, System};
use syscoord::diagnostics::DiagRequest;
use syscoord::error::{PlatformError, SubmitError};
use syscoord::fsm::InitStep;
use syscoord::registry::Subsystem;

use syscoord::fsm::context::FAILURE_MSG_CAP;

use super::mocks::{
    Cell, MockDiagnostics, MockPlatform, MockStore, RecordingSink, boot, fast_config, make_system, manager,
};

const NO_MEM: PlatformError = PlatformError::new(0x101, "ESP_ERR_NO_MEM");

// ── Bring-up ──────────────────────────────────────────────────

#[test]
fn boot_reaches_run_with_registry_populated() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    assert_eq!(system.mode(), OperationalMode::Init);

    boot(&mut system, &mut sink);

    assert_eq!(system.mode(), OperationalMode::Run);
    assert!(system.registry().is_ready(Subsystem::Indication));
    assert!(system.registry().is_ready(Subsystem::Wifi));
    assert_eq!(system.platform().created, vec![Subsystem::Indication, Subsystem::Wifi]);
    assert_eq!(system.platform().versions, vec![system.config().version]);
    assert_eq!(sink.modes(), vec![OperationalMode::Run]);
}

#[test]
fn boot_steps_are_reported_in_order() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    let steps: Vec<InitStep> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            SysEvent::InitStep(s) => Some(*s),
            _ => None,
        })
        .collect();
    assert_eq!(
        steps,
        vec![
            InitStep::InitQueuesCommands,
            InitStep::StartNetworkInterface,
            InitStep::CreateDefaultEventLoop,
            InitStep::CreateIndication,
            InitStep::WaitOnIndication,
            InitStep::CreateWifi,
            InitStep::WaitOnWifi,
            InitStep::Finished,
        ]
    );
}

#[test]
fn finished_starts_timer_with_persisted_stack() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    let timer = system.platform().timer.expect("timer not started");
    let expected = system.config_manager().values().timer_stack_size_k as usize;
    assert_eq!(timer.stack_kb, expected);
    assert_eq!(timer.interval_secs, system.config().diag_interval_secs);
}

#[test]
fn network_failure_ends_idle_silent_never_run() {
    let mut platform = MockPlatform::new();
    platform.network = Err(NO_MEM);
    let (mut system, mut sink) = make_system(platform);

    for _ in 0..10 {
        system.run_once(&mut sink);
    }

    assert_eq!(
        sink.modes(),
        vec![OperationalMode::Error, OperationalMode::Idle, OperationalMode::IdleSilent]
    );
    assert_eq!(system.mode(), OperationalMode::IdleSilent);
    assert!(system.failure_message().unwrap().contains("ESP_ERR_NO_MEM"));
    let reported = sink
        .events
        .iter()
        .find_map(|e| match e {
            SysEvent::BootFailed(msg) => Some(msg.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(reported.capacity(), FAILURE_MSG_CAP);
    assert_eq!(Some(reported.as_str()), system.failure_message());
    assert_eq!(sink.count(|e| matches!(e, SysEvent::BootFailed(_))), 1);
    assert!(system.platform().created.is_empty(), "nothing after the failed step runs");
}

#[test]
fn event_loop_failure_is_reported() {
    let mut platform = MockPlatform::new();
    platform.event_loop = Err(NO_MEM);
    let (mut system, mut sink) = make_system(platform);

    for _ in 0..10 {
        system.run_once(&mut sink);
    }

    assert!(!sink.modes().contains(&OperationalMode::Run));
    let msg = system.failure_message().unwrap();
    assert!(msg.starts_with("Create_Default_Event_Loop"), "got {msg}");
}

#[test]
fn idle_silent_is_quiet() {
    let mut platform = MockPlatform::new();
    platform.network = Err(NO_MEM);
    let (mut system, mut sink) = make_system(platform);
    for _ in 0..5 {
        system.run_once(&mut sink);
    }
    assert_eq!(system.mode(), OperationalMode::IdleSilent);

    sink.clear();
    for _ in 0..5 {
        system.run_once(&mut sink);
    }
    assert!(sink.events.is_empty());
    assert_eq!(system.mode(), OperationalMode::IdleSilent);
}

#[test]
fn unpublished_handshake_holds_boot_without_rebuilding() {
    let (mut system, mut sink) = make_system(MockPlatform::deferred());

    for _ in 0..10 {
        system.run_once(&mut sink);
    }
    assert_eq!(system.mode(), OperationalMode::Init);
    assert_eq!(system.boot_step(), InitStep::WaitOnIndication);
    assert_eq!(system.platform().created, vec![Subsystem::Indication]);

    system.platform_mut().publish_pending();
    system.run_once(&mut sink);
    assert_eq!(system.boot_step(), InitStep::CreateWifi);
    system.run_once(&mut sink);
    assert_eq!(system.boot_step(), InitStep::WaitOnWifi);

    system.platform_mut().publish_pending();
    boot(&mut system, &mut sink);
    assert_eq!(system.mode(), OperationalMode::Run);
    assert_eq!(system.platform().created.len(), 2);
}

#[test]
fn refused_construction_is_retried() {
    let mut platform = MockPlatform::new();
    platform.refuse_construction = true;
    let (mut system, mut sink) = make_system(platform);

    for _ in 0..8 {
        system.run_once(&mut sink);
    }
    assert_eq!(system.boot_step(), InitStep::CreateIndication);

    system.platform_mut().refuse_construction = false;
    boot(&mut system, &mut sink);
    assert_eq!(system.mode(), OperationalMode::Run);
}

// ── Mailbox and notifications ─────────────────────────────────

#[test]
fn submit_before_queues_exist_is_rejected() {
    let (system, _sink) = make_system(MockPlatform::new());
    let handle = system.handle();
    assert_eq!(
        handle.try_submit(CommandRequest::new(SysCommand::GetConfig)),
        Err(SubmitError::NotReady)
    );
}

#[test]
fn latest_notification_wins() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    sink.clear();

    let handle = system.handle();
    handle.notify(SysNotify::WifiConnected);
    handle.notify(SysNotify::WifiDisconnected);
    system.run_once(&mut sink);

    let seen: Vec<_> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            SysEvent::Network(n) => Some(*n),
            _ => None,
        })
        .collect();
    assert_eq!(seen, vec![SysNotify::WifiDisconnected]);
    assert!(!system.network_up());

    system.run_once(&mut sink);
    assert_eq!(sink.count(|e| matches!(e, SysEvent::Network(_))), 1);
}

#[test]
fn notifications_reach_every_subsystem() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    system.handle().notify(SysNotify::WifiConnected);
    system.run_once(&mut sink);
    assert!(system.network_up());

    for which in Subsystem::ALL {
        let queue = system.platform().queue(which).unwrap();
        assert_eq!(
            queue.try_receive().ok(),
            Some(SubsystemCommand::Network(SysNotify::WifiConnected))
        );
        assert!(queue.try_receive().is_err());
    }
}

#[test]
fn get_config_replies_with_values() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    let handle = system.handle();

    handle
        .try_submit(CommandRequest::new(SysCommand::GetConfig))
        .unwrap();
    system.run_once(&mut sink);

    let resp = handle.response(Duration::from_millis(50)).expect("no response");
    assert_eq!(resp.command, SysCommand::GetConfig.tag());
    let payload = resp.payload.unwrap();
    assert_eq!(payload["run_stack_size_k"], 5_u64);
    assert_eq!(payload["boot_count"], 0_u64);
}

#[test]
fn unknown_command_is_ignored() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    let handle = system.handle();

    handle
        .try_submit(CommandRequest::with_payload(SysCommand::from(99), "ignored"))
        .unwrap();
    system.run_once(&mut sink);

    assert!(sink.events.contains(&SysEvent::Command(SysCommand::Unknown(99))));
    assert!(handle.response(Duration::from_millis(5)).is_none());
    assert_eq!(system.mode(), OperationalMode::Run);
}

#[test]
fn one_command_per_iteration() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    let handle = system.handle();

    handle.try_submit(CommandRequest::new(SysCommand::None)).unwrap();
    assert_eq!(
        handle.try_submit(CommandRequest::new(SysCommand::None)),
        Err(SubmitError::Full)
    );
    system.run_once(&mut sink);
    assert!(handle.try_submit(CommandRequest::new(SysCommand::None)).is_ok());
}

#[test]
fn blocking_submit_from_another_thread() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    let handle = system.handle();

    let client = std::thread::spawn(move || {
        handle.submit(CommandRequest::new(SysCommand::GetConfig), Duration::from_secs(2))?;
        handle.response(Duration::from_secs(2)).ok_or(SubmitError::Timeout)
    });

    for _ in 0..500 {
        if client.is_finished() {
            break;
        }
        system.run_once(&mut sink);
    }
    let resp = client.join().unwrap().expect("client got no reply");
    assert_eq!(resp.command, 2);
}

// ── Saves ─────────────────────────────────────────────────────

#[test]
fn save_command_persists_values() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    system
        .handle()
        .try_submit(CommandRequest::new(SysCommand::SaveConfig))
        .unwrap();
    system.run_once(&mut sink);

    assert_eq!(sink.count(|e| matches!(e, SysEvent::ConfigSaved(_))), 1);
    let (closes, boot_count) = system
        .config_manager()
        .store()
        .with(|s| (s.closes.clone(), s.get("bootCount")));
    assert_eq!(closes.last(), Some(&true));
    assert!(boot_count.is_some());
}

#[test]
fn save_request_is_served_once() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    system.handle().request_save();
    system.run_once(&mut sink);
    system.run_once(&mut sink);

    assert_eq!(sink.count(|e| matches!(e, SysEvent::ConfigSaved(_))), 1);
}

#[test]
fn raised_tunable_is_saved_next_iteration() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    let key = syscoord::config::ConfigKey::GpioStackSizeK;
    assert!(system.config_manager_mut().raise_stack_size(key, 9));
    system.run_once(&mut sink);

    let stored = system.config_manager().store().with(|s| s.get(key.name()));
    assert_eq!(stored, Some(super::mocks::Cell::U8(9)));
}

#[test]
fn failed_save_rolls_back_and_keeps_running() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    system
        .config_manager()
        .store()
        .with(|s| s.fail_write_at = Some(1));

    system.handle().request_save();
    system.run_once(&mut sink);

    assert_eq!(sink.count(|e| *e == SysEvent::ConfigSaveFailed), 1);
    let (closes, empty) = system
        .config_manager()
        .store()
        .with(|s| (s.closes.clone(), s.cells.is_empty()));
    assert_eq!(closes, vec![false]);
    assert!(empty);
    assert_eq!(system.mode(), OperationalMode::Run);
}

#[test]
fn boot_after_failed_restore_keeps_stored_values() {
    let store = MockStore::with_cells(&[
        ("runStackSizeK", Cell::U8(9)),
        ("bootCount", Cell::U32(500)),
        ("timerStackSizeK", Cell::U32(7)),
    ]);
    let mut persist = manager(store);
    assert!(persist.restore().is_err());
    persist.record_boot();

    let mut system = System::new(fast_config(), MockPlatform::new(), persist, MockDiagnostics::default());
    let mut sink = RecordingSink::new();
    system.start(&mut sink);
    boot(&mut system, &mut sink);
    assert_eq!(system.mode(), OperationalMode::Run);

    system.handle().request_save();
    system
        .handle()
        .try_submit(CommandRequest::new(SysCommand::SaveConfig))
        .unwrap();
    for _ in 0..3 {
        system.run_once(&mut sink);
    }

    assert_eq!(sink.count(|e| matches!(e, SysEvent::ConfigSaved(_))), 0);
    system.config_manager().store().with(|s| {
        assert_eq!(s.get("runStackSizeK"), Some(Cell::U8(9)));
        assert_eq!(s.get("bootCount"), Some(Cell::U32(500)));
        assert_eq!(s.get("timerStackSizeK"), Some(Cell::U32(7)));
        assert_eq!(s.closes, vec![false], "only the aborted restore touched the store");
    });
}

// ── Diagnostics ───────────────────────────────────────────────

#[test]
fn one_diagnostic_per_iteration_in_priority_order() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);
    let handle = system.handle();

    handle.request_diagnostic(DiagRequest::TaskInfo);
    handle.request_diagnostic(DiagRequest::HeapCheck);

    system.run_once(&mut sink);
    assert_eq!(system.diagnostics().runs, vec![DiagRequest::HeapCheck]);
    system.run_once(&mut sink);
    assert_eq!(
        system.diagnostics().runs,
        vec![DiagRequest::HeapCheck, DiagRequest::TaskInfo]
    );
    system.run_once(&mut sink);
    assert_eq!(system.diagnostics().runs.len(), 2);
}

#[test]
fn diagnostic_command_runs_same_iteration() {
    let (mut system, mut sink) = make_system(MockPlatform::new());
    boot(&mut system, &mut sink);

    system
        .handle()
        .try_submit(CommandRequest::new(SysCommand::RunDiagnostic(DiagRequest::MemoryStats)))
        .unwrap();
    system.run_once(&mut sink);

    assert_eq!(system.diagnostics().runs, vec![DiagRequest::MemoryStats]);
    assert!(sink.events.contains(&SysEvent::Diagnostic(DiagRequest::MemoryStats)));
}

#[test]
fn diagnostics_wait_for_run_mode() {
    let (mut system, mut sink) = make_system(MockPlatform::deferred());
    system.handle().request_diagnostic(DiagRequest::HeapCheck);

    for _ in 0..5 {
        system.run_once(&mut sink);
    }
    assert!(system.diagnostics().runs.is_empty());

    system.platform_mut().publish_pending();
    system.platform_mut().auto_publish = true;
    boot(&mut system, &mut sink);
    system.run_once(&mut sink);
    assert_eq!(system.diagnostics().runs, vec![DiagRequest::HeapCheck]);
}

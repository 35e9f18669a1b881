//! Retained statistics across simulated deep-sleep resets, plus the
//! commands that touch them.

use greeniot_node::app::commands::AppCommand;
use greeniot_node::app::events::AppEvent;
use greeniot_node::config::SystemConfig;
use greeniot_node::error::SensorError;
use greeniot_node::power::{PersistedStats, PlatformWake, WakeCause};

use crate::mock_hw::{Clock, Harness, MockBoard, MockSensor, MockTransport, SharedStore};

fn deep_config() -> SystemConfig {
    SystemConfig {
        measurement_interval_sec: 60,
        ..Default::default()
    }
}

/// Boot a fresh service on `store` and run it to its deep-sleep commit.
fn boot_and_sleep(store: &SharedStore, wake: PlatformWake) -> Harness {
    let board = MockBoard::new(Clock::default()).woken_by(wake);
    let mut h = Harness::with_parts(
        deep_config(),
        MockSensor::new(),
        MockTransport::provisioned(),
        board,
        store.clone(),
    );
    h.start();
    assert!(h.run_until(10_000, |h| !h.sleeps.is_empty()));
    h
}

fn boot_event(h: &Harness) -> Option<(WakeCause, PersistedStats)> {
    h.sink.events.iter().find_map(|e| match e {
        AppEvent::BootClassified { cause, stats } => Some((*cause, *stats)),
        _ => None,
    })
}

#[test]
fn first_boot_is_power_on_and_persists_on_sleep() {
    let store = SharedStore::default();
    let h = boot_and_sleep(&store, PlatformWake::Undefined);

    let (cause, stats) = boot_event(&h).unwrap();
    assert_eq!(cause, WakeCause::PowerOn);
    assert_eq!(stats.boot_count, 1);
    assert_eq!(stats.total_wakeups, 0);

    let saved = store.get().unwrap();
    assert_eq!(saved.boot_count, 1);
    assert_eq!(saved.total_sleep_time_ms, 60_000);
    // Only the time since the measurement is charged, not the idle wait.
    assert!(saved.total_active_time_ms < 1_000);
}

#[test]
fn timer_wake_counts_exactly_one_wakeup() {
    let store = SharedStore::default();
    boot_and_sleep(&store, PlatformWake::Undefined);
    let before = store.get().unwrap();

    let h = boot_and_sleep(&store, PlatformWake::Timer);
    let (cause, stats) = boot_event(&h).unwrap();
    assert_eq!(cause, WakeCause::Timer);
    assert_eq!(stats.boot_count, before.boot_count + 1);
    assert_eq!(stats.total_wakeups, before.total_wakeups + 1);

    let after = store.get().unwrap();
    assert_eq!(after.total_wakeups, 1);
    assert_eq!(after.total_sleep_time_ms, 120_000);
    assert!(after.total_active_time_ms >= before.total_active_time_ms);
    assert!(after.total_active_time_ms < before.total_active_time_ms + 1_000);
}

#[test]
fn button_wake_does_not_count_as_timer_wakeup() {
    let store = SharedStore::default();
    boot_and_sleep(&store, PlatformWake::Undefined);

    let h = boot_and_sleep(&store, PlatformWake::Ext1);
    let (cause, stats) = boot_event(&h).unwrap();
    assert_eq!(cause, WakeCause::ExternalSignal);
    assert_eq!(stats.total_wakeups, 0);
    assert_eq!(stats.boot_count, 2);
}

#[test]
fn empty_region_is_power_on_whatever_the_platform_says() {
    let store = SharedStore::default();
    let h = boot_and_sleep(&store, PlatformWake::Timer);
    let (cause, stats) = boot_event(&h).unwrap();
    assert_eq!(cause, WakeCause::PowerOn);
    assert_eq!(stats.total_wakeups, 0);
}

#[test]
fn power_stats_sit_between_sleep_and_active_draw() {
    let store = SharedStore::default();
    let h = boot_and_sleep(&store, PlatformWake::Undefined);

    let power = h.app.power_stats();
    let profile = h.app.config().power;
    assert!(power.avg_current_ua >= profile.sleep_current_ua);
    assert!(power.avg_current_ua < profile.active_current_ua);
    assert!(power.estimated_battery_life_days > 0.0);
    assert!(h.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::SleepCommitted { duration_ms: 60_000, .. }
    )));
}

#[test]
fn factory_reset_clears_stats_and_mesh() {
    let store = SharedStore::default();
    boot_and_sleep(&store, PlatformWake::Undefined);
    boot_and_sleep(&store, PlatformWake::Timer);

    let board = MockBoard::new(Clock::default()).woken_by(PlatformWake::Timer);
    let mut h = Harness::with_parts(
        deep_config(),
        MockSensor::new(),
        MockTransport::provisioned(),
        board,
        store.clone(),
    );
    h.start();
    h.step();
    h.app.handle_command(AppCommand::FactoryReset, &mut h.sink);

    assert_eq!(store.get(), Some(PersistedStats::default()));
    assert_eq!(h.app.persisted_stats(), PersistedStats::default());
    assert_eq!(h.app.transport().factory_resets, 1);
    assert!(h.sink.contains(&AppEvent::FactoryReset));
}

#[test]
fn self_test_requires_initialised_sensor() {
    let mut h = Harness::new(deep_config(), MockSensor::new(), MockTransport::provisioned());
    h.start();

    h.app.handle_command(AppCommand::RunSelfTest, &mut h.sink);
    assert!(h
        .sink
        .contains(&AppEvent::SelfTest(Err(SensorError::NotReady))));

    h.step();
    assert!(h.app.is_initialized());
    h.app.handle_command(AppCommand::RunSelfTest, &mut h.sink);
    assert!(h.sink.contains(&AppEvent::SelfTest(Ok(()))));

    h.app.sensor_mut().self_test_result = Err(SensorError::Init);
    h.app.handle_command(AppCommand::RunSelfTest, &mut h.sink);
    assert!(h.sink.contains(&AppEvent::SelfTest(Err(SensorError::Init))));
}

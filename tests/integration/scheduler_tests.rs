//! Scheduler cycles driven end-to-end through `AppService` with mock
//! hardware and a manual clock.

use greeniot_node::app::events::AppEvent;
use greeniot_node::app::ports::Reading;
use greeniot_node::app::service::TickOutcome;
use greeniot_node::config::{SleepMode, SystemConfig};
use greeniot_node::error::{Error, SensorError, TransportError};
use greeniot_node::fsm::StateId;
use greeniot_node::policy::PublishDecision;

use crate::mock_hw::{Harness, MockSensor, MockTransport};

fn light_config(measure_s: u32, transmit_s: u32) -> SystemConfig {
    SystemConfig {
        measurement_interval_sec: measure_s,
        transmission_interval_sec: transmit_s,
        sleep_mode: SleepMode::Light,
        auto_sleep: true,
        ..Default::default()
    }
}

fn decisions(h: &Harness) -> Vec<PublishDecision> {
    h.sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::MeasurementAccepted { decision, .. } => Some(*decision),
            _ => None,
        })
        .collect()
}

// ── Full cycle scenario ───────────────────────────────────────

#[test]
fn five_light_cycles_publish_only_on_interval() {
    let mut h = Harness::new(
        light_config(60, 300),
        MockSensor::new(),
        MockTransport::provisioned(),
    );
    h.start();

    assert!(h.run_until(10_000, |h| !h.app.transport().sent.is_empty()));

    let accepted = h.sink.accepted();
    assert_eq!(accepted.len(), 5);
    for (i, r) in accepted.iter().enumerate() {
        let expected = 60 * (i as u32 + 1);
        assert!(
            (expected..=expected + 2).contains(&r.timestamp),
            "measurement {} at {} s, expected ~{} s",
            i + 1,
            r.timestamp,
            expected
        );
    }

    assert_eq!(
        decisions(&h),
        vec![
            PublishDecision::NotDue,
            PublishDecision::NotDue,
            PublishDecision::NotDue,
            PublishDecision::NotDue,
            PublishDecision::IntervalElapsed,
        ]
    );

    let published = h.sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].battery_percent, 58);
    assert_eq!(published[0].timestamp, accepted[4].timestamp);
    assert_eq!(h.app.transport().sent, published);

    // Every cycle ends in a light sleep for one measurement interval.
    assert_eq!(h.sleeps.len(), 5);
    for s in &h.sleeps {
        match s {
            TickOutcome::Sleep(c) => {
                assert_eq!(c.mode, SleepMode::Light);
                assert_eq!(c.duration_ms, 60_000);
            }
            TickOutcome::Continue { .. } => panic!("not a sleep"),
        }
    }

    // Four wakes so far, each resuming through Idle.
    let resumes = h.sink.count(|e| {
        *e == AppEvent::StateChanged {
            from: StateId::Sleep,
            to: StateId::Idle,
        }
    });
    assert_eq!(resumes, 4);
    assert_eq!(h.state(), StateId::Sleep);
    assert_eq!(h.app.retry_count(), 0);
}

#[test]
fn no_measurement_before_first_interval() {
    let mut h = Harness::new(
        light_config(60, 300),
        MockSensor::new(),
        MockTransport::provisioned(),
    );
    h.start();
    h.step();
    assert_eq!(h.state(), StateId::Idle);

    h.run_until(10_000, |h| h.clock.get() >= 59_000);
    assert_eq!(h.state(), StateId::Idle);
    assert_eq!(h.app.sensor().triggers, 0);

    assert!(h.run_until(100, |h| h.state() == StateId::Measure));
    assert!(h.app.power().now_ms() - h.app.last_measurement_ms() >= 60_000);
}

#[test]
fn temperature_jump_publishes_before_interval() {
    let mut sensor = MockSensor::new();
    sensor.push(Ok(Reading::valid(20.0, 50.0, 0)));
    sensor.push(Ok(Reading::valid(21.5, 50.0, 0)));
    let mut h = Harness::new(light_config(60, 3_600), sensor, MockTransport::provisioned());
    h.start();

    assert!(h.run_until(10_000, |h| !h.app.transport().sent.is_empty()));

    assert_eq!(
        decisions(&h),
        vec![PublishDecision::NotDue, PublishDecision::TemperatureDelta]
    );
    let sent = &h.app.transport().sent;
    assert!((sent[0].temperature - 21.5).abs() < f32::EPSILON);
}

#[test]
fn idle_without_auto_sleep_keeps_polling() {
    let config = SystemConfig {
        auto_sleep: false,
        ..light_config(60, 3_600)
    };
    let mut h = Harness::new(config, MockSensor::new(), MockTransport::provisioned());
    h.start();

    assert!(h.run_until(10_000, |h| h.sink.accepted().len() == 2));
    assert!(h.sleeps.is_empty());
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::SleepCommitted { .. })), 0);
}

// ── Provisioning ──────────────────────────────────────────────

#[test]
fn unprovisioned_node_skips_publish_and_sleeps() {
    let mut h = Harness::new(
        light_config(60, 60),
        MockSensor::new(),
        MockTransport::unprovisioned(),
    );
    h.start();

    assert!(h.run_until(10_000, |h| {
        h.sink.contains(&AppEvent::PublishSkippedNotProvisioned)
    }));

    assert!(h.app.transport().provisioning_enabled);
    assert!(h.app.transport().sent.is_empty());
    assert_eq!(h.app.retry_count(), 0);
    assert_eq!(h.state(), StateId::Sleep);
    assert_eq!(h.sleeps.len(), 1);
    assert!(h.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::NodeReady {
            provisioned: false,
            ..
        }
    )));
}

#[test]
fn send_failure_counts_against_retry_and_still_sleeps() {
    let mut transport = MockTransport::provisioned();
    transport.send_script.push_back(Err(TransportError::Send));
    let mut h = Harness::new(light_config(60, 60), MockSensor::new(), transport);
    h.start();

    assert!(h.run_until(10_000, |h| !h.sleeps.is_empty()));
    assert_eq!(h.app.retry_count(), 1);
    assert!(h.sink.contains(&AppEvent::TransmitFailed {
        error: TransportError::Send,
        attempt: 1,
        max: 3,
    }));

    // The next publish succeeds and clears the counter.
    assert!(h.run_until(10_000, |h| !h.app.transport().sent.is_empty()));
    assert_eq!(h.app.retry_count(), 0);
}

// ── Failure and recovery ──────────────────────────────────────

#[test]
fn measurement_retries_exhaust_into_error_then_recover() {
    let mut sensor = MockSensor::new();
    for _ in 0..3 {
        sensor.push(Err(SensorError::Timeout));
    }
    let mut h = Harness::new(light_config(60, 300), sensor, MockTransport::provisioned());
    h.start();

    assert!(h.run_until(10_000, |h| h.state() == StateId::Error));
    let entered_at = h.clock.get();

    let attempts: Vec<u8> = h
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::MeasurementFailed { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(
        h.sink.count(|e| matches!(e, AppEvent::RetryScheduled { .. })),
        2
    );
    let voltage = h.sink.events.iter().find_map(|e| match e {
        AppEvent::ErrorEntered { battery_voltage } => Some(*battery_voltage),
        _ => None,
    });
    assert!(voltage.is_some_and(|v| (v - 3.70).abs() < 0.01));

    // Held in Error until the recovery delay elapses.
    assert!(h.run_until(1_000, |h| h.state() != StateId::Error));
    assert!(h.clock.get() - entered_at >= 4_900);
    assert_eq!(h.state(), StateId::Idle);
    assert!(h.sink.contains(&AppEvent::Recovered { to: StateId::Idle }));
    assert_eq!(h.app.sensor().resets, 1);
    assert_eq!(h.app.retry_count(), 0);

    // The node carries on measuring afterwards.
    assert!(h.run_until(1_000, |h| h.sink.accepted().len() == 1));
}

#[test]
fn retry_waits_for_backoff() {
    let mut sensor = MockSensor::new();
    sensor.push(Err(SensorError::Crc));
    let mut h = Harness::new(light_config(60, 300), sensor, MockTransport::provisioned());
    h.start();

    assert!(h.run_until(10_000, |h| h.app.retry_count() == 1));
    let failed_at = h.clock.get();
    let triggers = h.app.sensor().triggers;

    // No new attempt inside the backoff window.
    while h.clock.get() < failed_at + 800 {
        h.step();
    }
    assert_eq!(h.app.sensor().triggers, triggers);

    assert!(h.run_until(100, |h| h.sink.accepted().len() == 1));
    assert!(h.clock.get() >= failed_at + 1_000);
}

#[test]
fn invalid_reading_is_discarded_without_retry() {
    let mut sensor = MockSensor::new();
    sensor.push(Ok(Reading {
        validity_flags: Reading::HUMIDITY_VALID,
        ..Reading::valid(200.0, 50.0, 0)
    }));
    let mut h = Harness::new(light_config(60, 300), sensor, MockTransport::provisioned());
    h.start();

    assert!(h.run_until(10_000, |h| !h.sleeps.is_empty()));
    assert!(h.sink.contains(&AppEvent::ReadingDiscarded {
        validity_flags: Reading::HUMIDITY_VALID,
    }));
    assert_eq!(h.app.retry_count(), 0);
    assert!(h.app.last_reading().is_none());
    assert!(h.sink.accepted().is_empty());
}

#[test]
fn bring_up_failure_recovers_through_init() {
    let mut sensor = MockSensor::new();
    sensor.init_result = Err(SensorError::Init);
    let mut h = Harness::new(light_config(60, 300), sensor, MockTransport::provisioned());
    h.start();

    h.step();
    assert_eq!(h.state(), StateId::Error);
    assert!(h
        .sink
        .contains(&AppEvent::BringUpFailed(Error::Sensor(SensorError::Init))));
    assert!(!h.app.is_initialized());

    h.app.sensor_mut().init_result = Ok(());
    assert!(h.run_until(1_000, |h| h.state() != StateId::Error));
    assert_eq!(h.state(), StateId::Init);
    assert!(h.sink.contains(&AppEvent::Recovered { to: StateId::Init }));

    h.step();
    assert_eq!(h.state(), StateId::Idle);
    assert!(h.app.is_initialized());
    assert_eq!(h.app.sensor().init_calls, 2);
}

#[test]
fn invalid_config_fails_bring_up() {
    let config = SystemConfig {
        max_retries: 0,
        ..Default::default()
    };
    let mut h = Harness::new(config, MockSensor::new(), MockTransport::provisioned());
    h.start();
    h.step();
    assert_eq!(h.state(), StateId::Error);
    assert!(h.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::BringUpFailed(Error::Config(_))
    )));
}

#[test]
fn unknown_sensor_type_lands_in_error() {
    let mut sensor_type = greeniot_node::config::SensorType::new();
    let _ = sensor_type.push_str("BME280");
    let config = SystemConfig {
        sensor_type,
        ..light_config(60, 300)
    };
    let mut h = Harness::new(config, MockSensor::new(), MockTransport::provisioned());
    h.start();
    h.step();
    assert_eq!(h.state(), StateId::Error);
    assert!(h.sink.contains(&AppEvent::BringUpFailed(Error::Config(
        "sensor_type has no driver"
    ))));
    assert_eq!(h.app.sensor().init_calls, 0);
}

#[test]
fn missing_sensor_driver_lands_in_error() {
    let mut sensor = MockSensor::new();
    sensor.init_result = Err(SensorError::UnknownType);
    let mut h = Harness::new(light_config(60, 300), sensor, MockTransport::provisioned());
    h.start();
    h.step();
    assert_eq!(h.state(), StateId::Error);
    assert!(h
        .sink
        .contains(&AppEvent::BringUpFailed(Error::Sensor(SensorError::UnknownType))));
    assert!(h.sink.events.iter().any(|e| matches!(e, AppEvent::ErrorEntered { .. })));
}

// ── Deep sleep ────────────────────────────────────────────────

#[test]
fn deep_sleep_commit_halts_the_service() {
    let config = SystemConfig {
        measurement_interval_sec: 60,
        ..Default::default()
    };
    let mut h = Harness::new(config, MockSensor::new(), MockTransport::provisioned());
    h.start();

    assert!(h.run_until(10_000, |h| !h.sleeps.is_empty()));
    let TickOutcome::Sleep(commit) = h.sleeps[0] else {
        panic!("expected a sleep commit");
    };
    assert_eq!(commit.mode, SleepMode::Deep);
    assert_eq!(commit.duration_ms, 60_000);
    assert_eq!(h.app.power().board().armed_ms, Some(60_000));
    assert!(!h.app.power().board().sensor_powered);

    let ticks = h.app.tick_count();
    for _ in 0..3 {
        assert_eq!(h.app.tick(&mut h.sink), TickOutcome::Sleep(commit));
    }
    assert_eq!(h.app.tick_count(), ticks);
    assert_eq!(h.state(), StateId::Sleep);
}

#[test]
fn sleep_commit_failure_enters_error() {
    let config = SystemConfig {
        measurement_interval_sec: 60,
        ..Default::default()
    };
    let mut h = Harness::new(config, MockSensor::new(), MockTransport::provisioned());
    h.app.power_mut().board_mut().arm_result =
        Err(greeniot_node::error::PowerError::WakeTimer(-1));
    h.start();

    assert!(h.run_until(10_000, |h| h.state() == StateId::Error));
    assert!(h.sleeps.is_empty());
    assert_eq!(
        h.sink.count(|e| matches!(e, AppEvent::ErrorEntered { .. })),
        1
    );
}

#[test]
fn failed_sleep_commit_leaves_counters_untouched() {
    let config = SystemConfig {
        measurement_interval_sec: 60,
        ..Default::default()
    };
    let mut h = Harness::new(config, MockSensor::new(), MockTransport::provisioned());
    h.app.power_mut().board_mut().arm_result =
        Err(greeniot_node::error::PowerError::WakeTimer(-1));
    h.start();

    // Two full cycles, each ending in a rejected sleep.
    assert!(h.run_until(20_000, |h| {
        h.sink.count(|e| matches!(e, AppEvent::ErrorEntered { .. })) >= 2
    }));
    assert!(h.sleeps.is_empty());

    let stats = h.app.persisted_stats();
    assert_eq!(stats.boot_count, 1);
    assert_eq!(stats.total_sleep_time_ms, 0);
    assert_eq!(stats.total_active_time_ms, 0);
    assert_eq!(h.store.get(), None);
}

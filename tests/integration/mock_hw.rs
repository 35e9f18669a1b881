//! Mock hardware adapters for integration tests.
//!
//! Every mock records what the service asked of it so tests can assert on
//! the full call history.  The board owns a manual clock shared with the
//! test harness: delays advance it, and the harness advances it by the
//! `delay_ms` / sleep duration each tick hands back.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use greeniot_node::app::events::AppEvent;
use greeniot_node::app::ports::{
    BoardPort, EventSink, MeshSensorData, Reading, RetainedStatsPort, SensorInfo, SensorPort,
    TransportPort, TransportStatus,
};
use greeniot_node::app::service::{AppService, TickOutcome};
use greeniot_node::config::{SensorConfig, SystemConfig, TransportConfig};
use greeniot_node::error::{PowerError, SensorError, TransportError};
use greeniot_node::fsm::StateId;
use greeniot_node::power::{PersistedStats, PlatformWake};

/// ADC code for ~3.70 V through the 2:1 divider (58 %).
pub const RAW_3V7: u16 = 2296;

// ── MockSensor ────────────────────────────────────────────────

pub const MOCK_INFO: SensorInfo = SensorInfo {
    name: "MOCK",
    manufacturer: "Test",
    temp_range_celsius: (-40.0, 125.0),
    hum_range_percent: (0.0, 100.0),
    temp_accuracy_celsius: 0.3,
    hum_accuracy_percent: 2.0,
    measurement_time_ms: 15,
    power_active_ua: 800,
    power_sleep_ua: 2,
};

pub struct MockSensor {
    /// Scripted results for `read`; once drained every read returns
    /// `fallback`.
    pub script: VecDeque<Result<Reading, SensorError>>,
    pub fallback: Reading,
    pub init_result: Result<(), SensorError>,
    pub self_test_result: Result<(), SensorError>,
    pub init_calls: u32,
    pub triggers: u32,
    pub resets: u32,
    pub configured: Option<SensorConfig>,
}

#[allow(dead_code)]
impl MockSensor {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            fallback: Reading::valid(20.0, 50.0, 0),
            init_result: Ok(()),
            self_test_result: Ok(()),
            init_calls: 0,
            triggers: 0,
            resets: 0,
            configured: None,
        }
    }

    pub fn push(&mut self, result: Result<Reading, SensorError>) {
        self.script.push_back(result);
    }
}

impl SensorPort for MockSensor {
    fn init(&mut self) -> Result<(), SensorError> {
        self.init_calls += 1;
        self.init_result
    }

    fn trigger_measurement(&mut self) -> Result<(), SensorError> {
        self.triggers += 1;
        Ok(())
    }

    fn read(&mut self) -> Result<Reading, SensorError> {
        self.script.pop_front().unwrap_or(Ok(self.fallback))
    }

    fn sleep(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn wakeup(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn self_test(&mut self) -> Result<(), SensorError> {
        self.self_test_result
    }

    fn reset(&mut self) -> Result<(), SensorError> {
        self.resets += 1;
        Ok(())
    }

    fn configure(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        self.configured = Some(*config);
        Ok(())
    }

    fn info(&self) -> &SensorInfo {
        &MOCK_INFO
    }
}

// ── MockTransport ─────────────────────────────────────────────

pub struct MockTransport {
    pub provisioned: bool,
    pub provisioning_enabled: bool,
    /// Scripted results for `send` after the provisioning check.
    pub send_script: VecDeque<Result<(), TransportError>>,
    pub sent: Vec<MeshSensorData>,
    pub factory_resets: u32,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn provisioned() -> Self {
        Self {
            provisioned: true,
            provisioning_enabled: false,
            send_script: VecDeque::new(),
            sent: Vec::new(),
            factory_resets: 0,
        }
    }

    pub fn unprovisioned() -> Self {
        Self {
            provisioned: false,
            ..Self::provisioned()
        }
    }
}

impl TransportPort for MockTransport {
    fn init(&mut self, _config: &TransportConfig) -> Result<(), TransportError> {
        Ok(())
    }

    fn enable_provisioning(&mut self) -> Result<(), TransportError> {
        self.provisioning_enabled = true;
        Ok(())
    }

    fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    fn send(&mut self, data: &MeshSensorData) -> Result<(), TransportError> {
        if !self.provisioned {
            return Err(TransportError::NotProvisioned);
        }
        self.send_script.pop_front().unwrap_or(Ok(()))?;
        self.sent.push(*data);
        Ok(())
    }

    fn status(&self) -> TransportStatus {
        TransportStatus {
            initialized: true,
            provisioned: self.provisioned,
            address: if self.provisioned { 0x0005 } else { 0 },
            features: 0,
            uptime_s: 0,
        }
    }

    fn factory_reset(&mut self) -> Result<(), TransportError> {
        self.factory_resets += 1;
        self.provisioned = false;
        Ok(())
    }
}

// ── MockBoard ─────────────────────────────────────────────────

/// Manual millisecond clock shared between the board and the harness.
pub type Clock = Rc<Cell<u64>>;

pub struct MockBoard {
    pub clock: Clock,
    pub wake: PlatformWake,
    pub battery_raw: Result<u16, PowerError>,
    pub sensor_powered: bool,
    pub armed_ms: Option<u64>,
    pub arm_result: Result<(), PowerError>,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            wake: PlatformWake::Undefined,
            battery_raw: Ok(RAW_3V7),
            sensor_powered: false,
            armed_ms: None,
            arm_result: Ok(()),
        }
    }

    pub fn woken_by(mut self, wake: PlatformWake) -> Self {
        self.wake = wake;
        self
    }
}

impl BoardPort for MockBoard {
    fn init(&mut self) -> Result<(), PowerError> {
        Ok(())
    }

    fn set_sensor_power(&mut self, on: bool) -> Result<(), PowerError> {
        self.sensor_powered = on;
        Ok(())
    }

    fn read_battery_raw(&mut self) -> Result<u16, PowerError> {
        self.battery_raw
    }

    fn wake_source(&self) -> PlatformWake {
        self.wake
    }

    fn arm_wake_timer(&mut self, duration_ms: u64) -> Result<(), PowerError> {
        self.arm_result?;
        self.armed_ms = Some(duration_ms);
        Ok(())
    }

    fn uptime_ms(&self) -> u64 {
        self.clock.get()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.clock.set(self.clock.get() + u64::from(ms));
    }
}

// ── SharedStore ───────────────────────────────────────────────

/// Retained region that outlives a service instance, like RTC memory
/// across a deep-sleep reset.
#[derive(Clone, Default)]
pub struct SharedStore(pub Rc<RefCell<Option<PersistedStats>>>);

impl SharedStore {
    pub fn get(&self) -> Option<PersistedStats> {
        *self.0.borrow()
    }
}

impl RetainedStatsPort for SharedStore {
    fn load(&self) -> Option<PersistedStats> {
        *self.0.borrow()
    }

    fn store(&mut self, stats: &PersistedStats) {
        *self.0.borrow_mut() = Some(*stats);
    }
}

// ── RecordingSink ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn contains(&self, event: &AppEvent) -> bool {
        self.events.contains(event)
    }

    /// Accepted readings in order.
    pub fn accepted(&self) -> Vec<Reading> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::MeasurementAccepted { reading, .. } => Some(*reading),
                _ => None,
            })
            .collect()
    }

    pub fn published(&self) -> Vec<MeshSensorData> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Published(d) => Some(*d),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub type TestService = AppService<MockSensor, MockTransport, MockBoard, SharedStore>;

pub struct Harness {
    pub app: TestService,
    pub clock: Clock,
    pub store: SharedStore,
    pub sink: RecordingSink,
    pub sleeps: Vec<TickOutcome>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(config: SystemConfig, sensor: MockSensor, transport: MockTransport) -> Self {
        let clock = Clock::default();
        let store = SharedStore::default();
        let board = MockBoard::new(clock.clone());
        Self::with_parts(config, sensor, transport, board, store)
    }

    pub fn with_parts(
        config: SystemConfig,
        sensor: MockSensor,
        transport: MockTransport,
        board: MockBoard,
        store: SharedStore,
    ) -> Self {
        let clock = board.clock.clone();
        let app = AppService::new(config, sensor, transport, board, store.clone());
        Self {
            app,
            clock,
            store,
            sink: RecordingSink::default(),
            sleeps: Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.app.start(&mut self.sink);
    }

    /// One tick, then advance the clock the way the driver loop would.
    pub fn step(&mut self) -> TickOutcome {
        let outcome = self.app.tick(&mut self.sink);
        match outcome {
            TickOutcome::Continue { delay_ms } => {
                self.clock.set(self.clock.get() + u64::from(delay_ms));
            }
            TickOutcome::Sleep(commit) => {
                self.clock.set(self.clock.get() + commit.duration_ms);
                self.sleeps.push(outcome);
            }
        }
        outcome
    }

    /// Step until `pred` holds or `max_ticks` elapse; returns whether it held.
    pub fn run_until(&mut self, max_ticks: usize, pred: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..max_ticks {
            if pred(self) {
                return true;
            }
            self.step();
        }
        pred(self)
    }

    pub fn state(&self) -> StateId {
        self.app.state()
    }
}

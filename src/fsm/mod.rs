//! Function-pointer finite state machine engine.
//!
//! Classic embedded FSM pattern ported to Rust:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  StateTable                                               │
//! │  ┌──────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ StateId  │ on_enter  │ on_exit  │ on_update         │  │
//! │  ├──────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Init     │ -         │ -        │ fn(ctx)->Option<> │  │
//! │  │ Idle     │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Measure  │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Transmit │ -         │ -        │ fn(ctx)->Option<> │  │
//! │  │ Sleep    │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Error    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  └──────────┴───────────┴──────────┴───────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext`, which
//! holds the I/O results gathered for this tick, the timing baselines,
//! and the command block the service executes afterwards.
//!
//! Handlers never perform I/O themselves.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Enumeration of all scheduler states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Init = 0,
    Idle = 1,
    Measure = 2,
    Transmit = 3,
    Sleep = 4,
    Error = 5,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 6;

    /// Convert a `u8` index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Error` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Init,
            1 => Self::Idle,
            2 => Self::Measure,
            3 => Self::Transmit,
            4 => Self::Sleep,
            5 => Self::Error,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Error
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
/// Stored in a fixed-size array, no heap, no `dyn`.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
///
/// Owns the state table (array of [`StateDescriptor`]).  The mutable
/// [`FsmContext`] is owned by the caller and threaded through every
/// handler call.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonically increasing tick counter.
    tick_count: u64,
    /// Tick at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entered_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    /// 3. Increment tick counter.
    pub fn tick(&mut self, ctx: &mut FsmContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        let next = (self.table[self.current].on_update)(ctx);

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Force an immediate transition regardless of what `on_update`
    /// would return (used when a sleep commit fails).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// How many ticks the FSM has been in the current state.
    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;
        ctx.state_entered_ms = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::FsmContext;
    use super::*;
    use crate::app::ports::Reading;
    use crate::config::{SleepMode, SystemConfig};
    use crate::error::{Error, SensorError, TransportError};
    use crate::policy::PublishDecision;

    fn make_ctx() -> FsmContext {
        FsmContext::new(SystemConfig::default())
    }

    fn make_fsm() -> Fsm {
        Fsm::new(states::build_state_table(), StateId::Init)
    }

    /// FSM that has completed Init at `now_ms = 0` and sits in Idle.
    fn ready() -> (Fsm, FsmContext) {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        ctx.inputs.bring_up = Some(Ok(()));
        fsm.tick(&mut ctx);
        ctx.clear_step();
        (fsm, ctx)
    }

    fn tick_at(fsm: &mut Fsm, ctx: &mut FsmContext, now_ms: u64) {
        ctx.now_ms = now_ms;
        fsm.tick(ctx);
    }

    #[test]
    fn starts_in_init() {
        let fsm = make_fsm();
        assert_eq!(fsm.current_state(), StateId::Init);
    }

    #[test]
    fn init_waits_for_bring_up_result() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Init);
    }

    #[test]
    fn init_success_sets_baselines_and_goes_idle() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        ctx.now_ms = 1_234;
        ctx.inputs.bring_up = Some(Ok(()));
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(ctx.last_measurement_ms, 1_234);
        assert_eq!(ctx.last_transmission_ms, 1_234);
        assert!(ctx.initialized);
    }

    #[test]
    fn init_failure_goes_to_error() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        ctx.inputs.bring_up = Some(Err(Error::Sensor(SensorError::Init)));
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Error);
        assert!(ctx.commands.log_diagnostics);
        assert!(!ctx.initialized);
    }

    #[test]
    fn idle_to_measure_exactly_at_interval() {
        let (mut fsm, mut ctx) = ready();
        let interval = ctx.config.measurement_interval_ms();

        tick_at(&mut fsm, &mut ctx, interval - 1);
        assert_eq!(fsm.current_state(), StateId::Idle);

        tick_at(&mut fsm, &mut ctx, interval);
        assert_eq!(fsm.current_state(), StateId::Measure);
    }

    #[test]
    fn measure_without_result_stays() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Measure);
    }

    #[test]
    fn measure_success_resets_retry_and_updates_baseline() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.retry.increment();
        ctx.now_ms = 300_000;
        ctx.inputs.measurement = Some(Ok(Reading::valid(20.0, 50.0, 300)));
        fsm.tick(&mut ctx);

        assert_eq!(ctx.retry.get(), 0);
        assert_eq!(ctx.last_measurement_ms, 300_000);
        assert_eq!(ctx.last_decision, Some(PublishDecision::IntervalElapsed));
        assert_eq!(fsm.current_state(), StateId::Transmit);
    }

    #[test]
    fn measure_not_due_goes_to_sleep_with_auto_sleep() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.now_ms = 60_000;
        ctx.inputs.measurement = Some(Ok(Reading::valid(20.0, 50.0, 60)));
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Sleep);
        assert_eq!(
            ctx.commands.sleep_for_ms,
            Some(ctx.config.measurement_interval_ms())
        );
    }

    #[test]
    fn measure_not_due_goes_idle_without_auto_sleep() {
        let (mut fsm, mut ctx) = ready();
        ctx.config.auto_sleep = false;
        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.now_ms = 60_000;
        ctx.inputs.measurement = Some(Ok(Reading::valid(20.0, 50.0, 60)));
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
    }

    #[test]
    fn previous_reading_drives_threshold() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.now_ms = 60_000;
        ctx.inputs.measurement = Some(Ok(Reading::valid(20.0, 50.0, 60)));
        fsm.tick(&mut ctx);
        ctx.clear_step();

        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.now_ms = 120_000;
        ctx.inputs.measurement = Some(Ok(Reading::valid(21.5, 50.0, 120)));
        fsm.tick(&mut ctx);

        assert_eq!(ctx.last_decision, Some(PublishDecision::TemperatureDelta));
        assert_eq!(fsm.current_state(), StateId::Transmit);
        assert_eq!(ctx.previous_reading.map(|r| r.temperature), Some(20.0));
    }

    #[test]
    fn invalid_reading_is_discarded_without_retry() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.now_ms = 60_000;
        ctx.inputs.measurement = Some(Ok(Reading {
            validity_flags: Reading::TEMPERATURE_VALID,
            ..Reading::valid(20.0, 50.0, 60)
        }));
        fsm.tick(&mut ctx);

        assert_eq!(ctx.retry.get(), 0);
        assert!(ctx.reading.is_none());
        assert_eq!(ctx.last_measurement_ms, 60_000);
        assert_eq!(fsm.current_state(), StateId::Sleep);
    }

    #[test]
    fn measure_failure_schedules_backoff() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        ctx.now_ms = 1_000;
        ctx.inputs.measurement = Some(Err(SensorError::Comm));
        fsm.tick(&mut ctx);

        assert_eq!(fsm.current_state(), StateId::Measure);
        assert_eq!(ctx.retry.get(), 1);
        assert_eq!(ctx.retry_at_ms, 1_000 + u64::from(ctx.config.retry_backoff_ms));
    }

    #[test]
    fn measure_failures_exhaust_into_error() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Measure, &mut ctx);
        for _ in 0..ctx.config.max_retries {
            ctx.inputs.measurement = Some(Err(SensorError::Timeout));
            fsm.tick(&mut ctx);
            ctx.clear_step();
        }
        assert_eq!(fsm.current_state(), StateId::Error);
    }

    #[test]
    fn transmit_success_resets_retry() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Transmit, &mut ctx);
        ctx.retry.increment();
        ctx.now_ms = 5_000;
        ctx.inputs.transmission = Some(Ok(()));
        fsm.tick(&mut ctx);

        assert_eq!(ctx.retry.get(), 0);
        assert_eq!(ctx.last_transmission_ms, 5_000);
        assert_eq!(fsm.current_state(), StateId::Sleep);
    }

    #[test]
    fn not_provisioned_keeps_retry_and_sleeps() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Transmit, &mut ctx);
        ctx.retry.increment();
        ctx.inputs.transmission = Some(Err(TransportError::NotProvisioned));
        fsm.tick(&mut ctx);

        assert_eq!(ctx.retry.get(), 1);
        assert_eq!(fsm.current_state(), StateId::Sleep);
    }

    #[test]
    fn send_failure_consumes_budget_then_errors() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Transmit, &mut ctx);
        ctx.inputs.transmission = Some(Err(TransportError::Send));
        fsm.tick(&mut ctx);
        assert_eq!(ctx.retry.get(), 1);
        assert_eq!(fsm.current_state(), StateId::Sleep);

        ctx.clear_step();
        ctx.retry.increment();
        fsm.force_transition(StateId::Transmit, &mut ctx);
        ctx.inputs.transmission = Some(Err(TransportError::Send));
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Error);
    }

    #[test]
    fn light_sleep_resumes_in_idle() {
        let (mut fsm, mut ctx) = ready();
        ctx.config.sleep_mode = SleepMode::Light;
        ctx.last_measurement_ms = 60_000;
        fsm.force_transition(StateId::Sleep, &mut ctx);
        ctx.clear_step();
        ctx.now_ms = 90_000;
        assert_eq!(ctx.active_ms(), 30_000);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(ctx.last_measurement_ms, 60_000);
    }

    #[test]
    fn deep_sleep_never_leaves_sleep() {
        let (mut fsm, mut ctx) = ready();
        fsm.force_transition(StateId::Sleep, &mut ctx);
        for _ in 0..5 {
            fsm.tick(&mut ctx);
        }
        assert_eq!(fsm.current_state(), StateId::Sleep);
    }

    #[test]
    fn error_holds_until_recovery_delay() {
        let (mut fsm, mut ctx) = ready();
        ctx.now_ms = 10_000;
        ctx.retry.increment();
        fsm.force_transition(StateId::Error, &mut ctx);
        let recovery = u64::from(ctx.config.error_recovery_ms);

        tick_at(&mut fsm, &mut ctx, 10_000 + recovery - 1);
        assert_eq!(fsm.current_state(), StateId::Error);

        tick_at(&mut fsm, &mut ctx, 10_000 + recovery);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(ctx.retry.get(), 0);
        assert!(ctx.commands.sensor_reset);
    }

    #[test]
    fn error_before_init_recovers_into_init() {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        ctx.inputs.bring_up = Some(Err(Error::Init("gpio")));
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Error);

        let recovery = u64::from(ctx.config.error_recovery_ms);
        tick_at(&mut fsm, &mut ctx, recovery);
        assert_eq!(fsm.current_state(), StateId::Init);
    }

    #[test]
    fn force_transition_to_same_state_is_noop() {
        let (mut fsm, mut ctx) = ready();
        ctx.commands.log_diagnostics = false;
        fsm.force_transition(StateId::Idle, &mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(fsm.ticks_in_current_state(), 0);
    }

    #[test]
    fn tick_increments_counter() {
        let (mut fsm, mut ctx) = ready();
        fsm.tick(&mut ctx);
        assert_eq!(fsm.ticks_in_current_state(), 1);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.ticks_in_current_state(), 2);
    }

    #[test]
    fn state_id_from_index_roundtrip() {
        for i in 0..StateId::COUNT {
            let id = StateId::from_index(i);
            assert_eq!(id as usize, i);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn state_id_from_invalid_index_returns_error() {
        let id = StateId::from_index(99);
        assert_eq!(id, StateId::Error);
    }
}

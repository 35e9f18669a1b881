//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.  This is the classic embedded C FSM pattern
//! expressed in safe Rust.
//!
//! ```text
//!  INIT ──[bring-up ok]──▶ IDLE ──[interval elapsed]──▶ MEASURE ◀─┐
//!   │                      ▲  ▲                          │  │  [retry]
//!   │                      │  └─────[not due, !auto]─────┘  └───┘
//!   │               [light wake]                          │
//!   │                      │                      [due]   │ [not due, auto]
//!   │                    SLEEP ◀──────── TRANSMIT ◀───────┤
//!   │                      ▲                              │
//!   │                      └──────────────────────────────┘
//!   │
//!   └─[bring-up failed]──▶ ERROR ◀──[retries exhausted]── MEASURE / TRANSMIT
//!                            │
//!                [recovery delay] ──▶ IDLE (or INIT if never initialised)
//! ```

use super::context::FsmContext;
use super::{StateDescriptor, StateId};
use crate::config::SleepMode;
use crate::error::TransportError;
use log::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Init
        StateDescriptor {
            id: StateId::Init,
            name: "Init",
            on_enter: None,
            on_exit: None,
            on_update: init_update,
        },
        // Index 1: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 2: Measure
        StateDescriptor {
            id: StateId::Measure,
            name: "Measure",
            on_enter: Some(measure_enter),
            on_exit: None,
            on_update: measure_update,
        },
        // Index 3: Transmit
        StateDescriptor {
            id: StateId::Transmit,
            name: "Transmit",
            on_enter: None,
            on_exit: None,
            on_update: transmit_update,
        },
        // Index 4: Sleep
        StateDescriptor {
            id: StateId::Sleep,
            name: "Sleep",
            on_enter: Some(sleep_enter),
            on_exit: None,
            on_update: sleep_update,
        },
        // Index 5: Error
        StateDescriptor {
            id: StateId::Error,
            name: "Error",
            on_enter: Some(error_enter),
            on_exit: Some(error_exit),
            on_update: error_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  INIT state: peripheral and capability bring-up
// ═══════════════════════════════════════════════════════════════════════════

fn init_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.inputs.bring_up? {
        Ok(()) => {
            ctx.last_measurement_ms = ctx.now_ms;
            ctx.last_transmission_ms = ctx.now_ms;
            ctx.initialized = true;
            info!("INIT: complete at {} ms", ctx.now_ms);
            Some(StateId::Idle)
        }
        Err(e) => {
            warn!("INIT: bring-up failed: {}", e);
            Some(StateId::Error)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state: waiting for the next measurement slot
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    debug!(
        "IDLE: next measurement in {} ms",
        ctx.config
            .measurement_interval_ms()
            .saturating_sub(ctx.now_ms.saturating_sub(ctx.last_measurement_ms))
    );
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    let elapsed = ctx.now_ms.saturating_sub(ctx.last_measurement_ms);
    if elapsed >= ctx.config.measurement_interval_ms() {
        return Some(StateId::Measure);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  MEASURE state: sample, validate, decide on publish
// ═══════════════════════════════════════════════════════════════════════════

fn measure_enter(ctx: &mut FsmContext) {
    ctx.retry_at_ms = ctx.now_ms;
}

fn measure_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.inputs.measurement? {
        Ok(reading) if !reading.is_valid() => {
            warn!(
                "MEASURE: discarding reading with flags 0x{:02X}",
                reading.validity_flags
            );
            ctx.last_measurement_ms = ctx.now_ms;
            ctx.last_decision = None;
            Some(after_measurement(ctx))
        }
        Ok(reading) => {
            let decision = ctx.policy.evaluate(
                &reading,
                ctx.reading.as_ref(),
                ctx.now_ms,
                ctx.last_transmission_ms,
            );
            ctx.store_reading(reading);
            ctx.retry.reset();
            ctx.last_measurement_ms = ctx.now_ms;
            ctx.last_decision = Some(decision);

            if decision.is_due() {
                Some(StateId::Transmit)
            } else {
                Some(after_measurement(ctx))
            }
        }
        Err(e) => {
            let exhausted = ctx.retry.increment();
            warn!(
                "MEASURE: failed ({}), attempt {}/{}",
                e,
                ctx.retry.get(),
                ctx.retry.max()
            );
            if exhausted {
                return Some(StateId::Error);
            }
            ctx.retry_at_ms = ctx.now_ms + u64::from(ctx.config.retry_backoff_ms);
            None
        }
    }
}

/// Where a cycle goes when there is nothing to publish.
fn after_measurement(ctx: &FsmContext) -> StateId {
    if ctx.config.auto_sleep {
        StateId::Sleep
    } else {
        StateId::Idle
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  TRANSMIT state: publish the latest accepted reading
// ═══════════════════════════════════════════════════════════════════════════

fn transmit_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.inputs.transmission? {
        Ok(()) => {
            ctx.retry.reset();
        }
        Err(TransportError::NotProvisioned) => {
            info!("TRANSMIT: not provisioned, skipping publish");
        }
        Err(e) => {
            let exhausted = ctx.retry.increment();
            warn!(
                "TRANSMIT: failed ({}), attempt {}/{}",
                e,
                ctx.retry.get(),
                ctx.retry.max()
            );
            if exhausted {
                return Some(StateId::Error);
            }
        }
    }
    ctx.last_transmission_ms = ctx.now_ms;
    Some(StateId::Sleep)
}

// ═══════════════════════════════════════════════════════════════════════════
//  SLEEP state: hand a sleep commit to the service
// ═══════════════════════════════════════════════════════════════════════════

fn sleep_enter(ctx: &mut FsmContext) {
    ctx.commands.sleep_for_ms = Some(ctx.config.measurement_interval_ms());
}

fn sleep_update(ctx: &mut FsmContext) -> Option<StateId> {
    match ctx.config.sleep_mode {
        SleepMode::Light => Some(StateId::Idle),
        // Execution ends at the commit; the next boot starts at Init.
        SleepMode::Deep => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  ERROR state: hold, then recover
// ═══════════════════════════════════════════════════════════════════════════

fn error_enter(ctx: &mut FsmContext) {
    ctx.commands.log_diagnostics = true;
    warn!(
        "ERROR: entered (retries {}/{}, initialised={}), recovering in {} ms",
        ctx.retry.get(),
        ctx.retry.max(),
        ctx.initialized,
        ctx.config.error_recovery_ms
    );
}

fn error_exit(ctx: &mut FsmContext) {
    ctx.retry.reset();
    ctx.commands.sensor_reset = true;
    info!("ERROR: recovery delay elapsed, resetting sensor");
}

fn error_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.ms_in_state() < u64::from(ctx.config.error_recovery_ms) {
        return None;
    }
    if ctx.initialized {
        Some(StateId::Idle)
    } else {
        Some(StateId::Init)
    }
}

//! GreenIoT sensor node firmware library.
//!
//! Exposes the pure-logic modules for integration testing and for the
//! firmware binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod assessment;
pub mod config;
pub mod error;
pub mod fsm;
pub mod pins;
pub mod policy;
pub mod power;

// Hardware-facing modules compile on the host too; each carries its own
// simulation backend behind cfg attributes.
pub mod adapters;
pub mod drivers;
pub mod sensors;

//! Application core: pure domain logic, zero direct I/O.
//!
//! This module contains the business rules of the sensor node: the
//! measure / transmit / sleep scheduler, retry and recovery, and command
//! handling.  All interaction with hardware happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;

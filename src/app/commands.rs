//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (a button wake,
//! a serial console, a test harness) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Clear persisted statistics and leave the mesh network.
    FactoryReset,

    /// Run the sensor's built-in self-test and report the result.
    RunSelfTest,
}

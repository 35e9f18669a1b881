//! Low-level peripheral drivers that sit outside the port traits.

pub mod watchdog;

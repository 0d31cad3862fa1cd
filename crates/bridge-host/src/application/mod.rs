//! Application layer: the connection state machine, the control tick, and
//! the worker pumps that bridge input sources onto the device link.

pub mod keystrokes;
pub mod pumps;
pub mod supervisor;
pub mod telemetry;

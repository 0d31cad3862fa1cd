//! Infrastructure services: serial I/O, input sources, resource sampling,
//! persistence, and the periodic scheduler.

pub mod input;
pub mod scheduler;
pub mod serial;
pub mod stats;
pub mod storage;

//! Serial transport infrastructure.
//!
//! All serial access goes through two trait seams so that everything above
//! this module is testable without hardware:
//!
//! - [`SerialLink`] – one open port handle (blocking reads/writes with the
//!   transport-appropriate timeouts already applied).
//! - [`LinkFactory`] – enumeration plus port opening.
//!
//! The production implementation ([`enumerate::SerialportFactory`]) wraps the
//! `serialport` crate; tests use the scripted [`mock::MockLinkFactory`].

use std::io;
use std::time::Duration;

use bridge_core::{SerialEndpoint, TransportKind};
use thiserror::Error;

pub mod enumerate;
pub mod mock;
pub mod probe;
pub mod session;

pub use probe::{Detection, ProbeEngine, ProbeError, ProbeStrategy, ProbeTimings};
pub use session::LinkSession;

/// Fixed baud rate for the Core2 link on both transports.
pub const BAUD_RATE: u32 = 115_200;

/// Read/write timeout for a transport kind.
///
/// Bluetooth RFCOMM links stall unpredictably, so a short nonzero timeout
/// keeps blocking calls bounded.  USB-CDC is reliably fast; a zero timeout
/// makes reads and writes effectively non-blocking.
pub fn timeout_for(kind: TransportKind) -> Duration {
    match kind {
        TransportKind::Bluetooth => Duration::from_millis(50),
        TransportKind::Usb => Duration::ZERO,
    }
}

/// Error type for serial link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The requested identifier was not among the enumerated endpoints.
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// The OS refused to open the port.
    #[error("open failed: {0}")]
    OpenFailed(#[from] serialport::Error),

    /// An I/O error occurred on an open handle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// One open serial port handle.
///
/// Implementations carry their timeouts internally; a blocked call returns
/// within the timeout configured at open time.
pub trait SerialLink: Send {
    /// Writes the whole buffer.
    ///
    /// A zero-length write is the USB liveness probe: it must touch the
    /// underlying handle so that a vanished device surfaces as an error.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Reads whatever is available into `buf`.
    ///
    /// Returns `Ok(0)` when nothing arrived within the read timeout; an
    /// `Err` means the handle itself failed.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Discards any buffered inbound bytes.
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Enumerates endpoints and opens port handles.
pub trait LinkFactory: Send + Sync {
    /// Lists all currently visible serial endpoints, classified by
    /// transport kind, in system enumeration order.
    fn enumerate(&self) -> Vec<SerialEndpoint>;

    /// Opens `identifier` with the timeout profile for `kind`.
    fn open(&self, identifier: &str, kind: TransportKind) -> Result<Box<dyn SerialLink>, LinkError>;
}

/// Returns `true` for OS timeout / would-block errors that are transient.
pub(crate) fn is_timeout_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

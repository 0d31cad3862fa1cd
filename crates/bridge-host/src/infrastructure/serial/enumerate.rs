//! Production [`LinkFactory`] backed by the `serialport` crate.
//!
//! Enumeration flattens the OS port metadata into the descriptor strings the
//! classifier works on.  `serialport` already tags some Bluetooth ports with
//! [`SerialPortType::BluetoothPort`]; that tag is honoured directly, and
//! everything else goes through the substring classifier, because Windows in
//! particular reports RFCOMM channels as plain COM ports whose only
//! Bluetooth evidence is the `BTHENUM` hardware id.

use std::io::{Read, Write};

use bridge_core::{classify, SerialEndpoint, TransportKind};
use serialport::{SerialPortType, UsbPortInfo};
use tracing::{debug, warn};

use super::{timeout_for, LinkError, LinkFactory, SerialLink, BAUD_RATE};

/// Factory that enumerates and opens real OS serial ports.
#[derive(Debug, Default)]
pub struct SerialportFactory;

impl SerialportFactory {
    pub fn new() -> Self {
        Self
    }
}

impl LinkFactory for SerialportFactory {
    fn enumerate(&self) -> Vec<SerialEndpoint> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!("serial enumeration failed: {e}");
                return Vec::new();
            }
        };

        ports
            .into_iter()
            .map(|port| {
                let (description, hardware_id, tagged_bluetooth) = describe(&port.port_type);
                let transport_kind = if tagged_bluetooth {
                    TransportKind::Bluetooth
                } else {
                    classify(&description, &hardware_id)
                };
                SerialEndpoint {
                    identifier: port.port_name,
                    transport_kind,
                    hardware_id,
                    description,
                }
            })
            .collect()
    }

    fn open(&self, identifier: &str, kind: TransportKind) -> Result<Box<dyn SerialLink>, LinkError> {
        debug!(%identifier, %kind, "opening serial port");
        let port = serialport::new(identifier, BAUD_RATE)
            .timeout(timeout_for(kind))
            .open()?;
        Ok(Box::new(SerialportLink { port }))
    }
}

/// Synthesises description and hardware-id text from the OS port type.
///
/// Returns `(description, hardware_id, is_tagged_bluetooth)`.
fn describe(port_type: &SerialPortType) -> (String, String, bool) {
    match port_type {
        SerialPortType::UsbPort(UsbPortInfo {
            vid,
            pid,
            serial_number,
            manufacturer,
            product,
        }) => {
            let description = match (manufacturer, product) {
                (Some(m), Some(p)) => format!("{m} {p}"),
                (None, Some(p)) => p.clone(),
                (Some(m), None) => m.clone(),
                (None, None) => String::from("USB Serial Device"),
            };
            let mut hardware_id = format!("USB\\VID_{vid:04X}&PID_{pid:04X}");
            if let Some(serial) = serial_number {
                hardware_id.push('\\');
                hardware_id.push_str(serial);
            }
            (description, hardware_id, false)
        }
        SerialPortType::BluetoothPort => (
            String::from("Bluetooth Serial Port"),
            String::from("BLUETOOTH"),
            true,
        ),
        SerialPortType::PciPort => (String::from("PCI Serial Port"), String::from("PCI"), false),
        SerialPortType::Unknown => (String::new(), String::new(), false),
    }
}

/// A live `serialport` handle behind the [`SerialLink`] trait.
struct SerialportLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for SerialportLink {
    fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        if data.is_empty() {
            // A plain write(2) so the liveness probe reaches the handle;
            // write_all would short-circuit on an empty buffer.
            return self.port.write(data).map(|_| ());
        }
        self.port.write_all(data)
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if super::is_timeout_error(&e) => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn clear_input(&mut self) -> std::io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

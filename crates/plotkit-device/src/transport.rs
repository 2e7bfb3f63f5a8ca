//! Serial transport and EBB discovery
//!
//! Provides low-level serial port operations for direct hardware connection
//! to the EiBotBoard via USB.
//!
//! Supports:
//! - Port enumeration and EBB discovery by USB identity
//! - Blocking read/write with short timeouts, suitable for a polling IO loop
//! - An in-memory mock implementing the EBB's reply conventions for tests

use plotkit_core::{Error, Result, TransportError};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The EBB's fixed line rate
pub const EBB_BAUD: u32 = 9600;

/// USB vendor ID of the EiBotBoard
pub const EBB_VID: u16 = 0x04D8;

/// USB product ID of the EiBotBoard
pub const EBB_PID: u16 = 0xFD92;

/// Manufacturer substring reported by EBB firmware
pub const EBB_MANUFACTURER: &str = "SchmalzHaus";

/// Information about a discovered serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port path (e.g., "/dev/ttyACM0", "COM3")
    pub port_name: String,
    /// Manufacturer name if available
    pub manufacturer: Option<String>,
    /// USB vendor ID if applicable
    pub vid: Option<u16>,
    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl PortInfo {
    /// Whether this port looks like an EiBotBoard
    pub fn is_ebb(&self) -> bool {
        if let Some(manufacturer) = &self.manufacturer {
            if manufacturer.contains(EBB_MANUFACTURER) {
                return true;
            }
        }
        self.vid == Some(EBB_VID) && self.pid == Some(EBB_PID)
    }
}

/// List serial ports that look like EiBotBoards
pub fn list_ebb_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        TransportError::Io {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    let infos = ports
        .iter()
        .map(|port| {
            let mut info = PortInfo {
                port_name: port.port_name.clone(),
                manufacturer: None,
                vid: None,
                pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.manufacturer = usb.manufacturer.clone();
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
            }
            info
        })
        .filter(PortInfo::is_ebb)
        .collect();

    Ok(infos)
}

/// Choose the port to use: an explicit path wins, otherwise the first
/// discovered EBB
pub fn find_ebb_port(configured: Option<&str>) -> Result<String> {
    if let Some(path) = configured {
        return Ok(path.to_string());
    }
    let ports = list_ebb_ports()?;
    match ports.first() {
        Some(info) => {
            tracing::info!("Found EBB at {}", info.port_name);
            Ok(info.port_name.clone())
        }
        None => Err(TransportError::DeviceNotFound.into()),
    }
}

/// Byte transport to a board
///
/// `read` returns `Ok(0)` when no data arrived within the implementation's
/// short timeout; a hard error means the transport is gone and every
/// outstanding request must fail.
pub trait Transport: Send {
    /// Write all bytes
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Read available bytes; `Ok(0)` means none yet
    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Human-readable transport name for logs
    fn name(&self) -> String;
}

/// Real serial transport over the serialport crate
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl SerialTransport {
    /// Open a port at the EBB's line settings
    pub fn open(path: &str) -> Result<Self> {
        let port = serialport::new(path, EBB_BAUD)
            .timeout(Duration::from_millis(10))
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", path, e);
                Error::from(TransportError::FailedToOpen {
                    port: path.to_string(),
                    reason: e.to_string(),
                })
            })?;
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> String {
        self.path.clone()
    }
}

/// Scripted in-memory transport with EBB reply conventions
///
/// Records every command line it receives and answers like firmware would:
/// `V` with the configured version banner, `QM` with an idle status, and
/// everything else with `OK`. Tests inspect [`MockTransport::commands`]
/// afterwards for protocol conformance.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

struct MockState {
    version_banner: String,
    partial: Vec<u8>,
    replies: VecDeque<u8>,
    commands: Vec<String>,
    disconnected: bool,
}

impl MockTransport {
    /// A mock reporting the given firmware version
    pub fn with_version(version: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockState {
                version_banner: format!("EBBv13_and_above EB Firmware Version {}", version),
                partial: Vec::new(),
                replies: VecDeque::new(),
                commands: Vec::new(),
                disconnected: false,
            })),
        }
    }

    /// Every command line received so far
    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// Simulate the cable being pulled
    pub fn disconnect(&self) {
        self.inner.lock().unwrap().disconnected = true;
    }
}

impl MockState {
    fn respond(&mut self, command: &str) {
        let reply = match command.split(',').next().unwrap_or("") {
            "V" => format!("{}\r\n", self.version_banner),
            "QM" => "QM,0,0,0,0,0\r\n".to_string(),
            _ => "OK\r\n".to_string(),
        };
        self.replies.extend(reply.as_bytes());
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.inner.lock().unwrap();
        if state.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "disconnected"));
        }
        for &byte in data {
            if byte == b'\r' {
                let line = String::from_utf8_lossy(&state.partial).to_string();
                state.partial.clear();
                if !line.is_empty() {
                    state.commands.push(line.clone());
                    state.respond(&line);
                }
            } else {
                state.partial.push(byte);
            }
        }
        Ok(())
    }

    fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.inner.lock().unwrap();
        if state.disconnected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "disconnected"));
        }
        let mut n = 0;
        while n < buf.len() {
            match state.replies.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ebb_identity_by_manufacturer() {
        let info = PortInfo {
            port_name: "/dev/ttyACM0".to_string(),
            manufacturer: Some("SchmalzHaus LLC".to_string()),
            vid: None,
            pid: None,
        };
        assert!(info.is_ebb());
    }

    #[test]
    fn test_ebb_identity_by_usb_ids() {
        let info = PortInfo {
            port_name: "/dev/ttyACM1".to_string(),
            manufacturer: Some("Microchip".to_string()),
            vid: Some(0x04D8),
            pid: Some(0xFD92),
        };
        assert!(info.is_ebb());
    }

    #[test]
    fn test_non_ebb_rejected() {
        let info = PortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            manufacturer: Some("FTDI".to_string()),
            vid: Some(0x0403),
            pid: Some(0x6001),
        };
        assert!(!info.is_ebb());
    }

    #[test]
    fn test_configured_port_wins() {
        let port = find_ebb_port(Some("/dev/ttyACM7")).unwrap();
        assert_eq!(port, "/dev/ttyACM7");
    }

    #[test]
    fn test_mock_replies_ok_to_mutations() {
        let mut mock = MockTransport::with_version("2.7.0");
        mock.write_all(b"EM,1,1\r").unwrap();
        let mut buf = [0u8; 16];
        let n = mock.read_some(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"OK\r\n");
        assert_eq!(mock.commands(), vec!["EM,1,1".to_string()]);
    }

    #[test]
    fn test_mock_version_banner() {
        let mut mock = MockTransport::with_version("2.5.3");
        mock.write_all(b"V\r").unwrap();
        let mut buf = [0u8; 64];
        let n = mock.read_some(&mut buf).unwrap();
        let reply = String::from_utf8_lossy(&buf[..n]);
        assert!(reply.trim_end().ends_with("2.5.3"));
    }
}

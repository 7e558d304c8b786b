//! Transport layer abstraction.
//!
//! Defines the `IoStream` trait for byte-oriented device communication,
//! allowing different implementations (serial, BLE, mock, etc.).

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open transport: {0}")]
    OpenFailed(String),

    #[error("Invalid transport configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation not supported by this transport: {operation}")]
    Unsupported { operation: &'static str },

    #[error("Device disconnected")]
    Disconnected,

    #[error("Transport already closed")]
    Closed,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Kind of link behind an `IoStream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Serial,
    Ble,
    Custom,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Serial => write!(f, "serial"),
            TransportKind::Ble => write!(f, "ble"),
            TransportKind::Custom => write!(f, "custom"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

/// Queue selector for `IoStream::purge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    All,
}

/// Line settings for a serial-style link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialConfig {
    pub baudrate: u32,
    pub databits: u8,
    pub parity: Parity,
    pub stopbits: StopBits,
    pub flowcontrol: FlowControl,
}

impl SerialConfig {
    /// 8 data bits, no parity, one stop bit, no flow control.
    pub fn new_8n1(baudrate: u32) -> Self {
        Self {
            baudrate,
            databits: 8,
            parity: Parity::None,
            stopbits: StopBits::One,
            flowcontrol: FlowControl::None,
        }
    }
}

impl fmt::Display for SerialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stopbits = match self.stopbits {
            StopBits::One => "1",
            StopBits::OneAndHalf => "1.5",
            StopBits::Two => "2",
        };
        write!(f, "{} {}{}{}", self.baudrate, self.databits, parity, stopbits)
    }
}

/// Abstract duplex byte channel to a dive computer.
///
/// Device sessions only ever talk to a `Box<dyn IoStream>`, so the
/// concrete backend is chosen by whoever opens the connection:
/// - Serial UART (termios)
/// - BLE GATT, wrapping a platform link object
/// - Mock implementation for unit testing
pub trait IoStream: Send {
    /// Backend tag.
    fn kind(&self) -> TransportKind;

    /// Apply line settings.
    ///
    /// Links without a UART (BLE) accept this as a no-op.
    fn configure(&mut self, _config: &SerialConfig) -> Result<(), TransportError> {
        Err(TransportError::Unsupported {
            operation: "configure",
        })
    }

    /// Per-call timeout for `read`/`write`. `None` blocks indefinitely.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError>;

    /// Read up to `buf.len()` bytes, blocking at most the configured timeout.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Backend specific control request.
    fn ioctl(&mut self, _request: u32, _data: &mut [u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported { operation: "ioctl" })
    }

    fn sleep(&mut self, duration: Duration) -> Result<(), TransportError> {
        std::thread::sleep(duration);
        Ok(())
    }

    /// Discard buffered data in the given direction(s).
    fn purge(&mut self, _direction: Direction) -> Result<(), TransportError> {
        Err(TransportError::Unsupported { operation: "purge" })
    }

    /// Release the backend. Must free resources even when it reports an error.
    fn close(&mut self) -> Result<(), TransportError>;

    /// Read until `buf` is full.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut nbytes = 0;
        while nbytes < buf.len() {
            let n = self.read(&mut buf[nbytes..])?;
            if n == 0 {
                return Err(TransportError::Disconnected);
            }
            nbytes += n;
        }
        Ok(())
    }

    /// Write all of `data`.
    fn write_all(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut nbytes = 0;
        while nbytes < data.len() {
            let n = self.write(&data[nbytes..])?;
            if n == 0 {
                return Err(TransportError::Disconnected);
            }
            nbytes += n;
        }
        Ok(())
    }
}

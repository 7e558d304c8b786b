//! Transport layer module.

pub mod ble;
pub mod mock;
#[cfg(unix)]
pub mod serial;
pub mod traits;

pub use ble::{BleLink, BleManager, BleTransport, open_ble};
pub use mock::MockTransport;
#[cfg(unix)]
pub use serial::SerialTransport;
pub use traits::{
    Direction, FlowControl, IoStream, Parity, SerialConfig, StopBits, TransportError,
    TransportKind,
};

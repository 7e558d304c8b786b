//! Divelink-Core: dive computer download protocols in Rust.
//!
//! This crate talks to dive computers over serial or BLE links, downloads
//! their memory and splits it into individual dives.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: byte stream abstraction (termios serial, BLE, mock)
//! - **Context**: log routing and cooperative cancellation
//! - **Events**: Observer pattern for UI decoupling
//! - **Device**: vendor protocol sessions behind the `Device` trait
//! - **Descriptor**: table of supported models
//! - **Config**: TOML session settings
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use divelink_core::{Context, descriptor, open_device};
//! use divelink_core::transport::SerialTransport;
//!
//! let descriptor = descriptor::identify("Sensus").unwrap();
//! let transport = SerialTransport::open("/dev/ttyUSB0").unwrap();
//! let context = Arc::new(Context::new());
//! let mut device = open_device(context, &descriptor, Box::new(transport)).unwrap();
//!
//! device
//!     .foreach(&mut |dive| {
//!         println!("dive of {} bytes", dive.data.len());
//!         true
//!     })
//!     .expect("download failed");
//! device.close().unwrap();
//! ```

pub mod array;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod events;
pub mod transport;

// Re-exports for convenience
pub use config::{ConfigError, SessionConfig};
pub use context::{Context, LogLevel};
pub use descriptor::Descriptor;
pub use device::reefnet_sensus::{extract_dives, get_handshake};
pub use device::{Device, Dive, DiveCallback, Family, SensusDevice, open_device};
pub use error::DeviceError;
pub use events::{
    Clock, DevInfo, DeviceEvent, DeviceObserver, EventMask, Progress, TracingObserver,
};
pub use transport::{IoStream, MockTransport, TransportError, TransportKind};

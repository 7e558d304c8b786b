//! Device sessions.
//!
//! A device session owns the transport it was opened on and exposes the
//! vendor protocol through the `Device` trait. `open_device` picks the
//! implementation from a descriptor's family.

pub mod reefnet_sensus;

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::context::Context;
use crate::descriptor::Descriptor;
use crate::error::DeviceError;
use crate::events::{Clock, DevInfo, DeviceObserver, EventChannel, EventMask};
use crate::transport::IoStream;

pub use reefnet_sensus::SensusDevice;

/// Protocol family of a dive computer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    ReefnetSensus,
    ReefnetSensusPro,
    ReefnetSensusUltra,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::ReefnetSensus => write!(f, "reefnet_sensus"),
            Family::ReefnetSensusPro => write!(f, "reefnet_sensuspro"),
            Family::ReefnetSensusUltra => write!(f, "reefnet_sensusultra"),
        }
    }
}

/// One dive inside a memory dump.
///
/// Both slices borrow the dump and are only valid during the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dive<'a> {
    /// Raw dive bytes, header included.
    pub data: &'a [u8],
    /// Bytes identifying this dive, suitable for `set_fingerprint`.
    pub fingerprint: &'a [u8],
    /// Dive start in device clock seconds, decoded from the fingerprint.
    pub timestamp: u32,
}

/// Visitor invoked once per dive. Return `false` to stop the scan.
pub type DiveCallback<'c> = dyn FnMut(&Dive<'_>) -> bool + 'c;

/// State shared by every protocol implementation.
#[derive(Debug)]
pub struct DeviceBase {
    pub context: Arc<Context>,
    pub events: EventChannel,
}

impl DeviceBase {
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            events: EventChannel::new(),
        }
    }
}

/// A connected dive computer.
pub trait Device: Send {
    fn family(&self) -> Family;

    fn base(&self) -> &DeviceBase;

    fn base_mut(&mut self) -> &mut DeviceBase;

    /// Access to the concrete session for vendor specific calls.
    fn as_any(&self) -> &dyn Any;

    /// Only dives newer than the one identified by `data` are reported.
    /// An empty slice clears the fingerprint.
    fn set_fingerprint(&mut self, _data: &[u8]) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            operation: "set_fingerprint",
        })
    }

    /// Read device memory at `address`.
    fn read(&mut self, _address: u32, _data: &mut [u8]) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported { operation: "read" })
    }

    fn write(&mut self, _address: u32, _data: &[u8]) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported { operation: "write" })
    }

    /// Download the whole memory into `buffer`.
    ///
    /// `buffer` is cleared first and only filled once the data has been
    /// validated.
    fn dump(&mut self, _buffer: &mut Vec<u8>) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported { operation: "dump" })
    }

    /// Download and report every dive newer than the fingerprint, newest first.
    fn foreach(&mut self, _callback: &mut DiveCallback<'_>) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            operation: "foreach",
        })
    }

    /// Override the transport read timeout chosen at open.
    fn set_timeout(&mut self, _timeout: Duration) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            operation: "set_timeout",
        })
    }

    fn timesync(&mut self, _datetime: &DateTime<Utc>) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported {
            operation: "timesync",
        })
    }

    /// Shut down the session and close the transport.
    ///
    /// The transport is released even when an error is returned.
    fn close(self: Box<Self>) -> Result<(), DeviceError>;

    fn set_events(&mut self, mask: EventMask, observer: Arc<dyn DeviceObserver>) {
        self.base_mut().events.subscribe(mask, observer);
    }

    /// Device info from the most recent handshake.
    fn devinfo(&self) -> Option<DevInfo> {
        self.base().events.devinfo()
    }

    /// Clock calibration from the most recent handshake.
    fn clock(&self) -> Option<Clock> {
        self.base().events.clock()
    }
}

/// Open a session for `descriptor` on `transport`.
///
/// The transport is moved into the session. If no protocol implementation
/// exists for the family, or opening fails, the transport is closed.
pub fn open_device(
    context: Arc<Context>,
    descriptor: &Descriptor,
    mut transport: Box<dyn IoStream>,
) -> Result<Box<dyn Device>, DeviceError> {
    info!(
        vendor = descriptor.vendor,
        product = descriptor.product,
        family = %descriptor.family,
        transport = %transport.kind(),
        "Opening device"
    );

    match descriptor.family {
        Family::ReefnetSensus => {
            let device = SensusDevice::open(context, transport)?;
            Ok(Box::new(device))
        }
        family => {
            if let Err(e) = transport.close() {
                warn!(error = %e, "Failed to close transport");
            }
            context.error(&format!("No protocol implementation for {family}."));
            Err(DeviceError::Unsupported { operation: "open" })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor;
    use crate::transport::MockTransport;

    fn open(
        mock: &MockTransport,
        family: Family,
        model: u32,
    ) -> Result<Box<dyn Device>, DeviceError> {
        let descriptor = descriptor::find(family, model).unwrap();
        let transport = Box::new(mock.clone());
        open_device(Arc::new(Context::new()), &descriptor, transport)
    }

    #[test]
    fn test_open_sensus_by_descriptor() {
        let mock = MockTransport::new();
        let device = open(&mock, Family::ReefnetSensus, 1).unwrap();
        assert_eq!(device.family(), Family::ReefnetSensus);
        assert_eq!(device.devinfo(), None);

        device.close().unwrap();
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_unimplemented_family_closes_transport() {
        let mock = MockTransport::new();
        let result = open(&mock, Family::ReefnetSensusUltra, 3);
        assert!(matches!(
            result,
            Err(DeviceError::Unsupported { operation: "open" })
        ));
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn test_unsupported_defaults() {
        let mock = MockTransport::new();
        let mut device = open(&mock, Family::ReefnetSensus, 1).unwrap();

        let mut data = [0u8; 4];
        assert!(matches!(
            device.read(0, &mut data),
            Err(DeviceError::Unsupported { operation: "read" })
        ));
        let err = device.timesync(&Utc::now()).unwrap_err();
        assert_eq!(err.to_string(), "Operation not supported: timesync");
    }
}

//! BLE transport built on a platform-supplied GATT link.
//!
//! Scanning, connecting and characteristic plumbing live in the host
//! platform. This module only defines the contract that platform code
//! implements and adapts a connected link to `IoStream`.

use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::traits::{Direction, IoStream, SerialConfig, TransportError, TransportKind};

/// A single platform BLE connection object.
pub trait BleLink: Send {
    fn connect(&mut self, address: &str) -> Result<(), TransportError>;

    fn discover_services(&mut self) -> Result<(), TransportError>;

    /// Subscribe to the notify characteristic that carries device data.
    fn enable_notifications(&mut self) -> Result<(), TransportError>;

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError>;

    /// Copy received notification bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write to the data characteristic.
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    fn ioctl(&mut self, _request: u32, _data: &mut [u8]) -> Result<(), TransportError> {
        Err(TransportError::Unsupported { operation: "ioctl" })
    }

    /// Unsubscribe and disconnect.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Factory for platform links.
///
/// Constructed once by the application and passed by reference to
/// `open_ble`, so there is no process-wide manager.
pub trait BleManager {
    type Link: BleLink;

    fn create_link(&self) -> Result<Self::Link, TransportError>;
}

/// `IoStream` over a connected BLE link.
pub struct BleTransport<L: BleLink> {
    link: L,
    address: String,
    closed: bool,
}

impl<L: BleLink> BleTransport<L> {
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Connect to `address` and return a ready transport.
///
/// Connection, service discovery and notification setup all complete
/// before the transport is handed out. On failure the link is closed.
#[instrument(skip(manager), level = "info")]
pub fn open_ble<M: BleManager>(
    manager: &M,
    address: &str,
) -> Result<BleTransport<M::Link>, TransportError> {
    let mut link = manager.create_link()?;

    let setup = link
        .connect(address)
        .and_then(|_| link.discover_services())
        .and_then(|_| link.enable_notifications());

    if let Err(e) = setup {
        warn!(address = %address, error = %e, "BLE setup failed");
        if let Err(close_err) = link.close() {
            debug!(error = %close_err, "Ignoring close error after failed setup");
        }
        return Err(e);
    }

    info!(address = %address, "BLE link ready");

    Ok(BleTransport {
        link,
        address: address.to_string(),
        closed: false,
    })
}

impl<L: BleLink> IoStream for BleTransport<L> {
    fn kind(&self) -> TransportKind {
        TransportKind::Ble
    }

    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        // No UART on the other end of a GATT link.
        debug!(config = %config, "Ignoring line settings on BLE link");
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.link.set_timeout(timeout)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.link.read(buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.link.write(data)
    }

    fn ioctl(&mut self, request: u32, data: &mut [u8]) -> Result<(), TransportError> {
        self.link.ioctl(request, data)
    }

    fn purge(&mut self, _direction: Direction) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!(address = %self.address, "Closing BLE link");
        self.link.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        rx: VecDeque<u8>,
        fail_on: Option<&'static str>,
    }

    struct FakeLink(Arc<Mutex<Recorder>>);

    impl FakeLink {
        fn step(&mut self, name: &'static str) -> Result<(), TransportError> {
            let mut rec = self.0.lock().unwrap();
            rec.calls.push(name.to_string());
            if rec.fail_on == Some(name) {
                return Err(TransportError::OpenFailed(name.to_string()));
            }
            Ok(())
        }
    }

    impl BleLink for FakeLink {
        fn connect(&mut self, _address: &str) -> Result<(), TransportError> {
            self.step("connect")
        }
        fn discover_services(&mut self) -> Result<(), TransportError> {
            self.step("discover")
        }
        fn enable_notifications(&mut self) -> Result<(), TransportError> {
            self.step("notify")
        }
        fn set_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), TransportError> {
            self.step("timeout")
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let mut rec = self.0.lock().unwrap();
            let n = buf.len().min(rec.rx.len());
            for (dst, src) in buf.iter_mut().zip(rec.rx.drain(..n)) {
                *dst = src;
            }
            Ok(n)
        }
        fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
            Ok(data.len())
        }
        fn close(&mut self) -> Result<(), TransportError> {
            self.step("close")
        }
    }

    struct FakeManager(Arc<Mutex<Recorder>>);

    impl BleManager for FakeManager {
        type Link = FakeLink;

        fn create_link(&self) -> Result<FakeLink, TransportError> {
            Ok(FakeLink(self.0.clone()))
        }
    }

    #[test]
    fn test_open_runs_setup_in_order() {
        let rec = Arc::new(Mutex::new(Recorder::default()));
        let manager = FakeManager(rec.clone());

        let mut transport = open_ble(&manager, "AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(transport.kind(), TransportKind::Ble);
        assert_eq!(transport.address(), "AA:BB:CC:DD:EE:FF");

        // Line settings and purge are accepted without touching the link.
        transport.configure(&SerialConfig::new_8n1(19200)).unwrap();
        transport.purge(Direction::All).unwrap();

        transport.close().unwrap();
        transport.close().unwrap();

        let calls = rec.lock().unwrap().calls.clone();
        assert_eq!(calls, vec!["connect", "discover", "notify", "close"]);
    }

    #[test]
    fn test_open_failure_closes_link() {
        let rec = Arc::new(Mutex::new(Recorder {
            fail_on: Some("discover"),
            ..Default::default()
        }));
        let manager = FakeManager(rec.clone());

        assert!(open_ble(&manager, "device").is_err());

        let calls = rec.lock().unwrap().calls.clone();
        assert_eq!(calls, vec!["connect", "discover", "close"]);
    }

    #[test]
    fn test_read_after_close_fails() {
        let rec = Arc::new(Mutex::new(Recorder::default()));
        rec.lock().unwrap().rx.extend([1u8, 2, 3]);
        let manager = FakeManager(rec);

        let mut transport = open_ble(&manager, "device").unwrap();
        let mut buf = [0u8; 3];
        transport.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);

        transport.close().unwrap();
        assert!(matches!(
            transport.read(&mut buf),
            Err(TransportError::Closed)
        ));
    }
}

//! Reefnet Sensus serial dive logger.

pub mod extract;
pub mod protocol;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::array::uint32_le;
use crate::context::{Context, LogLevel};
use crate::device::{Device, DeviceBase, DiveCallback, Family};
use crate::error::DeviceError;
use crate::events::{Clock, DevInfo, DeviceEvent, Progress};
use crate::transport::{Direction, IoStream, SerialConfig, TransportError};

pub use extract::extract_dives;
use protocol::*;

/// Session with a Sensus logger.
///
/// After a successful handshake the logger sits waiting for a command;
/// closing the session in that state sends it back to sleep first.
pub struct SensusDevice {
    base: DeviceBase,
    transport: Option<Box<dyn IoStream>>,
    handshake: [u8; SZ_HANDSHAKE],
    waiting: bool,
    /// Fingerprint cursor: dives at or before this device time are skipped.
    timestamp: u32,
    devtime: u32,
    systime: Option<i64>,
}

impl SensusDevice {
    /// Bind `transport` and apply the line settings.
    ///
    /// On failure the transport is closed before the error is returned.
    #[instrument(skip_all, fields(transport = %transport.kind()))]
    pub fn open(context: Arc<Context>, transport: Box<dyn IoStream>) -> Result<Self, DeviceError> {
        let mut device = Self {
            base: DeviceBase::new(context),
            transport: Some(transport),
            handshake: [0; SZ_HANDSHAKE],
            waiting: false,
            timestamp: 0,
            devtime: 0,
            systime: None,
        };

        if let Err(e) = device.setup() {
            if let Err(close_err) = device.shutdown() {
                debug!(error = %close_err, "Ignoring close error after failed open");
            }
            return Err(e);
        }

        info!("Sensus session opened");
        Ok(device)
    }

    fn setup(&mut self) -> Result<(), DeviceError> {
        let context = &self.base.context;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(TransportError::Closed)?;

        transport
            .configure(&SerialConfig::new_8n1(BAUDRATE))
            .inspect_err(|_| context.error("Failed to set the terminal attributes."))?;

        transport
            .set_timeout(Some(Duration::from_millis(TIMEOUT_MS)))
            .inspect_err(|_| context.error("Failed to set the timeout."))?;

        // Make sure everything is in a sane state.
        if let Err(e) = transport.purge(Direction::All) {
            debug!(error = %e, "Purge not available");
        }

        Ok(())
    }

    /// The 10-byte record from the last handshake (zeros before the first).
    pub fn handshake(&self) -> &[u8; SZ_HANDSHAKE] {
        &self.handshake
    }

    /// Whether the logger is waiting for a command.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn fingerprint(&self) -> u32 {
        self.timestamp
    }

    /// Host time captured at the last handshake.
    pub fn systime(&self) -> Option<i64> {
        self.systime
    }

    pub fn devtime(&self) -> u32 {
        self.devtime
    }

    /// Wake the logger up and record its identity and clock.
    #[instrument(skip(self))]
    fn wake_up(&mut self) -> Result<(), DeviceError> {
        let context = &self.base.context;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(TransportError::Closed)?;

        transport
            .write_all(&[CMD_HANDSHAKE])
            .inspect_err(|_| context.error("Failed to send the command."))?;

        let mut answer = [0u8; Handshake::SIZE];
        transport
            .read_exact(&mut answer)
            .inspect_err(|_| context.error("Failed to receive the handshake."))?;
        let systime = Utc::now().timestamp();

        let handshake = Handshake::from_bytes(&answer)
            .inspect_err(|e| context.error(&e.to_string()))?;

        context.hexdump(LogLevel::Debug, "Handshake", &handshake.data);

        // The device is now waiting for a data request.
        self.waiting = true;

        self.systime = Some(systime);
        self.devtime = handshake.devtime;
        self.handshake = handshake.data;

        self.base.events.emit(&DeviceEvent::Clock(Clock {
            devtime: self.devtime,
            systime,
        }));
        self.base.events.emit(&DeviceEvent::DevInfo(DevInfo {
            model: handshake.model,
            firmware: handshake.firmware,
            serial: u32::from(handshake.serial),
        }));
        self.base.events.emit(&DeviceEvent::Vendor(&self.handshake));

        info!(
            model = handshake.model,
            firmware = handshake.firmware,
            serial = handshake.serial,
            devtime = handshake.devtime,
            "Handshake complete"
        );

        // Give the data line time to clear before the host transmits.
        transport.sleep(Duration::from_millis(HANDSHAKE_DELAY_MS))?;

        Ok(())
    }

    /// Send the logger back to sleep without transferring data.
    fn cancel(&mut self) -> Result<(), DeviceError> {
        let context = &self.base.context;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(TransportError::Closed)?;

        transport
            .write_all(&[CMD_CANCEL])
            .inspect_err(|_| context.error("Failed to send the command."))?;

        self.waiting = false;
        Ok(())
    }

    /// Cancel a pending handshake, then close the transport.
    ///
    /// The first error is returned; the transport is released regardless.
    fn shutdown(&mut self) -> Result<(), DeviceError> {
        let mut status = Ok(());

        if self.waiting
            && let Err(e) = self.cancel()
        {
            warn!(error = %e, "Failed to cancel the handshake");
            status = Err(e);
        }

        if let Some(mut transport) = self.transport.take()
            && let Err(e) = transport.close()
        {
            warn!(error = %e, "Failed to close the transport");
            if status.is_ok() {
                status = Err(e.into());
            }
        }

        status
    }
}

impl Device for SensusDevice {
    fn family(&self) -> Family {
        Family::ReefnetSensus
    }

    fn base(&self) -> &DeviceBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut DeviceBase {
        &mut self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn set_fingerprint(&mut self, data: &[u8]) -> Result<(), DeviceError> {
        match data.len() {
            0 => self.timestamp = 0,
            4 => self.timestamp = uint32_le(data),
            n => {
                return Err(DeviceError::InvalidArgs(format!(
                    "fingerprint must be 0 or 4 bytes, got {n}"
                )));
            }
        }
        debug!(timestamp = self.timestamp, "Fingerprint set");
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), DeviceError> {
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(TransportError::Closed)?;
        transport.set_timeout(Some(timeout))?;
        debug!(
            timeout_ms = timeout.as_millis() as u64,
            "Timeout overridden"
        );
        Ok(())
    }

    #[instrument(skip_all)]
    fn dump(&mut self, buffer: &mut Vec<u8>) -> Result<(), DeviceError> {
        buffer.clear();
        if buffer.try_reserve(SZ_MEMORY).is_err() {
            let context = &self.base.context;
            context.error("Insufficient buffer space available.");
            return Err(DeviceError::NoMemory);
        }

        let mut progress = Progress {
            current: 0,
            maximum: SZ_DUMP_ANSWER as u32,
        };
        self.base.events.emit(&DeviceEvent::Progress(progress));

        self.wake_up()?;

        let context = &self.base.context;
        let transport = self
            .transport
            .as_deref_mut()
            .ok_or(TransportError::Closed)?;

        transport
            .write_all(&[CMD_DUMP])
            .inspect_err(|_| context.error("Failed to send the command."))?;

        // The device leaves the waiting state.
        self.waiting = false;

        let mut answer = vec![0u8; SZ_DUMP_ANSWER];
        let mut nbytes = 0;
        while nbytes < answer.len() {
            if context.is_cancelled() {
                info!(nbytes, "Dump cancelled");
                return Err(DeviceError::Cancelled);
            }

            let len = (answer.len() - nbytes).min(SZ_PACKET);
            transport
                .read_exact(&mut answer[nbytes..nbytes + len])
                .inspect_err(|_| context.error("Failed to receive the answer."))?;

            progress.current += len as u32;
            self.base.events.emit(&DeviceEvent::Progress(progress));

            nbytes += len;
        }

        let payload = verify_dump(&answer)
            .inspect_err(|e| self.base.context.error(&e.to_string()))?;
        buffer.extend_from_slice(payload);

        info!(bytes = payload.len(), "Memory dump complete");
        Ok(())
    }

    #[instrument(skip_all)]
    fn foreach(&mut self, callback: &mut DiveCallback<'_>) -> Result<(), DeviceError> {
        let mut buffer = Vec::with_capacity(SZ_MEMORY);
        self.dump(&mut buffer)?;
        extract_dives(&buffer, Some(self.timestamp), callback)
            .inspect_err(|e| self.base.context.error(&e.to_string()))
    }

    fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        self.shutdown()
    }
}

/// Handshake record of a session opened through `open_device`.
///
/// Fails with `InvalidArgs` when `device` is not a Sensus session.
pub fn get_handshake(device: &dyn Device) -> Result<&[u8; SZ_HANDSHAKE], DeviceError> {
    let Some(sensus) = device.as_any().downcast_ref::<SensusDevice>() else {
        let message = format!("{} is not a Sensus", device.family());
        return Err(DeviceError::InvalidArgs(message));
    };
    Ok(sensus.handshake())
}

impl Drop for SensusDevice {
    fn drop(&mut self) {
        if self.transport.is_some()
            && let Err(e) = self.shutdown()
        {
            warn!(error = %e, "Error while closing an unclosed session");
        }
    }
}

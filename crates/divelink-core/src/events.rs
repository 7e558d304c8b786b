//! Event system for UI decoupling.
//!
//! Device sessions publish progress, clock, device info and vendor
//! events; CLI/GUI layers subscribe through `DeviceObserver` without
//! tight coupling to the protocol code.

use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::array::to_hex;

/// Transfer progress in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub current: u32,
    pub maximum: u32,
}

/// Identity reported by the device during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DevInfo {
    pub model: u32,
    pub firmware: u32,
    pub serial: u32,
}

/// Clock calibration pair: device ticks and host unix time captured together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Clock {
    pub devtime: u32,
    pub systime: i64,
}

/// Events emitted by a device session.
///
/// Borrowed payloads are only valid for the duration of the
/// `on_event` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent<'a> {
    /// Device is waiting for user action.
    Waiting,
    Progress(Progress),
    DevInfo(DevInfo),
    Clock(Clock),
    /// Raw vendor specific data.
    Vendor(&'a [u8]),
}

impl DeviceEvent<'_> {
    pub fn mask(&self) -> EventMask {
        match self {
            DeviceEvent::Waiting => EventMask::WAITING,
            DeviceEvent::Progress(_) => EventMask::PROGRESS,
            DeviceEvent::DevInfo(_) => EventMask::DEVINFO,
            DeviceEvent::Clock(_) => EventMask::CLOCK,
            DeviceEvent::Vendor(_) => EventMask::VENDOR,
        }
    }
}

/// Set of event types an observer wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventMask(u32);

impl EventMask {
    pub const NONE: Self = Self(0);
    pub const WAITING: Self = Self(1 << 0);
    pub const PROGRESS: Self = Self(1 << 1);
    pub const DEVINFO: Self = Self(1 << 2);
    pub const CLOCK: Self = Self(1 << 3);
    pub const VENDOR: Self = Self(1 << 4);
    pub const ALL: Self = Self(0x1F);

    pub fn contains(self, other: EventMask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Observer trait for receiving device events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DeviceObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DeviceEvent<'_>);
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DeviceObserver for TracingObserver {
    fn on_event(&self, event: &DeviceEvent<'_>) {
        match event {
            DeviceEvent::Waiting => {
                tracing::info!("Waiting for user action");
            }
            DeviceEvent::Progress(progress) => {
                let pct = u64::from(progress.current) * 100 / u64::from(progress.maximum.max(1));
                tracing::debug!(
                    current = progress.current,
                    maximum = progress.maximum,
                    progress = %format!("{}%", pct),
                    "Progress"
                );
            }
            DeviceEvent::DevInfo(devinfo) => {
                tracing::info!(
                    model = devinfo.model,
                    firmware = devinfo.firmware,
                    serial = devinfo.serial,
                    "Device info"
                );
            }
            DeviceEvent::Clock(clock) => {
                tracing::info!(
                    devtime = clock.devtime,
                    systime = clock.systime,
                    "Device clock"
                );
            }
            DeviceEvent::Vendor(data) => {
                tracing::debug!(len = data.len(), data = %to_hex(data), "Vendor data");
            }
        }
    }
}

impl fmt::Debug for dyn DeviceObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceObserver")
    }
}

/// Per-session event dispatch with cached device info and clock.
#[derive(Debug, Default)]
pub struct EventChannel {
    mask: EventMask,
    observer: Option<Arc<dyn DeviceObserver>>,
    devinfo: Option<DevInfo>,
    clock: Option<Clock>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, mask: EventMask, observer: Arc<dyn DeviceObserver>) {
        self.mask = mask;
        self.observer = Some(observer);
    }

    pub fn unsubscribe(&mut self) {
        self.mask = EventMask::NONE;
        self.observer = None;
    }

    /// Last device info seen, whether or not anyone subscribed.
    pub fn devinfo(&self) -> Option<DevInfo> {
        self.devinfo
    }

    /// Last clock calibration seen.
    pub fn clock(&self) -> Option<Clock> {
        self.clock
    }

    /// Publish an event.
    ///
    /// Panics on an inconsistent progress payload; that is a bug in the
    /// emitting protocol code.
    pub fn emit(&mut self, event: &DeviceEvent<'_>) {
        if let DeviceEvent::Progress(progress) = event {
            assert!(progress.maximum != 0, "progress maximum must be nonzero");
            assert!(
                progress.current <= progress.maximum,
                "progress current {} exceeds maximum {}",
                progress.current,
                progress.maximum
            );
        }

        match event {
            DeviceEvent::DevInfo(devinfo) => self.devinfo = Some(*devinfo),
            DeviceEvent::Clock(clock) => self.clock = Some(*clock),
            _ => {}
        }

        let Some(observer) = &self.observer else {
            return;
        };
        if !self.mask.contains(event.mask()) {
            return;
        }
        observer.on_event(event);
    }
}

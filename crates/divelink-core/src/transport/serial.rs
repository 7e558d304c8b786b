//! termios-based serial transport implementation.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::termios::{
    BaudRate, ControlFlags, FlushArg, InputFlags, SetArg, cfmakeraw, cfsetspeed, tcdrain,
    tcflush, tcgetattr, tcsetattr,
};
use tracing::{debug, info, instrument, trace};

use super::traits::{
    Direction, FlowControl, IoStream, Parity, SerialConfig, StopBits, TransportError,
    TransportKind,
};

fn os_error(errno: Errno) -> TransportError {
    TransportError::Io(errno.into())
}

fn baud_rate(baudrate: u32) -> Result<BaudRate, TransportError> {
    let rate = match baudrate {
        1200 => BaudRate::B1200,
        2400 => BaudRate::B2400,
        4800 => BaudRate::B4800,
        9600 => BaudRate::B9600,
        19200 => BaudRate::B19200,
        38400 => BaudRate::B38400,
        57600 => BaudRate::B57600,
        115200 => BaudRate::B115200,
        230400 => BaudRate::B230400,
        other => {
            return Err(TransportError::InvalidConfig(format!(
                "unsupported baud rate {other}"
            )));
        }
    };
    Ok(rate)
}

/// Serial UART transport.
pub struct SerialTransport {
    file: Option<File>,
    path: String,
    timeout: Option<Duration>,
}

impl SerialTransport {
    /// Open a tty device node, e.g. `/dev/ttyUSB0`.
    #[instrument(level = "info")]
    pub fn open(path: &str) -> Result<Self, TransportError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_NOCTTY.bits() | OFlag::O_NONBLOCK.bits())
            .open(path)
            .map_err(|e| TransportError::OpenFailed(format!("{path}: {e}")))?;

        // Start from a raw line discipline; the session applies its own settings.
        let mut termios = tcgetattr(&file).map_err(os_error)?;
        cfmakeraw(&mut termios);
        termios.control_flags |= ControlFlags::CLOCAL | ControlFlags::CREAD;
        tcsetattr(&file, SetArg::TCSANOW, &termios).map_err(os_error)?;

        info!(path = %path, "Serial port opened");

        Ok(Self {
            file: Some(file),
            path: path.to_string(),
            timeout: None,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File, TransportError> {
        self.file.as_mut().ok_or(TransportError::Closed)
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.map_or(0, |t| t.as_millis() as u64)
    }

    /// Wait until the port is ready for `flags`. Returns false on timeout.
    fn wait_ready(&mut self, flags: PollFlags) -> Result<bool, TransportError> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let file = self.file()?;
        loop {
            let timeout = match deadline {
                None => PollTimeout::NONE,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    let ms = remaining.as_millis().min(u128::from(u16::MAX)) as u16;
                    PollTimeout::from(ms)
                }
            };

            let mut fds = [PollFd::new(file.as_fd(), flags)];
            match poll(&mut fds, timeout) {
                Ok(0) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Ok(false);
                    }
                }
                Ok(_) => return Ok(true),
                Err(Errno::EINTR) => {}
                Err(e) => return Err(os_error(e)),
            }
        }
    }
}

impl IoStream for SerialTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    #[instrument(skip_all, fields(path = %self.path, config = %config))]
    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        let rate = baud_rate(config.baudrate)?;
        let file = self.file()?;
        let mut termios = tcgetattr(&*file).map_err(os_error)?;

        cfsetspeed(&mut termios, rate).map_err(os_error)?;

        termios.control_flags &= !ControlFlags::CSIZE;
        termios.control_flags |= match config.databits {
            5 => ControlFlags::CS5,
            6 => ControlFlags::CS6,
            7 => ControlFlags::CS7,
            8 => ControlFlags::CS8,
            other => {
                return Err(TransportError::InvalidConfig(format!(
                    "unsupported data bits {other}"
                )));
            }
        };

        termios.control_flags &= !(ControlFlags::PARENB | ControlFlags::PARODD);
        termios.input_flags &= !(InputFlags::INPCK | InputFlags::IGNPAR);
        match config.parity {
            Parity::None => termios.input_flags |= InputFlags::IGNPAR,
            Parity::Even => {
                termios.control_flags |= ControlFlags::PARENB;
                termios.input_flags |= InputFlags::INPCK;
            }
            Parity::Odd => {
                termios.control_flags |= ControlFlags::PARENB | ControlFlags::PARODD;
                termios.input_flags |= InputFlags::INPCK;
            }
            Parity::Mark | Parity::Space => {
                return Err(TransportError::InvalidConfig(
                    "mark/space parity not supported".into(),
                ));
            }
        }

        match config.stopbits {
            StopBits::One => termios.control_flags &= !ControlFlags::CSTOPB,
            StopBits::Two => termios.control_flags |= ControlFlags::CSTOPB,
            StopBits::OneAndHalf => {
                return Err(TransportError::InvalidConfig(
                    "1.5 stop bits not supported".into(),
                ));
            }
        }

        termios.control_flags &= !ControlFlags::CRTSCTS;
        termios.input_flags &= !(InputFlags::IXON | InputFlags::IXOFF | InputFlags::IXANY);
        match config.flowcontrol {
            FlowControl::None => {}
            FlowControl::Hardware => termios.control_flags |= ControlFlags::CRTSCTS,
            FlowControl::Software => {
                termios.input_flags |= InputFlags::IXON | InputFlags::IXOFF;
            }
        }

        tcsetattr(&*file, SetArg::TCSANOW, &termios).map_err(os_error)?;
        debug!("Line settings applied");
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if !self.wait_ready(PollFlags::POLLIN)? {
                return Err(TransportError::Timeout {
                    timeout_ms: self.timeout_ms(),
                });
            }
            let result = self.file()?.read(buf);
            match result {
                Ok(n) => {
                    trace!(bytes_read = n, "Read complete");
                    return Ok(n);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        loop {
            let result = self.file()?.write(data);
            match result {
                Ok(n) => {
                    tcdrain(&*self.file()?).map_err(os_error)?;
                    trace!(bytes_written = n, "Write complete");
                    return Ok(n);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    if !self.wait_ready(PollFlags::POLLOUT)? {
                        return Err(TransportError::Timeout {
                            timeout_ms: self.timeout_ms(),
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn purge(&mut self, direction: Direction) -> Result<(), TransportError> {
        let queue = match direction {
            Direction::Input => FlushArg::TCIFLUSH,
            Direction::Output => FlushArg::TCOFLUSH,
            Direction::All => FlushArg::TCIOFLUSH,
        };
        tcflush(&*self.file()?, queue).map_err(os_error)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.file.take().is_some() {
            info!(path = %self.path, "Serial port closed");
        }
        Ok(())
    }
}

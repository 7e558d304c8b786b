//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::traits::{Direction, IoStream, SerialConfig, TransportError, TransportKind};

#[derive(Debug, Default)]
struct MockState {
    /// Bytes the "device" will send.
    rx: VecDeque<u8>,
    /// Captured writes.
    writes: Vec<Vec<u8>>,
    config: Option<SerialConfig>,
    timeout: Option<Duration>,
    purges: Vec<Direction>,
    sleeps: Vec<Duration>,
    /// Upper bound on bytes returned per read.
    max_chunk: Option<usize>,
    fail_configure: bool,
    fail_writes: bool,
    /// Writes beyond this many successful ones fail.
    fail_writes_after: Option<usize>,
    close_count: usize,
}

/// Mock transport for unit testing session logic.
///
/// Clones share the same state, so a test can keep one handle while the
/// other is moved into a device session.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    kind: TransportKind,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_kind(TransportKind::Custom)
    }

    pub fn with_kind(kind: TransportKind) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            kind,
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes to be returned by subsequent reads.
    pub fn queue_rx(&self, data: &[u8]) {
        self.state().rx.extend(data.iter().copied());
    }

    /// Number of queued bytes not yet read.
    pub fn pending_rx(&self) -> usize {
        self.state().rx.len()
    }

    /// Limit how many bytes a single read may return.
    pub fn set_max_chunk(&self, max_chunk: usize) {
        self.state().max_chunk = Some(max_chunk);
    }

    /// Make `configure` fail.
    pub fn fail_configure(&self) {
        self.state().fail_configure = true;
    }

    /// Make every subsequent write fail.
    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    /// Let `count` writes through, then fail every later one.
    pub fn fail_writes_after(&self, count: usize) {
        self.state().fail_writes_after = Some(count);
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.state().writes.clone()
    }

    /// All written bytes, concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.state().writes.concat()
    }

    pub fn config(&self) -> Option<SerialConfig> {
        self.state().config
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.state().timeout
    }

    pub fn purges(&self) -> Vec<Direction> {
        self.state().purges.clone()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state().sleeps.clone()
    }

    pub fn close_count(&self) -> usize {
        self.state().close_count
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl IoStream for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn configure(&mut self, config: &SerialConfig) -> Result<(), TransportError> {
        let mut state = self.state();
        if state.fail_configure {
            return Err(TransportError::InvalidConfig(config.to_string()));
        }
        state.config = Some(*config);
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<(), TransportError> {
        self.state().timeout = timeout;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state();
        if state.close_count > 0 {
            return Err(TransportError::Closed);
        }
        if state.rx.is_empty() {
            let timeout_ms = state.timeout.map_or(0, |t| t.as_millis() as u64);
            return Err(TransportError::Timeout { timeout_ms });
        }

        let mut len = buf.len().min(state.rx.len());
        if let Some(max_chunk) = state.max_chunk {
            len = len.min(max_chunk);
        }
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..len)) {
            *dst = src;
        }
        Ok(len)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut state = self.state();
        if state.close_count > 0 {
            return Err(TransportError::Closed);
        }
        let limit_reached = state
            .fail_writes_after
            .is_some_and(|count| state.writes.len() >= count);
        if state.fail_writes || limit_reached {
            return Err(TransportError::Disconnected);
        }
        state.writes.push(data.to_vec());
        Ok(data.len())
    }

    fn sleep(&mut self, duration: Duration) -> Result<(), TransportError> {
        self.state().sleeps.push(duration);
        Ok(())
    }

    fn purge(&mut self, direction: Direction) -> Result<(), TransportError> {
        self.state().purges.push(direction);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.state().close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_rx_queue() {
        let mut mock = MockTransport::new();
        mock.queue_rx(b"OK");
        mock.queue_rx(b"DATA");

        let mut buf = [0u8; 3];
        assert_eq!(mock.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"OKD");

        let mut rest = [0u8; 3];
        mock.read_exact(&mut rest).unwrap();
        assert_eq!(&rest, b"ATA");

        // Queue is empty now
        assert!(matches!(
            mock.read(&mut buf),
            Err(TransportError::Timeout { .. })
        ));
    }

    #[test]
    fn test_mock_chunked_read_exact() {
        let mut mock = MockTransport::new();
        mock.set_max_chunk(2);
        mock.queue_rx(&[1, 2, 3, 4, 5]);

        let mut buf = [0u8; 5];
        assert_eq!(mock.read(&mut buf[..4]).unwrap(), 2);
        mock.read_exact(&mut buf[2..]).unwrap();
        assert_eq!(&buf, &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        let mut stream: Box<dyn IoStream> = Box::new(mock.clone());
        stream.write_all(b"Hello").unwrap();
        stream.write_all(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_fail_writes_after() {
        let mut mock = MockTransport::new();
        mock.fail_writes_after(1);
        assert_eq!(mock.write(b"a").unwrap(), 1);
        assert!(matches!(
            mock.write(b"b"),
            Err(TransportError::Disconnected)
        ));
        assert_eq!(mock.written_bytes(), b"a");
    }

    #[test]
    fn test_mock_closed() {
        let mut mock = MockTransport::new();
        mock.close().unwrap();
        assert_eq!(mock.close_count(), 1);
        assert!(matches!(mock.write(b"x"), Err(TransportError::Closed)));
    }
}

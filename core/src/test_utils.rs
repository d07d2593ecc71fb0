//! Shared test utilities for link unit and integration tests

use std::sync::Mutex;

use touchlink_shared::Message;

use crate::link::DatagramSink;

// ============================================================================
// Recording Sink
// ============================================================================

/// Datagram sink that keeps every datagram it is given
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw datagrams in send order
    pub fn datagrams(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Decoded messages in send order (undecodable datagrams are skipped)
    pub fn messages(&self) -> Vec<Message> {
        self.datagrams()
            .iter()
            .filter_map(|bytes| Message::from_bytes(bytes))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl DatagramSink for RecordingSink {
    fn send(&self, bytes: &[u8]) {
        self.sent.lock().unwrap().push(bytes.to_vec());
    }
}

// ============================================================================
// Polling
// ============================================================================

/// Poll `condition` every 5ms until it holds or `timeout` elapses
pub fn wait_until(timeout: std::time::Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    condition()
}

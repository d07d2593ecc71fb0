//! At-least-once delivery for discrete input events
//!
//! Reliable messages get a sequence number and sit in the pending table until
//! the peer acknowledges them. A retry task calls [`ReliabilityManager::tick`]
//! every [`RETRY_TICK`]; an entry is retransmitted once the time since its
//! last transmission reaches `RETRY_TICK × (retry_count + 1)`, giving
//! retransmissions at roughly 50, 150, 300, 500 and 750 ms. After
//! [`MAX_RETRIES`] retransmissions the entry is dropped silently.
//!
//! The table sits behind a single mutex that is only held for map
//! operations; datagrams are always sent after the guard is released.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use touchlink_shared::{Encoding, Message};

use super::socket::DatagramSink;

/// Period of the retry task
pub const RETRY_TICK: Duration = Duration::from_millis(50);

/// Retransmissions attempted before a message is abandoned
pub const MAX_RETRIES: u32 = 5;

/// A reliable message awaiting acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Sequence number carried by the message
    pub sequence: u32,
    /// Encoded datagram, resent verbatim
    pub payload: Vec<u8>,
    /// Time of the most recent transmission
    pub sent_at: Instant,
    /// Retransmissions so far
    pub retry_count: u32,
}

/// Delivery counters for one manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReliabilityStats {
    /// Messages currently awaiting an ack
    pub pending: usize,
    /// Retransmitted datagrams
    pub retransmissions: u64,
    /// Messages retired by an ack
    pub acknowledged: u64,
    /// Messages given up on after exhausting retries
    pub abandoned: u64,
}

/// Sequence allocator, pending table and retry schedule
#[derive(Debug)]
pub struct ReliabilityManager {
    pending: Mutex<HashMap<u32, PendingMessage>>,
    /// Last sequence handed out (the next one is this plus one, wrapping)
    last_sequence: AtomicU32,
    retransmissions: AtomicU64,
    acknowledged: AtomicU64,
    abandoned: AtomicU64,
}

impl Default for ReliabilityManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ReliabilityManager {
    /// Create an empty manager; the first sequence handed out is 1
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            last_sequence: AtomicU32::new(0),
            retransmissions: AtomicU64::new(0),
            acknowledged: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<u32, PendingMessage>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate the next sequence number (wraps silently past `u32::MAX`)
    pub fn next_sequence(&self) -> u32 {
        self.last_sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Send a reliable message now
    ///
    /// Stamps a fresh sequence number, records the pending entry and
    /// transmits. Returns the sequence, or `None` for unreliable messages
    /// (which are sent once without tracking).
    pub fn send(&self, msg: Message, encoding: Encoding, sink: &dyn DatagramSink) -> Option<u32> {
        self.send_at(msg, encoding, sink, Instant::now())
    }

    /// [`send`](Self::send) with an explicit clock reading
    pub fn send_at(
        &self,
        msg: Message,
        encoding: Encoding,
        sink: &dyn DatagramSink,
        now: Instant,
    ) -> Option<u32> {
        if !msg.is_reliable() {
            sink.send(&msg.encode(encoding));
            return None;
        }

        let sequence = self.next_sequence();
        let payload = msg.with_sequence(sequence).encode(encoding);

        self.table().insert(
            sequence,
            PendingMessage {
                sequence,
                payload: payload.clone(),
                sent_at: now,
                retry_count: 0,
            },
        );

        sink.send(&payload);
        tracing::trace!(sequence, "Reliable message sent");
        Some(sequence)
    }

    /// Run one retry pass
    ///
    /// Drops exhausted entries and retransmits the ones whose backoff has
    /// elapsed. Returns the number of datagrams retransmitted.
    pub fn tick(&self, now: Instant, sink: &dyn DatagramSink) -> usize {
        let mut resend = Vec::new();

        {
            let mut table = self.table();
            table.retain(|&sequence, entry| {
                if entry.retry_count >= MAX_RETRIES {
                    tracing::debug!(sequence, "Reliable message abandoned");
                    self.abandoned.fetch_add(1, Ordering::Relaxed);
                    return false;
                }

                let backoff = RETRY_TICK * (entry.retry_count + 1);
                if now.saturating_duration_since(entry.sent_at) >= backoff {
                    entry.retry_count += 1;
                    entry.sent_at = now;
                    resend.push(entry.payload.clone());
                }
                true
            });
        }

        for payload in &resend {
            sink.send(payload);
        }
        self.retransmissions
            .fetch_add(resend.len() as u64, Ordering::Relaxed);
        resend.len()
    }

    /// Retire the entry for `sequence`
    ///
    /// Returns whether an entry was removed. Unknown, duplicate and late
    /// acks are no-ops.
    pub fn acknowledge(&self, sequence: u32) -> bool {
        let removed = self.table().remove(&sequence).is_some();
        if removed {
            self.acknowledged.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(sequence, "Reliable message acknowledged");
        }
        removed
    }

    /// Whether `sequence` is still awaiting an ack
    pub fn is_pending(&self, sequence: u32) -> bool {
        self.table().contains_key(&sequence)
    }

    /// Snapshot of one pending entry
    pub fn pending_entry(&self, sequence: u32) -> Option<PendingMessage> {
        self.table().get(&sequence).cloned()
    }

    /// Number of messages awaiting an ack
    pub fn pending_count(&self) -> usize {
        self.table().len()
    }

    /// Drop every pending entry
    pub fn clear(&self) {
        self.table().clear();
    }

    /// Drop every pending entry and restart sequence numbering
    ///
    /// Used when a new connection starts.
    pub fn reset(&self) {
        self.clear();
        self.last_sequence.store(0, Ordering::Relaxed);
    }

    /// Delivery counters
    pub fn stats(&self) -> ReliabilityStats {
        ReliabilityStats {
            pending: self.pending_count(),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

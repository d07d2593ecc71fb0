//! Wall-clock helpers shared by both ends of the link.

use chrono::Utc;

/// Milliseconds since the Unix epoch, as carried by ping/pong timestamps.
///
/// Clocks set before 1970 read as zero.
pub fn epoch_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

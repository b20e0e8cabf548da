//! Wire timestamps and message-ID generation.
//!
//! The protocol pins timestamps to the factory timezone (`+08:00`) and
//! correlates messages with a 16-character ID: 14-digit local timestamp
//! plus a 2-digit wrapping sequence.

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, FixedOffset, Utc};

/// Seconds east of UTC for the factory timezone.
const FACTORY_OFFSET_SECS: i32 = 8 * 3600;

fn factory_now() -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(FACTORY_OFFSET_SECS).expect("factory offset in range");
    Utc::now().with_timezone(&offset)
}

/// Current wire timestamp, `YYYY-MM-DDTHH:MM:SS+08:00`.
pub fn wire_timestamp() -> String {
    factory_now().format("%Y-%m-%dT%H:%M:%S+08:00").to_string()
}

/// Generates correlation IDs: `{YYYYMMDDHHMMSS}{seq:02}`.
///
/// The sequence is a process-wide wrapping counter, so two messages built
/// within the same second still get distinct IDs (up to 100 per second).
#[derive(Debug, Default)]
pub struct MsgIdGenerator {
    seq: AtomicU32,
}

impl MsgIdGenerator {
    /// Create a generator starting at sequence 00.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next correlation ID for the current instant.
    pub fn next(&self) -> String {
        self.next_for(&factory_now().format("%Y%m%d%H%M%S").to_string())
    }

    fn next_for(&self, ts14: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) % 100;
        format!("{ts14}{seq:02}")
    }
}

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by a session's capture loop
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    read_errors: AtomicU64,
    send_errors: AtomicU64,
}

impl SessionStats {
    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Returns the new error count
    pub fn record_read_error(&self) -> u64 {
        self.read_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the new error count
    pub fn record_send_error(&self) -> u64 {
        self.send_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatsSnapshot {
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub read_errors: u64,
    pub send_errors: u64,
}

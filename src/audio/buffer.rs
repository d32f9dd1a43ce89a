//! Hand-off queue between a device callback and the blocking frame reader
//!
//! The device side pushes variable-sized chunks without blocking; the
//! session side pulls fixed-size frames, waiting up to a timeout.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::DeviceError;

/// Create a queue holding at most `capacity` chunks
pub fn sample_queue(capacity: usize) -> (SampleWriter, FrameReader) {
    let (tx, rx) = bounded(capacity);
    let overflow_count = Arc::new(AtomicUsize::new(0));

    (
        SampleWriter {
            tx,
            overflow_count: overflow_count.clone(),
        },
        FrameReader {
            rx,
            pending: Vec::new(),
            pending_pos: 0,
            overflow_count,
            reported_overflows: 0,
        },
    )
}

/// Producer half, safe to call from a real-time callback
#[derive(Clone)]
pub struct SampleWriter {
    tx: Sender<Vec<i16>>,
    overflow_count: Arc<AtomicUsize>,
}

impl SampleWriter {
    /// Push a chunk of samples
    /// Returns false if the queue is full (overflow) or the reader is gone
    pub fn push(&self, chunk: Vec<i16>) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half, assembles fixed-size frames
pub struct FrameReader {
    rx: Receiver<Vec<i16>>,
    pending: Vec<i16>,
    pending_pos: usize,
    overflow_count: Arc<AtomicUsize>,
    reported_overflows: usize,
}

impl FrameReader {
    /// Fill `frame` completely, waiting at most `timeout`
    ///
    /// A timeout keeps the partially read samples for the next call.
    /// Overflows since the last call are reported once as `Overrun`.
    pub fn read_frame(&mut self, frame: &mut [i16], timeout: Duration) -> Result<(), DeviceError> {
        let overflows = self.overflow_count.load(Ordering::Relaxed);
        if overflows > self.reported_overflows {
            let dropped = overflows - self.reported_overflows;
            self.reported_overflows = overflows;
            return Err(DeviceError::Overrun { dropped });
        }

        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < frame.len() {
            if self.pending_pos < self.pending.len() {
                let available = &self.pending[self.pending_pos..];
                let n = available.len().min(frame.len() - filled);
                frame[filled..filled + n].copy_from_slice(&available[..n]);
                self.pending_pos += n;
                filled += n;
                continue;
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pending_pos = 0;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.pending = frame[..filled].to_vec();
                    self.pending_pos = 0;
                    return Err(DeviceError::ReadTimeout);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(DeviceError::Disconnected),
            }
        }

        Ok(())
    }

    /// Get overflow count
    pub fn overflow_count(&self) -> usize {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

//! Recording buffer pool
//!
//! A fixed circle of same-size buffers shared between the real-time
//! capture callback (producer) and the application thread (consumer).
//! The callback fills the buffer at `recording_index` and rotates; the
//! application consumes from `playback_index`. When the producer laps the
//! consumer the oldest unread buffer is dropped, bounding memory at the
//! cost of losing audio, never blocking the callback.
//!
//! Equal indices mean "no unread data", so the circle carries one
//! sentinel slot beyond the usable count: a pool of size `N` holds up to
//! `N` unread buffers in `N + 1` slots.

use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::sync::Reentrant;

struct PoolSlot {
    data: Box<[u8]>,
    /// Bytes the last capture actually wrote into `data`.
    len: usize,
}

struct PoolState {
    slots: Vec<PoolSlot>,
    recording_index: usize,
    playback_index: usize,
}

/// Counters and fill snapshot for diagnostics.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pending_buffers: usize,
    pub buffer_count: usize,
    pub chunk_bytes: usize,
    pub overflows: usize,
}

/// The circular capture pool. Shared via `Arc` between the owning device
/// and the capture handler installed with the backend.
pub struct RecordingPool {
    state: Reentrant<PoolState>,
    buffer_count: usize,
    chunk_bytes: usize,
    overflows: AtomicUsize,
}

impl RecordingPool {
    /// Create a pool holding up to `buffer_count` unread buffers of
    /// `chunk_bytes` bytes each.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_count` is zero.
    pub fn new(buffer_count: usize, chunk_bytes: usize) -> Self {
        assert!(buffer_count > 0, "pool needs at least one buffer");
        let slots = (0..buffer_count + 1)
            .map(|_| PoolSlot {
                data: vec![0u8; chunk_bytes].into_boxed_slice(),
                len: 0,
            })
            .collect();
        Self {
            state: Reentrant::new(PoolState {
                slots,
                recording_index: 0,
                playback_index: 0,
            }),
            buffer_count,
            chunk_bytes,
            overflows: AtomicUsize::new(0),
        }
    }

    /// Usable buffer count (excludes the sentinel slot).
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Store one captured chunk, called from the capture callback.
    ///
    /// Copies `chunk` (truncated to the chunk size) into the buffer at
    /// `recording_index`, then rotates the indices, dropping the oldest
    /// unread buffer if the consumer has fallen a full circle behind.
    pub fn capture_into(&self, chunk: &[u8]) {
        let dropped = self.state.with(|s| {
            let count = s.slots.len();
            let slot = &mut s.slots[s.recording_index];
            let len = chunk.len().min(slot.data.len());
            slot.data[..len].copy_from_slice(&chunk[..len]);
            slot.len = len;

            // Move onto the next buffer in the circle
            let next = (s.recording_index + 1) % count;
            let dropped = s.playback_index == next;
            if dropped {
                s.playback_index = (s.playback_index + 1) % count;
            }
            s.recording_index = next;
            dropped
        });
        if dropped {
            self.overflows.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the oldest unread buffer, or `None` when nothing is unread.
    ///
    /// The contents are copied out under the lock, so the returned bytes
    /// stay valid however far capture advances afterwards.
    pub fn retrieve_buffer(&self) -> Option<Bytes> {
        self.state.with(Self::retrieve_locked)
    }

    /// Locked core of [`retrieve_buffer`], also used by the drain loop.
    fn retrieve_locked(s: &mut PoolState) -> Option<Bytes> {
        if s.recording_index == s.playback_index {
            return None;
        }
        let slot = &s.slots[s.playback_index];
        let result = Bytes::copy_from_slice(&slot.data[..slot.len]);
        s.playback_index = (s.playback_index + 1) % s.slots.len();
        Some(result)
    }

    /// Drain every unread buffer, in capture order, under one lock
    /// acquisition, concatenated into one contiguous result. Empty when
    /// nothing is unread.
    pub fn drain_available(&self) -> Bytes {
        self.state.with(|s| {
            let mut parts = Vec::new();
            while let Some(part) = Self::retrieve_locked(s) {
                parts.push(part);
            }
            let total = parts.iter().map(|p| p.len()).sum();
            let mut out = BytesMut::with_capacity(total);
            for part in &parts {
                out.extend_from_slice(part);
            }
            out.freeze()
        })
    }

    /// Reset both indices to the start of the circle, discarding any
    /// unread data.
    pub fn clear(&self) {
        self.state.with(|s| {
            s.recording_index = 0;
            s.playback_index = 0;
        });
    }

    pub fn stats(&self) -> PoolStats {
        let pending = self.state.with(|s| {
            let count = s.slots.len();
            (s.recording_index + count - s.playback_index) % count
        });
        PoolStats {
            pending_buffers: pending,
            buffer_count: self.buffer_count,
            chunk_bytes: self.chunk_bytes,
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }
}

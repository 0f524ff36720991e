//! Playback ring buffer
//!
//! A single circular byte buffer shared between the application thread
//! (producer) and the real-time render callback (consumer). Writes use a
//! two-phase reservation protocol: the producer first requests spans for a
//! byte count, copies its data through them, then commits the count. The
//! consumer side never blocks on missing data; an underrun is padded with
//! silence because an audible glitch beats a missed render deadline.
//!
//! Cursor arithmetic "unrolls" one cursor past the end of the buffer so
//! ordinary linear comparisons apply to the circular positions. The
//! buffer stores at most `capacity - 1` unread bytes; equal cursors
//! always mean empty.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{AudioError, Result};
use crate::sync::Reentrant;

/// One contiguous region of a reservation, as offset and length into the
/// ring's owned storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

/// A successful write reservation: one span, or two when the write region
/// wraps past the end of the buffer (the second span always starts at
/// offset zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub first: Span,
    pub second: Option<Span>,
}

impl Reservation {
    /// Total reserved byte count.
    pub fn len(&self) -> usize {
        self.first.len + self.second.map_or(0, |s| s.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct RingState {
    buf: Box<[u8]>,
    read_pos: usize,
    write_pos: usize,
}

/// Counters and cursor snapshot for diagnostics.
#[derive(Debug, Clone)]
pub struct RingStats {
    pub unplayed_bytes: usize,
    pub capacity: usize,
    pub underruns: usize,
}

/// The circular playback buffer. Shared via `Arc` between the owning
/// device and the render handler installed with the backend.
pub struct PlaybackRing {
    state: Reentrant<RingState>,
    capacity: usize,
    underruns: AtomicUsize,
}

impl PlaybackRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Reentrant::new(RingState {
                buf: vec![0u8; capacity].into_boxed_slice(),
                read_pos: 0,
                write_pos: 0,
            }),
            capacity,
            underruns: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Request spans for a `bytes`-long write.
    ///
    /// Fails with [`AudioError::InsufficientSpace`] when the write would
    /// reach or pass the read cursor; nothing is consumed on failure.
    pub fn request_reservation(&self, bytes: usize) -> Result<Reservation> {
        self.state.with(|s| {
            let capacity = s.buf.len();
            // Unroll the read cursor so linear arithmetic applies
            let mut unrolled_read = s.read_pos;
            if unrolled_read <= s.write_pos {
                unrolled_read += capacity;
            }
            if s.write_pos + bytes >= unrolled_read {
                return Err(AudioError::InsufficientSpace);
            }

            // Does it all fit before the end of the buffer?
            let first_len = bytes.min(capacity - s.write_pos);
            if first_len == bytes {
                return Ok(Reservation {
                    first: Span {
                        offset: s.write_pos,
                        len: bytes,
                    },
                    second: None,
                });
            }

            // No, so wrap the remainder round to the front
            Ok(Reservation {
                first: Span {
                    offset: s.write_pos,
                    len: first_len,
                },
                second: Some(Span {
                    offset: 0,
                    len: bytes - first_len,
                }),
            })
        })
    }

    /// Copy `data` into the ring through a reservation's spans.
    ///
    /// The lock is held only for the copy itself, so the caller is free to
    /// produce or fetch the data between requesting and writing.
    ///
    /// # Panics
    ///
    /// Panics if `data` is shorter than the reservation.
    pub fn write_reservation(&self, reservation: &Reservation, data: &[u8]) {
        self.state.with(|s| {
            let first = reservation.first;
            s.buf[first.offset..first.offset + first.len].copy_from_slice(&data[..first.len]);
            if let Some(second) = reservation.second {
                s.buf[second.offset..second.offset + second.len]
                    .copy_from_slice(&data[first.len..first.len + second.len]);
            }
        });
    }

    /// Advance the write cursor by `bytes`, completing a reservation.
    ///
    /// Must be called with exactly the byte count previously reserved.
    pub fn commit_reservation(&self, bytes: usize) {
        self.state.with(|s| {
            s.write_pos = (s.write_pos + bytes) % s.buf.len();
        });
    }

    /// Reserve, copy and commit in one call.
    pub fn add(&self, data: &[u8]) -> Result<()> {
        let reservation = self.request_reservation(data.len())?;
        self.write_reservation(&reservation, data);
        self.commit_reservation(data.len());
        Ok(())
    }

    /// Bytes committed but not yet consumed by the render callback.
    pub fn unplayed_bytes(&self) -> usize {
        self.state.with(|s| {
            let mut unrolled_write = s.write_pos;
            if unrolled_write < s.read_pos {
                unrolled_write += s.buf.len();
            }
            unrolled_write - s.read_pos
        })
    }

    /// Fill `target` from the ring, called from the render callback.
    ///
    /// Copies committed bytes in commit order; if fewer are available than
    /// requested, the remainder of `target` is zeroed (silence) and the
    /// read cursor advances only past what was actually copied.
    pub fn fill_into(&self, target: &mut [u8]) {
        let deficit = self.state.with(|s| Self::fill_locked(s, target));
        if deficit > 0 {
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Locked core of [`fill_into`]; returns the zero-filled deficit.
    fn fill_locked(s: &mut RingState, target: &mut [u8]) -> usize {
        let capacity = s.buf.len();
        let mut unrolled_write = s.write_pos;
        if unrolled_write < s.read_pos {
            unrolled_write += capacity;
        }
        let available = unrolled_write - s.read_pos;
        let copied = target.len().min(available);

        // Up to two copies when the read region crosses the buffer end
        let first_len = copied.min(capacity - s.read_pos);
        target[..first_len].copy_from_slice(&s.buf[s.read_pos..s.read_pos + first_len]);
        if copied > first_len {
            target[first_len..copied].copy_from_slice(&s.buf[..copied - first_len]);
        }
        s.read_pos = (s.read_pos + copied) % capacity;

        // Silence for the rest
        for byte in &mut target[copied..] {
            *byte = 0;
        }
        target.len() - copied
    }

    /// Reset both cursors to the start of the buffer.
    pub fn clear(&self) {
        self.state.with(|s| {
            s.read_pos = 0;
            s.write_pos = 0;
        });
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            unplayed_bytes: self.unplayed_bytes(),
            capacity: self.capacity,
            underruns: self.underruns.load(Ordering::Relaxed),
        }
    }
}

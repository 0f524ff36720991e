//! Audio subsystem module

pub mod playback;
pub mod pool;
pub mod recording;
pub mod ring;

pub use playback::PlaybackDevice;
pub use pool::RecordingPool;
pub use recording::RecordingDevice;
pub use ring::{PlaybackRing, Reservation, Span};

use crate::error::AudioError;

/// Wrap a backend lifecycle failure in the operation that requested it.
pub(crate) fn operation_failed(what: &str, err: AudioError) -> AudioError {
    AudioError::BackendOperationFailed(format!("{}: {}", what, err))
}

/// Lifecycle state of a device.
///
/// Devices move `Uninitialized → Initialized → Started ⇄ Stopped`; reset
/// is a self-transition. A closed device is simply dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Initialized,
    Started,
    Stopped,
}

//! Audio backend boundary
//!
//! The engine does not talk to sound hardware directly. Each device owns a
//! backend object that performs format negotiation with the platform audio
//! subsystem, starts and stops the hardware stream, and invokes a handler
//! installed by the device from the real-time thread.
//!
//! The contract with the real-time side is deliberately narrow: the
//! backend calls the installed handler with a byte buffer, and the handler
//! fills or drains it under its own lock and returns promptly. Once a
//! backend's `stop` has returned, it must not invoke the handler again.

pub mod fake;
pub mod host;

pub use fake::{
    FakeCaptureBackend, FakeCaptureHandle, FakePlaybackBackend, FakePlaybackHandle, FakeProvider,
};
pub use host::HostProvider;

use crate::error::Result;

/// A negotiated stream format: 16-bit signed linear PCM, mono or stereo.
///
/// Sample rate and channel count come from the backend's default device;
/// bit depth is fixed and channel counts above two are clamped to stereo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl StreamFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.clamp(1, 2),
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Bytes per sample frame (one 16-bit sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * 2
    }

    /// Bytes per second of audio in this format.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.bytes_per_frame()
    }
}

/// Handler the playback backend calls with a destination buffer to fill.
pub type RenderFn = Box<dyn FnMut(&mut [u8]) + Send + 'static>;

/// Handler the capture backend calls with each captured chunk.
pub type CaptureFn = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Output-side backend: owns the hardware render stream.
pub trait PlaybackBackend: Send {
    /// Negotiate the output format from the backend's default output
    /// device. Called once, before any other operation.
    fn negotiate(&mut self) -> Result<StreamFormat>;

    /// Install the render handler invoked from the real-time thread.
    fn install_renderer(&mut self, renderer: RenderFn) -> Result<()>;

    /// Ask the backend to begin invoking the render handler.
    fn start(&mut self) -> Result<()>;

    /// Ask the backend to stop invoking the render handler. Returns once
    /// the backend has acknowledged; no further callbacks may follow.
    fn stop(&mut self) -> Result<()>;

    /// Clear any internal processing state in the backend.
    fn reset(&mut self) -> Result<()>;
}

/// Input-side backend: owns the hardware capture stream.
pub trait CaptureBackend: Send {
    /// Negotiate the input format from the backend's default input
    /// device. Called once, before any other operation.
    fn negotiate(&mut self) -> Result<StreamFormat>;

    /// Preferred callback chunk size in frames, if the backend reports
    /// one. Valid after `negotiate`.
    fn preferred_chunk_frames(&self) -> Option<u32>;

    /// Install the capture handler invoked from the real-time thread.
    fn install_sink(&mut self, sink: CaptureFn) -> Result<()>;

    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
}

/// Factory handing out a fresh backend for each opened device.
pub trait BackendProvider: Send + Sync {
    fn playback_backend(&self) -> Result<Box<dyn PlaybackBackend>>;
    fn capture_backend(&self) -> Result<Box<dyn CaptureBackend>>;
}

/// Provider for the platform's default audio host.
pub fn default_provider() -> Box<dyn BackendProvider> {
    Box::new(HostProvider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_clamps_channels() {
        assert_eq!(StreamFormat::new(48000, 0).channels, 1);
        assert_eq!(StreamFormat::new(48000, 1).channels, 1);
        assert_eq!(StreamFormat::new(48000, 2).channels, 2);
        assert_eq!(StreamFormat::new(48000, 6).channels, 2);
    }

    #[test]
    fn test_format_sizes() {
        let mono = StreamFormat::new(8000, 1);
        assert!(!mono.is_stereo());
        assert_eq!(mono.bytes_per_frame(), 2);
        assert_eq!(mono.bytes_per_second(), 16000);

        let stereo = StreamFormat::new(44100, 2);
        assert!(stereo.is_stereo());
        assert_eq!(stereo.bytes_per_frame(), 4);
        assert_eq!(stereo.bytes_per_second(), 176400);
    }
}

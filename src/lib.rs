//! # PCM Duplex
//!
//! Real-time PCM capture and playback engine with lock-bounded buffer
//! exchange between an application thread and the hardware callback
//! thread.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        APPLICATION THREAD                            │
//! │                                                                      │
//! │   AudioSystem (system)                                               │
//! │   ┌──────────────────────────┐  ┌──────────────────────────┐         │
//! │   │ Playback Registry        │  │ Recording Registry       │         │
//! │   │ (registry) slots 0..16   │  │ (registry) slots 0..16   │         │
//! │   │  ┌────────────────────┐  │  │  ┌────────────────────┐  │         │
//! │   │  │ PlaybackDevice     │  │  │  │ RecordingDevice    │  │         │
//! │   │  │  add_data ──────┐  │  │  │  │  get_data ◄─────┐  │  │         │
//! │   │  └─────────────────┼──┘  │  │  └─────────────────┼──┘  │         │
//! │   └────────────────────┼─────┘  └────────────────────┼─────┘         │
//! │                        ▼                             │               │
//! │            ┌────────────────────┐        ┌───────────┴────────┐      │
//! │            │ PlaybackRing       │        │ RecordingPool      │      │
//! │            │ (audio::ring)      │        │ (audio::pool)      │      │
//! │            └─────────┬──────────┘        └───────────▲────────┘      │
//! │                      │ fill_into              capture_into           │
//! ├──────────────────────┼──────────────────────────────┼────────────────┤
//! │                      ▼        REAL-TIME THREAD      │                │
//! │            render handler ◄── backend ──► capture handler            │
//! │                  (PlaybackBackend / CaptureBackend, backend)         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Application calls flow registry → device → buffer structure, each step
//! under the lock matching its granularity. The real-time callback goes
//! straight to the device's buffer structure under the device lock,
//! bypassing the registry. All audio crossing the boundary is copied;
//! buffer memory never changes hands.

pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod registry;
pub mod sync;
pub mod system;

pub use config::EngineConfig;
pub use error::{AudioError, Result};
pub use system::AudioSystem;

/// Application-wide constants
pub mod constants {
    /// Maximum concurrently open devices per kind.
    pub const MAX_DEVICES: usize = 16;

    /// Seconds of audio the playback ring buffer holds.
    pub const PLAYBACK_BUFFER_SECS: u32 = 3;

    /// Milliseconds of audio the recording buffer pool spans.
    pub const POOL_SPAN_MS: u32 = 500;

    /// Bytes per sample of the fixed 16-bit linear PCM format.
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Callback chunk size in frames when the backend reports none.
    pub const FALLBACK_CHUNK_FRAMES: u32 = 512;
}

//! Engine configuration

use serde::{Deserialize, Serialize};

use crate::backend::StreamFormat;
use crate::constants::{
    FALLBACK_CHUNK_FRAMES, MAX_DEVICES, PLAYBACK_BUFFER_SECS, POOL_SPAN_MS,
};

/// Sizing parameters for the engine.
///
/// Host applications may deserialize this from their own configuration
/// files; the defaults match normal interactive use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum concurrently open devices per kind.
    pub max_devices: usize,
    /// Seconds of audio the playback ring buffer holds.
    pub playback_buffer_secs: u32,
    /// Milliseconds of audio the recording buffer pool spans.
    pub pool_span_ms: u32,
    /// Callback chunk size in frames, used when the backend does not
    /// report a preferred size.
    pub fallback_chunk_frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_devices: MAX_DEVICES,
            playback_buffer_secs: PLAYBACK_BUFFER_SECS,
            pool_span_ms: POOL_SPAN_MS,
            fallback_chunk_frames: FALLBACK_CHUNK_FRAMES,
        }
    }
}

impl EngineConfig {
    /// Playback ring capacity in bytes for a negotiated format.
    pub fn playback_capacity_bytes(&self, format: StreamFormat) -> usize {
        self.playback_buffer_secs as usize * format.bytes_per_second()
    }

    /// Number of usable recording buffers needed to span
    /// [`pool_span_ms`](Self::pool_span_ms) of audio, given the callback
    /// chunk size. At least one buffer is always allocated.
    pub fn pool_buffer_count(&self, format: StreamFormat, chunk_bytes: usize) -> usize {
        let span_bytes = format.bytes_per_second() * self.pool_span_ms as usize / 1000;
        (span_bytes / chunk_bytes.max(1)).max(1)
    }
}

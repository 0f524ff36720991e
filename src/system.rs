//! Application-facing control surface
//!
//! [`AudioSystem`] owns one registry per device kind and a backend
//! provider, and exposes the per-device control and data-exchange
//! operations keyed by device id. Recording and playback share no state
//! beyond the provider.

use bytes::Bytes;

use crate::audio::ring::Reservation;
use crate::audio::{DeviceState, PlaybackDevice, RecordingDevice};
use crate::backend::{self, BackendProvider};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::registry::{Registry, SlotDevice};

impl SlotDevice for PlaybackDevice {
    fn initialize(&mut self) -> Result<()> {
        PlaybackDevice::initialize(self)
    }
}

impl SlotDevice for RecordingDevice {
    fn initialize(&mut self) -> Result<()> {
        RecordingDevice::initialize(self)
    }
}

pub struct AudioSystem {
    config: EngineConfig,
    provider: Box<dyn BackendProvider>,
    playback: Registry<PlaybackDevice>,
    recording: Registry<RecordingDevice>,
}

impl AudioSystem {
    pub fn new(provider: Box<dyn BackendProvider>, config: EngineConfig) -> Self {
        Self {
            provider,
            playback: Registry::new(config.max_devices, "playback"),
            recording: Registry::new(config.max_devices, "recording"),
            config,
        }
    }

    /// System over the platform's default audio host.
    pub fn with_default_host(config: EngineConfig) -> Self {
        Self::new(backend::default_provider(), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // === Playback ===

    /// Open a playback device: allocate a slot, negotiate the output
    /// format and size the ring buffer. Returns the device id.
    pub fn playback_init(&self) -> Result<usize> {
        let backend = self.provider.playback_backend()?;
        self.playback
            .open(PlaybackDevice::new(backend, self.config))
    }

    pub fn playback_sample_rate(&self, id: usize) -> Result<u32> {
        self.playback.lookup(id)?.lock().sample_rate()
    }

    pub fn playback_is_stereo(&self, id: usize) -> Result<bool> {
        self.playback.lookup(id)?.lock().is_stereo()
    }

    pub fn playback_state(&self, id: usize) -> Result<DeviceState> {
        Ok(self.playback.lookup(id)?.lock().state())
    }

    pub fn playback_start(&self, id: usize) -> Result<()> {
        self.playback.lookup(id)?.lock().start()
    }

    pub fn playback_stop(&self, id: usize) -> Result<()> {
        self.playback.lookup(id)?.lock().stop()
    }

    pub fn playback_reset(&self, id: usize) -> Result<()> {
        self.playback.lookup(id)?.lock().reset()
    }

    /// Queue PCM bytes for the render callback: reserve, copy and commit
    /// in one call.
    pub fn playback_add_data(&self, id: usize, data: &[u8]) -> Result<()> {
        self.playback.lookup(id)?.lock().add_data(data)
    }

    /// Explicit reservation protocol, for callers that produce their data
    /// between reserving and committing.
    pub fn playback_request_reservation(&self, id: usize, bytes: usize) -> Result<Reservation> {
        self.playback.lookup(id)?.lock().request_reservation(bytes)
    }

    pub fn playback_write_reservation(
        &self,
        id: usize,
        reservation: &Reservation,
        data: &[u8],
    ) -> Result<()> {
        self.playback
            .lookup(id)?
            .lock()
            .write_reservation(reservation, data)
    }

    pub fn playback_commit_reservation(&self, id: usize, bytes: usize) -> Result<()> {
        self.playback.lookup(id)?.lock().commit_reservation(bytes)
    }

    /// Bytes queued but not yet consumed by the render callback.
    pub fn playback_unplayed_size(&self, id: usize) -> Result<u32> {
        self.playback.lookup(id)?.lock().unplayed_size()
    }

    /// Close the device and free its id for reuse.
    pub fn playback_close(&self, id: usize) -> Result<()> {
        self.playback.close(id)
    }

    pub fn playback_open_count(&self) -> usize {
        self.playback.open_count()
    }

    // === Recording ===

    /// Open a recording device: allocate a slot, negotiate the input
    /// format and size the buffer pool. Returns the device id.
    pub fn recording_init(&self) -> Result<usize> {
        let backend = self.provider.capture_backend()?;
        self.recording
            .open(RecordingDevice::new(backend, self.config))
    }

    pub fn recording_sample_rate(&self, id: usize) -> Result<u32> {
        self.recording.lookup(id)?.lock().sample_rate()
    }

    pub fn recording_is_stereo(&self, id: usize) -> Result<bool> {
        self.recording.lookup(id)?.lock().is_stereo()
    }

    pub fn recording_state(&self, id: usize) -> Result<DeviceState> {
        Ok(self.recording.lookup(id)?.lock().state())
    }

    pub fn recording_start(&self, id: usize) -> Result<()> {
        self.recording.lookup(id)?.lock().start()
    }

    pub fn recording_stop(&self, id: usize) -> Result<()> {
        self.recording.lookup(id)?.lock().stop()
    }

    pub fn recording_reset(&self, id: usize) -> Result<()> {
        self.recording.lookup(id)?.lock().reset()
    }

    /// Drain all completed capture buffers into one contiguous result,
    /// empty if none are available.
    pub fn recording_get_data(&self, id: usize) -> Result<Bytes> {
        self.recording.lookup(id)?.lock().get_data()
    }

    /// Close the device and free its id for reuse.
    pub fn recording_close(&self, id: usize) -> Result<()> {
        self.recording.close(id)
    }

    pub fn recording_open_count(&self) -> usize {
        self.recording.open_count()
    }
}

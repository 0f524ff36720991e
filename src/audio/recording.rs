//! Recording device
//!
//! Owns the negotiated input format, the capture buffer pool, and the
//! backend that drives the hardware capture callback. The backend pushes
//! captured chunks into the pool through the sink installed at
//! initialization; the application drains completed buffers with
//! [`get_data`](RecordingDevice::get_data).

use bytes::Bytes;
use std::sync::Arc;

use crate::audio::pool::{PoolStats, RecordingPool};
use crate::audio::{operation_failed, DeviceState};
use crate::backend::{CaptureBackend, StreamFormat};
use crate::config::EngineConfig;
use crate::error::{AudioError, Result};

pub struct RecordingDevice {
    backend: Box<dyn CaptureBackend>,
    config: EngineConfig,
    format: Option<StreamFormat>,
    pool: Option<Arc<RecordingPool>>,
    state: DeviceState,
}

impl RecordingDevice {
    /// Create an uninitialized device around a backend. The registry
    /// calls [`initialize`](Self::initialize) before exposing it.
    pub fn new(backend: Box<dyn CaptureBackend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            format: None,
            pool: None,
            state: DeviceState::Uninitialized,
        }
    }

    /// Negotiate the input format, size and allocate the buffer pool and
    /// install the capture sink.
    ///
    /// The chunk size comes from the backend's preferred callback frame
    /// count, falling back to the configured value when the backend does
    /// not report one; the pool is sized to span roughly half a second.
    pub fn initialize(&mut self) -> Result<()> {
        if self.format.is_some() {
            return Err(AudioError::AlreadyInitialized);
        }
        let format = self.backend.negotiate()?;

        let chunk_frames = self
            .backend
            .preferred_chunk_frames()
            .unwrap_or(self.config.fallback_chunk_frames);
        let chunk_bytes = chunk_frames as usize * format.bytes_per_frame();
        let buffer_count = self.config.pool_buffer_count(format, chunk_bytes);

        let pool = Arc::new(RecordingPool::new(buffer_count, chunk_bytes));
        let sink_pool = Arc::clone(&pool);
        self.backend.install_sink(Box::new(move |data: &[u8]| {
            // A backend delivering more than one chunk at once still
            // fills the pool one buffer per cycle
            for piece in data.chunks(sink_pool.chunk_bytes().max(1)) {
                sink_pool.capture_into(piece);
            }
        }))?;

        self.format = Some(format);
        self.pool = Some(pool);
        self.state = DeviceState::Initialized;
        tracing::info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            chunk_bytes,
            buffer_count,
            "recording device initialized"
        );
        Ok(())
    }

    fn pool(&self) -> Result<&Arc<RecordingPool>> {
        self.pool.as_ref().ok_or(AudioError::NotInitialized)
    }

    fn format(&self) -> Result<StreamFormat> {
        self.format.ok_or(AudioError::NotInitialized)
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn sample_rate(&self) -> Result<u32> {
        Ok(self.format()?.sample_rate)
    }

    pub fn is_stereo(&self) -> Result<bool> {
        Ok(self.format()?.is_stereo())
    }

    /// Ask the backend to start the capture callback.
    pub fn start(&mut self) -> Result<()> {
        self.format()?;
        self.backend
            .start()
            .map_err(|e| operation_failed("Error starting", e))?;
        self.state = DeviceState::Started;
        tracing::debug!("recording started");
        Ok(())
    }

    /// Ask the backend to stop the capture callback.
    pub fn stop(&mut self) -> Result<()> {
        self.format()?;
        self.backend
            .stop()
            .map_err(|e| operation_failed("Error stopping", e))?;
        self.state = DeviceState::Stopped;
        tracing::debug!("recording stopped");
        Ok(())
    }

    /// Reset the backend's processing state and discard any buffered
    /// audio still in flight.
    pub fn reset(&mut self) -> Result<()> {
        let pool = Arc::clone(self.pool()?);
        self.backend
            .reset()
            .map_err(|e| operation_failed("Error resetting", e))?;
        pool.clear();
        tracing::debug!("recording reset");
        Ok(())
    }

    /// Take the oldest completed buffer, or `None` when nothing is
    /// unread.
    pub fn retrieve_buffer(&self) -> Result<Option<Bytes>> {
        Ok(self.pool()?.retrieve_buffer())
    }

    /// Drain all completed buffers into one contiguous result, empty if
    /// none are available.
    pub fn get_data(&self) -> Result<Bytes> {
        Ok(self.pool()?.drain_available())
    }

    pub fn stats(&self) -> Result<PoolStats> {
        Ok(self.pool()?.stats())
    }
}

impl Drop for RecordingDevice {
    fn drop(&mut self) {
        let _ = self.backend.stop();
    }
}

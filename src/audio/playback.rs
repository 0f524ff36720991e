//! Playback device
//!
//! Owns the negotiated output format, the ring buffer, and the backend
//! that drives the hardware render callback. The application pushes PCM
//! bytes in with [`add_data`](PlaybackDevice::add_data) (or the explicit
//! reservation protocol); the backend pulls them out through the render
//! handler installed at initialization.

use std::sync::Arc;

use crate::audio::ring::{PlaybackRing, Reservation, RingStats};
use crate::audio::{operation_failed, DeviceState};
use crate::backend::{PlaybackBackend, StreamFormat};
use crate::config::EngineConfig;
use crate::error::{AudioError, Result};

pub struct PlaybackDevice {
    backend: Box<dyn PlaybackBackend>,
    config: EngineConfig,
    format: Option<StreamFormat>,
    ring: Option<Arc<PlaybackRing>>,
    state: DeviceState,
}

impl PlaybackDevice {
    /// Create an uninitialized device around a backend. The registry
    /// calls [`initialize`](Self::initialize) before exposing it.
    pub fn new(backend: Box<dyn PlaybackBackend>, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            format: None,
            ring: None,
            state: DeviceState::Uninitialized,
        }
    }

    /// Negotiate the output format, allocate the ring buffer and install
    /// the render handler.
    ///
    /// A second call returns [`AudioError::AlreadyInitialized`] without
    /// side effects.
    pub fn initialize(&mut self) -> Result<()> {
        if self.format.is_some() {
            return Err(AudioError::AlreadyInitialized);
        }
        let format = self.backend.negotiate()?;

        let ring = Arc::new(PlaybackRing::new(self.config.playback_capacity_bytes(format)));
        let render_ring = Arc::clone(&ring);
        self.backend
            .install_renderer(Box::new(move |target: &mut [u8]| {
                render_ring.fill_into(target);
            }))?;

        self.format = Some(format);
        self.ring = Some(ring);
        self.state = DeviceState::Initialized;
        tracing::info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            "playback device initialized"
        );
        Ok(())
    }

    fn ring(&self) -> Result<&Arc<PlaybackRing>> {
        self.ring.as_ref().ok_or(AudioError::NotInitialized)
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

    /// Ask the backend to start the render callback.
    pub fn start(&mut self) -> Result<()> {
        self.format()?;
        self.backend
            .start()
            .map_err(|e| operation_failed("Error starting", e))?;
        self.state = DeviceState::Started;
        tracing::debug!("playback started");
        Ok(())
    }

    /// Ask the backend to stop the render callback.
    pub fn stop(&mut self) -> Result<()> {
        self.format()?;
        self.backend
            .stop()
            .map_err(|e| operation_failed("Error stopping", e))?;
        self.state = DeviceState::Stopped;
        tracing::debug!("playback stopped");
        Ok(())
    }

    /// Reset the backend's processing state and clear both ring cursors.
    pub fn reset(&mut self) -> Result<()> {
        let ring = Arc::clone(self.ring()?);
        self.backend
            .reset()
            .map_err(|e| operation_failed("Error resetting", e))?;
        ring.clear();
        tracing::debug!("playback reset");
        Ok(())
    }

    /// Request write spans for `bytes` bytes. See
    /// [`PlaybackRing::request_reservation`].
    pub fn request_reservation(&self, bytes: usize) -> Result<Reservation> {
        self.ring()?.request_reservation(bytes)
    }

    /// Copy `data` through a reservation's spans.
    pub fn write_reservation(&self, reservation: &Reservation, data: &[u8]) -> Result<()> {
        self.ring()?.write_reservation(reservation, data);
        Ok(())
    }

    /// Complete a reservation of `bytes` bytes.
    pub fn commit_reservation(&self, bytes: usize) -> Result<()> {
        self.ring()?.commit_reservation(bytes);
        Ok(())
    }

    /// Reserve, copy and commit `data` in one call.
    pub fn add_data(&self, data: &[u8]) -> Result<()> {
        self.ring()?.add(data)
    }

    /// Bytes queued for the render callback but not yet consumed.
    pub fn unplayed_size(&self) -> Result<u32> {
        Ok(self.ring()?.unplayed_bytes() as u32)
    }

    pub fn stats(&self) -> Result<RingStats> {
        Ok(self.ring()?.stats())
    }
}

impl Drop for PlaybackDevice {
    fn drop(&mut self) {
        let _ = self.backend.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FakePlaybackBackend, FakePlaybackHandle};

    fn device_with_handle(sample_rate: u32, channels: u16) -> (PlaybackDevice, FakePlaybackHandle) {
        let backend = FakePlaybackBackend::new(sample_rate, channels);
        let handle = backend.handle();
        let device = PlaybackDevice::new(Box::new(backend), EngineConfig::default());
        (device, handle)
    }

    #[test]
    fn test_initialize_negotiates_and_sizes_ring() {
        let (mut device, _handle) = device_with_handle(44100, 2);
        device.initialize().unwrap();
        assert_eq!(device.sample_rate().unwrap(), 44100);
        assert!(device.is_stereo().unwrap());
        assert_eq!(device.state(), DeviceState::Initialized);
        // 3 seconds of 16-bit stereo at 44.1 kHz
        assert_eq!(device.stats().unwrap().capacity, 3 * 44100 * 4);
    }

    #[test]
    fn test_initialize_twice_fails_without_side_effects() {
        let (mut device, _handle) = device_with_handle(48000, 1);
        device.initialize().unwrap();
        device.add_data(&[1, 2, 3, 4]).unwrap();
        assert!(matches!(
            device.initialize(),
            Err(AudioError::AlreadyInitialized)
        ));
        assert_eq!(device.unplayed_size().unwrap(), 4);
    }

    #[test]
    fn test_operations_before_initialize_fail() {
        let (mut device, _handle) = device_with_handle(48000, 2);
        assert!(matches!(device.start(), Err(AudioError::NotInitialized)));
        assert!(matches!(
            device.add_data(&[0, 0]),
            Err(AudioError::NotInitialized)
        ));
        assert!(matches!(
            device.unplayed_size(),
            Err(AudioError::NotInitialized)
        ));
    }

    #[test]
    fn test_negotiation_failure_leaves_device_uninitialized() {
        let (mut device, handle) = device_with_handle(48000, 2);
        handle.fail_negotiate("Failed to get device audio format");
        assert!(matches!(
            device.initialize(),
            Err(AudioError::BackendNegotiationFailed(_))
        ));
        assert_eq!(device.state(), DeviceState::Uninitialized);
        // A later attempt may succeed once the backend recovers
        handle.clear_failures();
        device.initialize().unwrap();
    }

    #[test]
    fn test_render_pulls_added_data_in_order() {
        let (mut device, handle) = device_with_handle(8000, 1);
        device.initialize().unwrap();
        device.start().unwrap();
        assert!(handle.is_started());

        device.add_data(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(device.unplayed_size().unwrap(), 6);

        let rendered = handle.drive_render(4);
        assert_eq!(rendered, vec![1, 2, 3, 4]);
        assert_eq!(device.unplayed_size().unwrap(), 2);

        // Underrun: the rest is silence
        let rendered = handle.drive_render(4);
        assert_eq!(rendered, vec![5, 6, 0, 0]);
        assert_eq!(device.unplayed_size().unwrap(), 0);
        assert_eq!(device.stats().unwrap().underruns, 1);
    }

    #[test]
    fn test_two_phase_reservation() {
        let (mut device, handle) = device_with_handle(8000, 1);
        device.initialize().unwrap();

        let reservation = device.request_reservation(4).unwrap();
        assert_eq!(reservation.len(), 4);
        device.write_reservation(&reservation, &[9, 8, 7, 6]).unwrap();
        // Nothing visible until commit
        assert_eq!(device.unplayed_size().unwrap(), 0);
        device.commit_reservation(4).unwrap();
        assert_eq!(device.unplayed_size().unwrap(), 4);
        assert_eq!(handle.drive_render(4), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_start_stop_failures_map_to_operation_errors() {
        let (mut device, handle) = device_with_handle(48000, 2);
        device.initialize().unwrap();

        handle.fail_start("device vanished");
        match device.start() {
            Err(AudioError::BackendOperationFailed(reason)) => {
                assert!(reason.starts_with("Error starting"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        handle.clear_failures();
        handle.fail_stop("device vanished");
        match device.stop() {
            Err(AudioError::BackendOperationFailed(reason)) => {
                assert!(reason.starts_with("Error stopping"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_reset_clears_queued_audio() {
        let (mut device, handle) = device_with_handle(8000, 1);
        device.initialize().unwrap();
        device.add_data(&[1, 2, 3, 4]).unwrap();
        device.reset().unwrap();
        assert_eq!(device.unplayed_size().unwrap(), 0);
        assert_eq!(handle.reset_count(), 1);
        assert_eq!(handle.drive_render(2), vec![0, 0]);
    }

    #[test]
    fn test_reset_failure_leaves_cursors_untouched() {
        let (mut device, handle) = device_with_handle(8000, 1);
        device.initialize().unwrap();
        device.add_data(&[1, 2]).unwrap();
        handle.fail_reset("busy");
        assert!(device.reset().is_err());
        assert_eq!(device.unplayed_size().unwrap(), 2);
    }
}

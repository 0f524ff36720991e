//! Scriptable in-memory backends
//!
//! These backends negotiate a configurable format, record lifecycle
//! requests, and let the caller invoke the installed handler directly,
//! standing in for the hardware thread. Tests use them to drive the
//! real-time path deterministically, to inject failures into any
//! operation, and to simulate a callback that straggles in after `stop`.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{AudioError, Result};

use super::{
    BackendProvider, CaptureBackend, CaptureFn, PlaybackBackend, RenderFn, StreamFormat,
};

#[derive(Default)]
struct Failures {
    negotiate: Mutex<Option<String>>,
    start: Mutex<Option<String>>,
    stop: Mutex<Option<String>>,
    reset: Mutex<Option<String>>,
}

fn check_op(slot: &Mutex<Option<String>>) -> Result<()> {
    match &*slot.lock() {
        Some(reason) => Err(AudioError::BackendOperationFailed(reason.clone())),
        None => Ok(()),
    }
}

struct PlaybackShared {
    format: StreamFormat,
    renderer: Mutex<Option<RenderFn>>,
    started: AtomicBool,
    resets: AtomicUsize,
    failures: Failures,
}

/// Fake output backend. Obtain a [`FakePlaybackHandle`] before handing the
/// backend to a device to keep driving it afterwards.
pub struct FakePlaybackBackend {
    shared: Arc<PlaybackShared>,
}

impl FakePlaybackBackend {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            shared: Arc::new(PlaybackShared {
                format: StreamFormat::new(sample_rate, channels),
                renderer: Mutex::new(None),
                started: AtomicBool::new(false),
                resets: AtomicUsize::new(0),
                failures: Failures::default(),
            }),
        }
    }

    pub fn handle(&self) -> FakePlaybackHandle {
        FakePlaybackHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for FakePlaybackBackend {
    fn default() -> Self {
        Self::new(48000, 2)
    }
}

impl PlaybackBackend for FakePlaybackBackend {
    fn negotiate(&mut self) -> Result<StreamFormat> {
        if let Some(reason) = &*self.shared.failures.negotiate.lock() {
            return Err(AudioError::BackendNegotiationFailed(reason.clone()));
        }
        Ok(self.shared.format)
    }

    fn install_renderer(&mut self, renderer: RenderFn) -> Result<()> {
        *self.shared.renderer.lock() = Some(renderer);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        check_op(&self.shared.failures.start)?;
        self.shared.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        check_op(&self.shared.failures.stop)?;
        self.shared.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        check_op(&self.shared.failures.reset)?;
        self.shared.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Control handle for a [`FakePlaybackBackend`].
#[derive(Clone)]
pub struct FakePlaybackHandle {
    shared: Arc<PlaybackShared>,
}

impl FakePlaybackHandle {
    /// Invoke the installed render handler with a buffer of `bytes` bytes,
    /// the way the hardware thread would, and return what it produced.
    ///
    /// Works regardless of the started flag so tests can simulate a
    /// callback arriving after `stop`.
    pub fn drive_render(&self, bytes: usize) -> Vec<u8> {
        let mut target = vec![0u8; bytes];
        if let Some(renderer) = self.shared.renderer.lock().as_mut() {
            renderer(&mut target);
        }
        target
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.shared.resets.load(Ordering::SeqCst)
    }

    pub fn fail_negotiate(&self, reason: &str) {
        *self.shared.failures.negotiate.lock() = Some(reason.to_string());
    }

    pub fn fail_start(&self, reason: &str) {
        *self.shared.failures.start.lock() = Some(reason.to_string());
    }

    pub fn fail_stop(&self, reason: &str) {
        *self.shared.failures.stop.lock() = Some(reason.to_string());
    }

    pub fn fail_reset(&self, reason: &str) {
        *self.shared.failures.reset.lock() = Some(reason.to_string());
    }

    pub fn clear_failures(&self) {
        *self.shared.failures.negotiate.lock() = None;
        *self.shared.failures.start.lock() = None;
        *self.shared.failures.stop.lock() = None;
        *self.shared.failures.reset.lock() = None;
    }
}

struct CaptureShared {
    format: StreamFormat,
    chunk_frames: u32,
    sink: Mutex<Option<CaptureFn>>,
    started: AtomicBool,
    resets: AtomicUsize,
    failures: Failures,
}

/// Fake input backend, mirror of [`FakePlaybackBackend`].
pub struct FakeCaptureBackend {
    shared: Arc<CaptureShared>,
}

impl FakeCaptureBackend {
    pub fn new(sample_rate: u32, channels: u16, chunk_frames: u32) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                format: StreamFormat::new(sample_rate, channels),
                chunk_frames,
                sink: Mutex::new(None),
                started: AtomicBool::new(false),
                resets: AtomicUsize::new(0),
                failures: Failures::default(),
            }),
        }
    }

    pub fn handle(&self) -> FakeCaptureHandle {
        FakeCaptureHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for FakeCaptureBackend {
    fn default() -> Self {
        Self::new(48000, 2, 512)
    }
}

impl CaptureBackend for FakeCaptureBackend {
    fn negotiate(&mut self) -> Result<StreamFormat> {
        if let Some(reason) = &*self.shared.failures.negotiate.lock() {
            return Err(AudioError::BackendNegotiationFailed(reason.clone()));
        }
        Ok(self.shared.format)
    }

    fn preferred_chunk_frames(&self) -> Option<u32> {
        Some(self.shared.chunk_frames)
    }

    fn install_sink(&mut self, sink: CaptureFn) -> Result<()> {
        *self.shared.sink.lock() = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        check_op(&self.shared.failures.start)?;
        self.shared.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        check_op(&self.shared.failures.stop)?;
        self.shared.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        check_op(&self.shared.failures.reset)?;
        self.shared.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Control handle for a [`FakeCaptureBackend`].
#[derive(Clone)]
pub struct FakeCaptureHandle {
    shared: Arc<CaptureShared>,
}

impl FakeCaptureHandle {
    /// Deliver a captured chunk to the installed sink, the way the
    /// hardware thread would. Works regardless of the started flag.
    pub fn drive_capture(&self, chunk: &[u8]) {
        if let Some(sink) = self.shared.sink.lock().as_mut() {
            sink(chunk);
        }
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    pub fn reset_count(&self) -> usize {
        self.shared.resets.load(Ordering::SeqCst)
    }

    pub fn fail_negotiate(&self, reason: &str) {
        *self.shared.failures.negotiate.lock() = Some(reason.to_string());
    }

    pub fn fail_start(&self, reason: &str) {
        *self.shared.failures.start.lock() = Some(reason.to_string());
    }

    pub fn fail_stop(&self, reason: &str) {
        *self.shared.failures.stop.lock() = Some(reason.to_string());
    }

    pub fn fail_reset(&self, reason: &str) {
        *self.shared.failures.reset.lock() = Some(reason.to_string());
    }
}

/// Provider handing out fake backends.
///
/// Backends queued with [`queue_playback`](Self::queue_playback) and
/// [`queue_capture`](Self::queue_capture) are handed out first-in
/// first-out; once the queue is empty a default backend is created. A
/// handle to every backend handed out is retained and can be fetched by
/// device-open order.
#[derive(Default)]
pub struct FakeProvider {
    playback_queue: Mutex<Vec<FakePlaybackBackend>>,
    capture_queue: Mutex<Vec<FakeCaptureBackend>>,
    playback_handles: Mutex<Vec<FakePlaybackHandle>>,
    capture_handles: Mutex<Vec<FakeCaptureHandle>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_playback(&self, backend: FakePlaybackBackend) {
        self.playback_queue.lock().push(backend);
    }

    pub fn queue_capture(&self, backend: FakeCaptureBackend) {
        self.capture_queue.lock().push(backend);
    }

    /// Handles to playback backends already handed out, oldest first.
    pub fn playback_handles(&self) -> Vec<FakePlaybackHandle> {
        self.playback_handles.lock().clone()
    }

    /// Handles to capture backends already handed out, oldest first.
    pub fn capture_handles(&self) -> Vec<FakeCaptureHandle> {
        self.capture_handles.lock().clone()
    }
}

impl BackendProvider for FakeProvider {
    fn playback_backend(&self) -> Result<Box<dyn PlaybackBackend>> {
        let mut queue = self.playback_queue.lock();
        let backend = if queue.is_empty() {
            FakePlaybackBackend::default()
        } else {
            queue.remove(0)
        };
        self.playback_handles.lock().push(backend.handle());
        Ok(Box::new(backend))
    }

    fn capture_backend(&self) -> Result<Box<dyn CaptureBackend>> {
        let mut queue = self.capture_queue.lock();
        let backend = if queue.is_empty() {
            FakeCaptureBackend::default()
        } else {
            queue.remove(0)
        };
        self.capture_handles.lock().push(backend.handle());
        Ok(Box::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_handler_round_trip() {
        let mut backend = FakePlaybackBackend::new(8000, 1);
        let handle = backend.handle();
        backend
            .install_renderer(Box::new(|target: &mut [u8]| {
                for (i, byte) in target.iter_mut().enumerate() {
                    *byte = i as u8;
                }
            }))
            .unwrap();
        assert_eq!(handle.drive_render(4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_failure_injection() {
        let mut backend = FakePlaybackBackend::default();
        let handle = backend.handle();
        handle.fail_start("injected");
        assert!(matches!(
            backend.start(),
            Err(AudioError::BackendOperationFailed(reason)) if reason == "injected"
        ));
        handle.clear_failures();
        backend.start().unwrap();
        assert!(handle.is_started());
    }

    #[test]
    fn test_provider_hands_out_queued_backends_in_order() {
        let provider = FakeProvider::new();
        provider.queue_capture(FakeCaptureBackend::new(22050, 1, 256));
        let mut first = provider.capture_backend().unwrap();
        let mut second = provider.capture_backend().unwrap();
        assert_eq!(first.negotiate().unwrap().sample_rate, 22050);
        // Queue exhausted, default backend follows
        assert_eq!(second.negotiate().unwrap().sample_rate, 48000);
        assert_eq!(provider.capture_handles().len(), 2);
    }
}

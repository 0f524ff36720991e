//! Integration tests driving the public control surface against fake
//! backends, including the hardware-callback side of each device.

use pcm_duplex::audio::DeviceState;
use pcm_duplex::backend::{FakeCaptureBackend, FakePlaybackBackend, FakeProvider};
use pcm_duplex::{AudioError, AudioSystem, EngineConfig};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn fake_system() -> (AudioSystem, std::sync::Arc<FakeProvider>) {
    // The provider is shared so tests can reach the backend handles of
    // devices the system opens.
    let provider = std::sync::Arc::new(FakeProvider::new());
    let system = AudioSystem::new(Box::new(SharedProvider(provider.clone())), EngineConfig::default());
    (system, provider)
}

struct SharedProvider(std::sync::Arc<FakeProvider>);

impl pcm_duplex::backend::BackendProvider for SharedProvider {
    fn playback_backend(
        &self,
    ) -> pcm_duplex::Result<Box<dyn pcm_duplex::backend::PlaybackBackend>> {
        self.0.playback_backend()
    }

    fn capture_backend(
        &self,
    ) -> pcm_duplex::Result<Box<dyn pcm_duplex::backend::CaptureBackend>> {
        self.0.capture_backend()
    }
}

#[test]
fn registry_fills_then_rejects_then_reuses_ids() {
    init_logging();
    let (system, _provider) = fake_system();

    for expected in 0..16 {
        assert_eq!(system.recording_init().unwrap(), expected);
    }
    assert!(matches!(
        system.recording_init(),
        Err(AudioError::NoSlotsAvailable)
    ));

    system.recording_close(3).unwrap();
    assert_eq!(system.recording_init().unwrap(), 3);
    assert_eq!(system.recording_open_count(), 16);
}

#[test]
fn recording_and_playback_registries_are_independent() {
    let (system, _provider) = fake_system();

    for _ in 0..16 {
        system.playback_init().unwrap();
    }
    // A full playback registry leaves recording untouched
    assert_eq!(system.recording_init().unwrap(), 0);
    assert_eq!(system.playback_open_count(), 16);
    assert_eq!(system.recording_open_count(), 1);
}

#[test]
fn playback_round_trip_through_render_callback() {
    init_logging();
    let (system, provider) = fake_system();
    provider.queue_playback(FakePlaybackBackend::new(8000, 1));

    let id = system.playback_init().unwrap();
    assert_eq!(system.playback_sample_rate(id).unwrap(), 8000);
    assert!(!system.playback_is_stereo(id).unwrap());
    assert_eq!(system.playback_state(id).unwrap(), DeviceState::Initialized);

    system.playback_start(id).unwrap();
    assert_eq!(system.playback_state(id).unwrap(), DeviceState::Started);
    let handle = provider.playback_handles()[0].clone();
    assert!(handle.is_started());

    system.playback_add_data(id, &[10, 11, 12, 13, 14, 15]).unwrap();
    assert_eq!(system.playback_unplayed_size(id).unwrap(), 6);

    assert_eq!(handle.drive_render(4), vec![10, 11, 12, 13]);
    assert_eq!(system.playback_unplayed_size(id).unwrap(), 2);

    // Underrun pads with silence and consumes only what was queued
    assert_eq!(handle.drive_render(4), vec![14, 15, 0, 0]);
    assert_eq!(system.playback_unplayed_size(id).unwrap(), 0);

    system.playback_stop(id).unwrap();
    assert!(!handle.is_started());
    assert_eq!(system.playback_state(id).unwrap(), DeviceState::Stopped);
}

#[test]
fn playback_reservation_wraps_at_ring_end() {
    let (system, provider) = fake_system();
    // 8 kHz mono makes a 3-second ring of exactly 48000 bytes
    provider.queue_playback(FakePlaybackBackend::new(8000, 1));
    let id = system.playback_init().unwrap();
    let handle = provider.playback_handles()[0].clone();

    // Walk both cursors to 47600
    system.playback_add_data(id, &vec![1u8; 47600]).unwrap();
    handle.drive_render(47600);

    let reservation = system.playback_request_reservation(id, 1000).unwrap();
    assert_eq!(reservation.first.offset, 47600);
    assert_eq!(reservation.first.len, 400);
    let second = reservation.second.unwrap();
    assert_eq!(second.offset, 0);
    assert_eq!(second.len, 600);

    let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
    system
        .playback_write_reservation(id, &reservation, &data)
        .unwrap();
    system.playback_commit_reservation(id, 1000).unwrap();
    assert_eq!(system.playback_unplayed_size(id).unwrap(), 1000);

    // The write cursor wrapped to 600
    let next = system.playback_request_reservation(id, 8).unwrap();
    assert_eq!(next.first.offset, 600);

    assert_eq!(handle.drive_render(1000), data);
}

#[test]
fn playback_rejects_data_beyond_ring_capacity() {
    let (system, provider) = fake_system();
    provider.queue_playback(FakePlaybackBackend::new(8000, 1));
    let id = system.playback_init().unwrap();

    system.playback_add_data(id, &vec![0u8; 47999]).unwrap();
    assert!(matches!(
        system.playback_add_data(id, &[0]),
        Err(AudioError::InsufficientSpace)
    ));
    // The failed add consumed nothing
    assert_eq!(system.playback_unplayed_size(id).unwrap(), 47999);
}

#[test]
fn recording_drains_captured_chunks_in_order() {
    init_logging();
    let (system, provider) = fake_system();
    provider.queue_capture(FakeCaptureBackend::new(8000, 1, 2));

    let id = system.recording_init().unwrap();
    assert_eq!(system.recording_sample_rate(id).unwrap(), 8000);
    assert!(!system.recording_is_stereo(id).unwrap());

    system.recording_start(id).unwrap();
    assert_eq!(system.recording_state(id).unwrap(), DeviceState::Started);
    let handle = provider.capture_handles()[0].clone();

    handle.drive_capture(&[1, 2, 3, 4]);
    handle.drive_capture(&[5, 6, 7, 8]);
    let data = system.recording_get_data(id).unwrap();
    assert_eq!(&data[..], &[1, 2, 3, 4, 5, 6, 7, 8]);

    // Empty once drained
    assert!(system.recording_get_data(id).unwrap().is_empty());
}

#[test]
fn recording_overflow_drops_oldest_chunk() {
    let (system, provider) = fake_system();
    provider.queue_capture(FakeCaptureBackend::new(8000, 1, 2));

    // A 1 ms pool span yields 16 bytes, so four 4-byte buffers
    let config = EngineConfig {
        pool_span_ms: 1,
        ..EngineConfig::default()
    };
    let system = {
        drop(system);
        AudioSystem::new(Box::new(SharedProvider(provider.clone())), config)
    };

    let id = system.recording_init().unwrap();
    let handle = provider.capture_handles()[0].clone();

    for value in 0..5u8 {
        handle.drive_capture(&[value; 4]);
    }

    // The first capture was dropped; the remaining four drain in order
    let data = system.recording_get_data(id).unwrap();
    assert_eq!(data.len(), 16);
    for (i, chunk) in data.chunks(4).enumerate() {
        assert_eq!(chunk, &[(i + 1) as u8; 4]);
    }
}

#[test]
fn recording_reset_discards_pending_audio() {
    let (system, provider) = fake_system();
    provider.queue_capture(FakeCaptureBackend::new(8000, 1, 2));
    let id = system.recording_init().unwrap();
    let handle = provider.capture_handles()[0].clone();

    handle.drive_capture(&[1, 2, 3, 4]);
    system.recording_reset(id).unwrap();
    assert!(system.recording_get_data(id).unwrap().is_empty());
    assert_eq!(handle.reset_count(), 1);
}

#[test]
fn failed_initialization_reclaims_the_slot() {
    let (system, provider) = fake_system();
    let failing = FakePlaybackBackend::default();
    failing.handle().fail_negotiate("Failed to open audio component");
    provider.queue_playback(failing);

    assert!(matches!(
        system.playback_init(),
        Err(AudioError::BackendNegotiationFailed(_))
    ));
    assert_eq!(system.playback_open_count(), 0);

    // The freed slot is handed out to the next open
    assert_eq!(system.playback_init().unwrap(), 0);
}

#[test]
fn backend_lifecycle_failures_map_to_operation_errors() {
    let (system, provider) = fake_system();
    let backend = FakePlaybackBackend::default();
    let handle = backend.handle();
    provider.queue_playback(backend);
    let id = system.playback_init().unwrap();

    handle.fail_start("hardware gone");
    match system.playback_start(id) {
        Err(AudioError::BackendOperationFailed(reason)) => {
            assert!(reason.starts_with("Error starting"));
        }
        other => panic!("unexpected: {:?}", other),
    }

    handle.clear_failures();
    handle.fail_reset("hardware gone");
    match system.playback_reset(id) {
        Err(AudioError::BackendOperationFailed(reason)) => {
            assert!(reason.starts_with("Error resetting"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn operations_on_closed_or_invalid_ids_fail() {
    let (system, _provider) = fake_system();
    let id = system.playback_init().unwrap();
    system.playback_close(id).unwrap();

    assert!(matches!(
        system.playback_add_data(id, &[0, 0]),
        Err(AudioError::InvalidDeviceId)
    ));
    assert!(matches!(
        system.playback_sample_rate(id),
        Err(AudioError::InvalidDeviceId)
    ));
    assert!(matches!(
        system.playback_close(id),
        Err(AudioError::InvalidDeviceId)
    ));
    assert!(matches!(
        system.recording_get_data(42),
        Err(AudioError::InvalidDeviceId)
    ));
}

#[test]
fn straggling_callbacks_after_stop_and_close_are_harmless() {
    init_logging();
    let (system, provider) = fake_system();
    provider.queue_playback(FakePlaybackBackend::new(8000, 1));
    provider.queue_capture(FakeCaptureBackend::new(8000, 1, 2));

    let pb = system.playback_init().unwrap();
    let rec = system.recording_init().unwrap();
    system.playback_start(pb).unwrap();
    system.recording_start(rec).unwrap();

    let pb_handle = provider.playback_handles()[0].clone();
    let rec_handle = provider.capture_handles()[0].clone();

    system.playback_add_data(pb, &[1, 2, 3, 4]).unwrap();
    system.playback_stop(pb).unwrap();
    system.recording_stop(rec).unwrap();

    // A callback already in flight when stop returned still sees
    // consistent buffer state
    assert_eq!(pb_handle.drive_render(2), vec![1, 2]);
    rec_handle.drive_capture(&[9, 9, 9, 9]);
    assert_eq!(&system.recording_get_data(rec).unwrap()[..], &[9, 9, 9, 9]);

    system.playback_close(pb).unwrap();
    system.recording_close(rec).unwrap();

    // Even after close, the handlers hold the buffers alive; a straggler
    // must not crash or corrupt anything
    assert_eq!(pb_handle.drive_render(4), vec![3, 4, 0, 0]);
    rec_handle.drive_capture(&[7, 7, 7, 7]);
}

#[test]
fn concurrent_producer_and_consumer_preserve_fifo_order() {
    let (system, provider) = fake_system();
    provider.queue_playback(FakePlaybackBackend::new(8000, 1));
    let id = system.playback_init().unwrap();
    let handle = provider.playback_handles()[0].clone();

    let system = std::sync::Arc::new(system);
    let producer = {
        let system = std::sync::Arc::clone(&system);
        std::thread::spawn(move || {
            let mut value: u8 = 0;
            let mut queued: usize = 0;
            while queued < 20_000 {
                let chunk: Vec<u8> = (0..50).map(|_| {
                    value = value.wrapping_add(1);
                    value
                }).collect();
                loop {
                    match system.playback_add_data(id, &chunk) {
                        Ok(()) => break,
                        Err(AudioError::InsufficientSpace) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected: {:?}", e),
                    }
                }
                queued += chunk.len();
            }
        })
    };

    // Consume from this thread the way the hardware would, checking the
    // byte sequence never skips or repeats
    let mut expected: u8 = 0;
    let mut consumed = 0usize;
    while consumed < 20_000 {
        let available = system.playback_unplayed_size(id).unwrap() as usize;
        if available == 0 {
            std::thread::yield_now();
            continue;
        }
        let take = available.min(100);
        for byte in handle.drive_render(take) {
            expected = expected.wrapping_add(1);
            assert_eq!(byte, expected);
        }
        consumed += take;
    }

    producer.join().unwrap();
}

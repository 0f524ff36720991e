//! Default-host backends over cpal
//!
//! Each backend owns its cpal stream through a dedicated worker thread:
//! streams are not `Send` on every platform, so the stream is built and
//! kept on one thread and lifecycle requests are forwarded to it over a
//! bounded channel. Samples cross the boundary as little-endian bytes of
//! the negotiated 16-bit format.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use std::thread::{self, JoinHandle};

use crate::error::{AudioError, Result};

use super::{
    BackendProvider, CaptureBackend, CaptureFn, PlaybackBackend, RenderFn, StreamFormat,
};

/// Chunk size requested from the host when it reports a supported range.
const TARGET_CHUNK_FRAMES: u32 = 512;

enum StreamCommand {
    Play(Sender<std::result::Result<(), String>>),
    Pause(Sender<std::result::Result<(), String>>),
    Shutdown,
}

/// Owns the thread that owns the cpal stream.
struct StreamWorker {
    commands: Sender<StreamCommand>,
    handle: Option<JoinHandle<()>>,
}

impl StreamWorker {
    fn request(&self, make: impl FnOnce(Sender<std::result::Result<(), String>>) -> StreamCommand) -> Result<()> {
        let (ack_tx, ack_rx) = bounded(1);
        self.commands
            .send(make(ack_tx))
            .map_err(|_| AudioError::BackendOperationFailed("stream worker unavailable".into()))?;
        match ack_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(AudioError::BackendOperationFailed(reason)),
            Err(_) => Err(AudioError::BackendOperationFailed(
                "stream worker unavailable".into(),
            )),
        }
    }

    fn play(&self) -> Result<()> {
        self.request(StreamCommand::Play)
    }

    fn pause(&self) -> Result<()> {
        self.request(StreamCommand::Pause)
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(StreamCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn stream_config(format: StreamFormat) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Output backend for the default cpal host.
pub struct HostPlaybackBackend {
    format: Option<StreamFormat>,
    renderer: Option<RenderFn>,
    worker: Option<StreamWorker>,
}

impl HostPlaybackBackend {
    pub fn new() -> Self {
        Self {
            format: None,
            renderer: None,
            worker: None,
        }
    }

    /// Build the output stream on its own thread and start it playing.
    fn spawn_worker(&mut self, format: StreamFormat, mut renderer: RenderFn) -> Result<StreamWorker> {
        let (cmd_tx, cmd_rx) = bounded::<StreamCommand>(4);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);

        let handle = thread::Builder::new()
            .name("playback-stream".into())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_output_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err("no default output device".into()));
                        return;
                    }
                };

                let config = stream_config(format);
                let mut scratch: Vec<u8> = Vec::new();
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        scratch.resize(data.len() * 2, 0);
                        renderer(&mut scratch);
                        for (sample, bytes) in data.iter_mut().zip(scratch.chunks_exact(2)) {
                            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
                        }
                    },
                    |err| {
                        tracing::warn!("output stream error: {}", err);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                for command in cmd_rx {
                    match command {
                        StreamCommand::Play(ack) => {
                            let _ = ack.send(stream.play().map_err(|e| e.to_string()));
                        }
                        StreamCommand::Pause(ack) => {
                            let _ = ack.send(stream.pause().map_err(|e| e.to_string()));
                        }
                        StreamCommand::Shutdown => break,
                    }
                }
            })
            .map_err(|e| AudioError::BackendOperationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamWorker {
                commands: cmd_tx,
                handle: Some(handle),
            }),
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(AudioError::BackendOperationFailed(reason))
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::BackendOperationFailed(
                    "stream worker unavailable".into(),
                ))
            }
        }
    }
}

impl Default for HostPlaybackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackBackend for HostPlaybackBackend {
    fn negotiate(&mut self) -> Result<StreamFormat> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or_else(|| {
            AudioError::BackendNegotiationFailed("Failed to find default output device".into())
        })?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::BackendNegotiationFailed(e.to_string()))?;
        let format = StreamFormat::new(config.sample_rate().0, config.channels());
        self.format = Some(format);
        Ok(format)
    }

    fn install_renderer(&mut self, renderer: RenderFn) -> Result<()> {
        self.renderer = Some(renderer);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            return worker.play();
        }
        let format = self.format.ok_or(AudioError::NotInitialized)?;
        let renderer = self.renderer.take().ok_or(AudioError::NotInitialized)?;
        let worker = self.spawn_worker(format, renderer)?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        match &self.worker {
            Some(worker) => worker.pause(),
            // Stopping a stream that was never started is a no-op.
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<()> {
        // The shared host keeps no per-stream processing state to flush.
        Ok(())
    }
}

/// Input backend for the default cpal host.
pub struct HostCaptureBackend {
    format: Option<StreamFormat>,
    chunk_frames: Option<u32>,
    sink: Option<CaptureFn>,
    worker: Option<StreamWorker>,
}

impl HostCaptureBackend {
    pub fn new() -> Self {
        Self {
            format: None,
            chunk_frames: None,
            sink: None,
            worker: None,
        }
    }

    fn spawn_worker(&mut self, format: StreamFormat, mut sink: CaptureFn) -> Result<StreamWorker> {
        let (cmd_tx, cmd_rx) = bounded::<StreamCommand>(4);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);

        let handle = thread::Builder::new()
            .name("capture-stream".into())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err("no default input device".into()));
                        return;
                    }
                };

                let config = stream_config(format);
                let mut scratch: Vec<u8> = Vec::new();
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        for sample in data {
                            scratch.extend_from_slice(&sample.to_le_bytes());
                        }
                        sink(&scratch);
                    },
                    |err| {
                        tracing::warn!("input stream error: {}", err);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                for command in cmd_rx {
                    match command {
                        StreamCommand::Play(ack) => {
                            let _ = ack.send(stream.play().map_err(|e| e.to_string()));
                        }
                        StreamCommand::Pause(ack) => {
                            let _ = ack.send(stream.pause().map_err(|e| e.to_string()));
                        }
                        StreamCommand::Shutdown => break,
                    }
                }
            })
            .map_err(|e| AudioError::BackendOperationFailed(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(StreamWorker {
                commands: cmd_tx,
                handle: Some(handle),
            }),
            Ok(Err(reason)) => {
                let _ = handle.join();
                Err(AudioError::BackendOperationFailed(reason))
            }
            Err(_) => {
                let _ = handle.join();
                Err(AudioError::BackendOperationFailed(
                    "stream worker unavailable".into(),
                ))
            }
        }
    }
}

impl Default for HostCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for HostCaptureBackend {
    fn negotiate(&mut self) -> Result<StreamFormat> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or_else(|| {
            AudioError::BackendNegotiationFailed("Failed to find default input device".into())
        })?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::BackendNegotiationFailed(e.to_string()))?;

        self.chunk_frames = match config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => {
                Some(TARGET_CHUNK_FRAMES.clamp(*min, *max))
            }
            cpal::SupportedBufferSize::Unknown => None,
        };

        let format = StreamFormat::new(config.sample_rate().0, config.channels());
        self.format = Some(format);
        Ok(format)
    }

    fn preferred_chunk_frames(&self) -> Option<u32> {
        self.chunk_frames
    }

    fn install_sink(&mut self, sink: CaptureFn) -> Result<()> {
        self.sink = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            return worker.play();
        }
        let format = self.format.ok_or(AudioError::NotInitialized)?;
        let sink = self.sink.take().ok_or(AudioError::NotInitialized)?;
        let worker = self.spawn_worker(format, sink)?;
        self.worker = Some(worker);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        match &self.worker {
            Some(worker) => worker.pause(),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Provider for the default cpal host.
pub struct HostProvider;

impl BackendProvider for HostProvider {
    fn playback_backend(&self) -> Result<Box<dyn PlaybackBackend>> {
        Ok(Box::new(HostPlaybackBackend::new()))
    }

    fn capture_backend(&self) -> Result<Box<dyn CaptureBackend>> {
        Ok(Box::new(HostCaptureBackend::new()))
    }
}

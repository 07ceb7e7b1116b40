use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use tracing::{debug, info, warn};

use crate::backend::lock;
use crate::decode::{decode_file, DecodedAudio};
use crate::native::{NativeCallback, NativeMedia, NativeMediaFactory};
use crate::{AudioSource, BackendError};

/// Playhead shared between the device callback and the backend.
struct Deck {
    audio: DecodedAudio,
    /// Position in source frames.
    cursor: f64,
    playing: bool,
    volume: f32,
    callbacks: VecDeque<NativeCallback>,
}

impl Deck {
    fn new(audio: DecodedAudio) -> Self {
        Self {
            audio,
            cursor: 0.0,
            playing: false,
            volume: 1.0,
            callbacks: VecDeque::from([NativeCallback::Prepared]),
        }
    }

    fn frames(&self) -> f64 {
        self.audio.frames() as f64
    }

    fn rate(&self) -> f64 {
        f64::from(self.audio.sample_rate.max(1))
    }

    fn position(&self) -> Duration {
        Duration::from_secs_f64(self.cursor / self.rate())
    }

    fn raise(&mut self, callback: NativeCallback) {
        // one pending tick is enough, position is read when it is polled
        if callback == NativeCallback::PositionTick
            && self.callbacks.back() == Some(&NativeCallback::PositionTick)
        {
            return;
        }
        self.callbacks.push_back(callback);
    }

    /// Fills `out` with interleaved frames `channels` wide at `device_rate`,
    /// resampling linearly. Writes silence while paused.
    fn render(&mut self, out: &mut [f32], channels: usize, device_rate: u32) {
        if !self.playing {
            out.fill(0.0);
            return;
        }
        let channels = channels.max(1);
        let source_channels = usize::from(self.audio.channels.max(1));
        let frames = self.audio.frames();
        let step = self.rate() / f64::from(device_rate.max(1));
        for frame in out.chunks_mut(channels) {
            if self.cursor >= frames as f64 {
                frame.fill(0.0);
                continue;
            }
            let index = self.cursor as usize;
            let next = (index + 1).min(frames - 1);
            let frac = (self.cursor - index as f64) as f32;
            for (channel, sample) in frame.iter_mut().enumerate() {
                let source = channel % source_channels;
                let a = self.audio.samples[index * source_channels + source];
                let b = self.audio.samples[next * source_channels + source];
                *sample = (a + (b - a) * frac) * self.volume;
            }
            self.cursor += step;
        }
        if self.cursor >= frames as f64 {
            self.cursor = frames as f64;
            self.playing = false;
            self.raise(NativeCallback::Completed);
        } else {
            self.raise(NativeCallback::PositionTick);
        }
    }
}

/// Decoded file played through a cpal output stream. The stream lives on its
/// own thread because cpal streams are not `Send` on every host.
pub struct CpalMedia {
    deck: Arc<Mutex<Deck>>,
    shutdown: Option<mpsc::Sender<()>>,
    duration: Duration,
}

impl CpalMedia {
    fn deck(&mut self) -> Result<std::sync::MutexGuard<'_, Deck>, BackendError> {
        if self.shutdown.is_none() {
            return Err(BackendError::DisposedStateAccess);
        }
        Ok(lock(&self.deck))
    }
}

impl NativeMedia for CpalMedia {
    fn start(&mut self) -> Result<(), BackendError> {
        let mut deck = self.deck()?;
        if deck.cursor >= deck.frames() {
            deck.cursor = 0.0;
        }
        deck.playing = true;
        deck.raise(NativeCallback::Started);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        let mut deck = self.deck()?;
        deck.playing = false;
        deck.raise(NativeCallback::Paused);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        let mut deck = self.deck()?;
        deck.playing = false;
        deck.cursor = 0.0;
        deck.raise(NativeCallback::Stopped);
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<(), BackendError> {
        let mut deck = self.deck()?;
        deck.cursor = (position.as_secs_f64() * deck.rate()).min(deck.frames());
        deck.raise(NativeCallback::SeekComplete);
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), BackendError> {
        self.deck()?.volume = volume;
        Ok(())
    }

    fn position(&self) -> Option<Duration> {
        Some(lock(&self.deck).position())
    }

    fn duration(&self) -> Option<Duration> {
        Some(self.duration)
    }

    fn poll_callback(&mut self) -> Option<NativeCallback> {
        lock(&self.deck).callbacks.pop_front()
    }

    fn release(&mut self) {
        lock(&self.deck).playing = false;
        // dropping the sender wakes the output thread, which drops the stream
        if self.shutdown.take().is_some() {
            debug!("released cpal output");
        }
    }
}

impl Drop for CpalMedia {
    fn drop(&mut self) {
        self.release();
    }
}

/// Opens local audio files on a cpal output device. MIDI and remote sources are
/// reported as unsupported.
#[derive(Clone, Debug, Default)]
pub struct CpalMediaFactory {
    device: Option<String>,
}

impl CpalMediaFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the output device with this name instead of the host default.
    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device = Some(name.into());
        self
    }
}

#[async_trait]
impl NativeMediaFactory for CpalMediaFactory {
    async fn open(&self, source: &AudioSource) -> Result<Box<dyn NativeMedia>, BackendError> {
        if source.is_midi() {
            return Err(BackendError::UnsupportedSource(format!(
                "no synthesizer for MIDI sources ({source})"
            )));
        }
        let path: PathBuf = source.local_path().map(Path::to_path_buf).ok_or_else(|| {
            BackendError::UnsupportedSource(format!("only local files can be played ({source})"))
        })?;
        let device = self.device.clone();
        tokio::task::spawn_blocking(move || open_media(&path, device))
            .await
            .map_err(|err| BackendError::Platform(format!("audio loader stopped: {err}")))?
    }
}

fn open_media(path: &Path, device: Option<String>) -> Result<Box<dyn NativeMedia>, BackendError> {
    let audio = decode_file(path)?;
    let duration = audio.duration();
    let deck = Arc::new(Mutex::new(Deck::new(audio)));
    let (ready_tx, ready_rx) = mpsc::channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let shared = deck.clone();
    thread::Builder::new()
        .name("wave2notes-output".into())
        .spawn(move || {
            let stream = match build_stream(device.as_deref(), shared) {
                Ok(stream) => stream,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            if let Err(err) = stream.play() {
                let _ = ready_tx.send(Err(platform(err)));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            // parked until the media is released
            let _ = shutdown_rx.recv();
            drop(stream);
            debug!("output stream closed");
        })
        .map_err(|err| BackendError::Platform(format!("spawn output thread: {err}")))?;
    ready_rx
        .recv()
        .map_err(|_| BackendError::Platform("output thread exited early".into()))??;
    info!(path = ?path, ?duration, "cpal output ready");
    Ok(Box::new(CpalMedia {
        deck,
        shutdown: Some(shutdown_tx),
        duration,
    }))
}

fn build_stream(
    device: Option<&str>,
    deck: Arc<Mutex<Deck>>,
) -> Result<cpal::Stream, BackendError> {
    let host = cpal::default_host();
    let device = match device {
        Some(name) => host
            .output_devices()
            .map_err(platform)?
            .find(|device| device.name().map(|n| n == name).unwrap_or(false)),
        None => host.default_output_device(),
    }
    .ok_or_else(|| BackendError::BackendUnavailable("no audio output device".into()))?;
    let supported = device.default_output_config().map_err(platform)?;
    let config = supported.config();
    match supported.sample_format() {
        cpal::SampleFormat::F32 => stream_for::<f32>(&device, &config, deck),
        cpal::SampleFormat::I16 => stream_for::<i16>(&device, &config, deck),
        cpal::SampleFormat::U16 => stream_for::<u16>(&device, &config, deck),
        other => Err(BackendError::BackendUnavailable(format!(
            "unsupported output sample format {other:?}"
        ))),
    }
}

fn stream_for<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    deck: Arc<Mutex<Deck>>,
) -> Result<cpal::Stream, BackendError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let rate = config.sample_rate.0;
    let errors = deck.clone();
    let mut scratch = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                lock(&deck).render(&mut scratch, channels, rate);
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*sample);
                }
            },
            move |err| {
                warn!(%err, "output stream error");
                lock(&errors).raise(NativeCallback::Error(err.to_string()));
            },
            None,
        )
        .map_err(platform)
}

fn platform(err: impl std::fmt::Display) -> BackendError {
    BackendError::Platform(err.to_string())
}

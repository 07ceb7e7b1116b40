use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::backend::{lock, settle, validate_volume};
use crate::probe::{probe_source, SourceInfo};
use crate::{AudioBackend, AudioSource, BackendError, BackendKind, BackendState, EventStreams};

/// Discrete notifications raised by a native media player.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeCallback {
    Prepared,
    Started,
    Paused,
    Stopped,
    SeekComplete,
    /// Periodic position notification, at whatever rate the platform chooses.
    PositionTick,
    Completed,
    Error(String),
}

/// Handle to a prepared native player (MediaPlayer, AVPlayer and friends).
pub trait NativeMedia: Send {
    fn start(&mut self) -> Result<(), BackendError>;
    fn pause(&mut self) -> Result<(), BackendError>;
    fn stop(&mut self) -> Result<(), BackendError>;
    fn seek(&mut self, position: Duration) -> Result<(), BackendError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), BackendError>;
    /// Only meaningful right after a callback; the player is not queried otherwise.
    fn position(&self) -> Option<Duration>;
    fn duration(&self) -> Option<Duration>;
    fn poll_callback(&mut self) -> Option<NativeCallback>;
    fn release(&mut self);
}

#[async_trait]
pub trait NativeMediaFactory: Send + Sync {
    async fn open(&self, source: &AudioSource) -> Result<Box<dyn NativeMedia>, BackendError>;
}

#[derive(Default)]
struct NativeInner {
    epoch: u64,
    media: Option<Box<dyn NativeMedia>>,
    disposed: bool,
    last_error: Option<BackendError>,
    last_position: Option<Duration>,
    last_duration: Option<Duration>,
}

impl NativeInner {
    fn release_media(&mut self) {
        if let Some(mut media) = self.media.take() {
            media.release();
            debug!(epoch = self.epoch, "released native media");
        }
    }

    fn command(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut dyn NativeMedia) -> Result<(), BackendError>,
    ) -> bool {
        let disposed = self.disposed;
        let result = match self.media.as_mut() {
            Some(media) => f(media.as_mut()),
            None if disposed => Err(BackendError::DisposedStateAccess),
            None => Err(BackendError::NotReady),
        };
        settle(op, result, &mut self.last_error)
    }
}

/// Backend over a native media player. The player is polled for position and
/// duration only when it raises a callback.
pub struct NativeBackend {
    factory: Arc<dyn NativeMediaFactory>,
    inner: Mutex<NativeInner>,
    streams: EventStreams,
    probe_local_files: bool,
}

impl NativeBackend {
    pub fn new(factory: Arc<dyn NativeMediaFactory>) -> Self {
        Self {
            factory,
            inner: Mutex::new(NativeInner::default()),
            streams: EventStreams::new(),
            probe_local_files: true,
        }
    }

    /// Skip the container probe for local files.
    pub fn without_probe(mut self) -> Self {
        self.probe_local_files = false;
        self
    }

    fn probe(&self, source: &AudioSource) -> Result<Option<SourceInfo>, BackendError> {
        // MIDI is rendered by the platform synthesizer, not a container decoder.
        match source.local_path() {
            Some(path) if self.probe_local_files && !source.is_midi() => {
                probe_source(path).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn emit_if_changed(
        &self,
        inner: &mut NativeInner,
        position: Option<Duration>,
        duration: Option<Duration>,
    ) {
        if let Some(duration) = duration {
            if inner.last_duration != Some(duration) {
                inner.last_duration = Some(duration);
                self.streams.emit_duration(duration);
            }
        }
        if let Some(position) = position {
            if inner.last_position != Some(position) {
                inner.last_position = Some(position);
                self.streams.emit_position(position);
            }
        }
    }
}

#[async_trait]
impl AudioBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn initialize(&self, source: &AudioSource) -> bool {
        let epoch = {
            let mut inner = lock(&self.inner);
            inner.release_media();
            inner.epoch += 1;
            inner.disposed = false;
            inner.last_error = None;
            inner.last_position = None;
            inner.last_duration = None;
            inner.epoch
        };

        let probed = match self.probe(source) {
            Ok(info) => info,
            Err(err) => {
                let mut inner = lock(&self.inner);
                if inner.epoch != epoch {
                    return false;
                }
                return settle("initialize", Err(err), &mut inner.last_error);
            }
        };

        let opened = self.factory.open(source).await;

        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        if inner.epoch != epoch {
            debug!(epoch, current = inner.epoch, "discarding stale native initialize");
            if let Ok(mut media) = opened {
                media.release();
            }
            return false;
        }
        match opened {
            Ok(media) => {
                let duration = media
                    .duration()
                    .or_else(|| probed.and_then(|info| info.duration));
                inner.media = Some(media);
                self.emit_if_changed(inner, None, duration);
                info!(epoch, ?duration, "native audio ready");
                true
            }
            Err(err) => settle("initialize", Err(err), &mut inner.last_error),
        }
    }

    fn play(&self) -> bool {
        lock(&self.inner).command("play", |media| media.start())
    }

    fn pause(&self) -> bool {
        lock(&self.inner).command("pause", |media| media.pause())
    }

    fn stop(&self) -> bool {
        lock(&self.inner).command("stop", |media| media.stop())
    }

    fn seek(&self, position: Duration) -> bool {
        lock(&self.inner).command("seek", |media| media.seek(position))
    }

    fn set_volume(&self, volume: f32) -> bool {
        lock(&self.inner).command("set_volume", |media| {
            let volume = validate_volume(volume)?;
            media.set_volume(volume)
        })
    }

    fn pump(&self, _elapsed: Duration) {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let mut polled = Vec::new();
        if let Some(media) = inner.media.as_mut() {
            while let Some(callback) = media.poll_callback() {
                polled.push((callback, media.position(), media.duration()));
            }
        }
        for (callback, position, duration) in polled {
            self.emit_if_changed(inner, position, duration);
            match callback {
                NativeCallback::Prepared
                | NativeCallback::SeekComplete
                | NativeCallback::PositionTick => {}
                NativeCallback::Started => self.streams.emit_state(BackendState::Playing),
                NativeCallback::Paused => self.streams.emit_state(BackendState::Paused),
                NativeCallback::Stopped => self.streams.emit_state(BackendState::Stopped),
                NativeCallback::Completed => self.streams.emit_state(BackendState::Completed),
                NativeCallback::Error(message) => {
                    warn!(%message, "native player reported an error");
                    inner.last_error = Some(BackendError::Platform(message));
                    self.streams.emit_state(BackendState::Stopped);
                }
            }
        }
    }

    fn dispose(&self) {
        let mut inner = lock(&self.inner);
        inner.epoch += 1;
        inner.release_media();
        inner.disposed = true;
    }

    fn last_error(&self) -> Option<BackendError> {
        lock(&self.inner).last_error.clone()
    }

    fn streams(&self) -> &EventStreams {
        &self.streams
    }
}

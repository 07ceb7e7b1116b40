use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::BackendError;

/// Buffered events per stream before slow listeners start lagging.
pub const EVENT_CAPACITY: usize = 64;

/// Playback state as reported by whichever backend is active.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum BackendState {
    Stopped,
    Playing,
    Paused,
    Completed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Native,
    MediaElement,
    Null,
}

impl BackendKind {
    /// Backend matching the compilation target.
    pub fn for_target() -> Self {
        if cfg!(target_arch = "wasm32") {
            BackendKind::MediaElement
        } else {
            BackendKind::Native
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(BackendKind::Native),
            "media-element" | "element" | "web" => Ok(BackendKind::MediaElement),
            "null" | "none" | "silent" => Ok(BackendKind::Null),
            other => Err(format!("unknown audio backend '{other}'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Native => "native",
            BackendKind::MediaElement => "media-element",
            BackendKind::Null => "null",
        };
        f.write_str(name)
    }
}

/// Opaque audio rendering of a transcription: a remote URL or a local path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AudioSource {
    Url(String),
    File(PathBuf),
}

impl AudioSource {
    pub fn parse(raw: &str) -> Self {
        if raw.contains("://") {
            AudioSource::Url(raw.to_string())
        } else {
            AudioSource::File(PathBuf::from(raw))
        }
    }

    pub fn local_path(&self) -> Option<&Path> {
        match self {
            AudioSource::File(path) => Some(path),
            AudioSource::Url(_) => None,
        }
    }

    pub fn extension(&self) -> Option<String> {
        let name = match self {
            AudioSource::File(path) => path.to_str()?,
            AudioSource::Url(url) => url.split(['?', '#']).next().unwrap_or(url),
        };
        let (_, ext) = name.rsplit_once('.')?;
        if ext.contains('/') {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn is_midi(&self) -> bool {
        matches!(self.extension().as_deref(), Some("mid") | Some("midi"))
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::Url(url) => f.write_str(url),
            AudioSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

struct Senders {
    position: broadcast::Sender<Duration>,
    duration: broadcast::Sender<Duration>,
    state: broadcast::Sender<BackendState>,
}

/// Broadcast position, duration and state streams shared by every backend.
///
/// The streams outlive `dispose()`; only `close()` ends them, after which
/// subscribers observe `RecvError::Closed`.
pub struct EventStreams {
    senders: Mutex<Option<Senders>>,
}

impl EventStreams {
    pub fn new() -> Self {
        let (position, _) = broadcast::channel(EVENT_CAPACITY);
        let (duration, _) = broadcast::channel(EVENT_CAPACITY);
        let (state, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            senders: Mutex::new(Some(Senders {
                position,
                duration,
                state,
            })),
        }
    }

    pub fn emit_position(&self, position: Duration) {
        if let Some(senders) = lock(&self.senders).as_ref() {
            // no listeners is not an error
            let _ = senders.position.send(position);
        }
    }

    pub fn emit_duration(&self, duration: Duration) {
        if let Some(senders) = lock(&self.senders).as_ref() {
            let _ = senders.duration.send(duration);
        }
    }

    pub fn emit_state(&self, state: BackendState) {
        if let Some(senders) = lock(&self.senders).as_ref() {
            let _ = senders.state.send(state);
        }
    }

    pub fn subscribe_position(&self) -> broadcast::Receiver<Duration> {
        match lock(&self.senders).as_ref() {
            Some(senders) => senders.position.subscribe(),
            None => closed_receiver(),
        }
    }

    pub fn subscribe_duration(&self) -> broadcast::Receiver<Duration> {
        match lock(&self.senders).as_ref() {
            Some(senders) => senders.duration.subscribe(),
            None => closed_receiver(),
        }
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<BackendState> {
        match lock(&self.senders).as_ref() {
            Some(senders) => senders.state.subscribe(),
            None => closed_receiver(),
        }
    }

    pub fn close(&self) {
        if lock(&self.senders).take().is_some() {
            debug!("closed backend event streams");
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.senders).is_none()
    }
}

impl Default for EventStreams {
    fn default() -> Self {
        Self::new()
    }
}

fn closed_receiver<T: Clone>() -> broadcast::Receiver<T> {
    let (sender, receiver) = broadcast::channel(1);
    drop(sender);
    receiver
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capability interface shared by every audio output strategy.
///
/// Commands never panic or propagate errors: a failure is logged, remembered in
/// `last_error` and reported as `false`. `initialize` may take unbounded time;
/// commands issued while it is in flight fail instead of queueing.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Loads `source`, disposing whatever was loaded before.
    async fn initialize(&self, source: &AudioSource) -> bool;

    fn play(&self) -> bool;
    fn pause(&self) -> bool;
    fn stop(&self) -> bool;
    fn seek(&self, position: Duration) -> bool;
    fn set_volume(&self, volume: f32) -> bool;

    /// Delivers pending media events onto the caller's context. Called once per tick.
    fn pump(&self, _elapsed: Duration) {}

    /// Releases the media resource. Safe to call repeatedly.
    fn dispose(&self);

    fn last_error(&self) -> Option<BackendError>;

    fn streams(&self) -> &EventStreams;

    fn subscribe_position(&self) -> broadcast::Receiver<Duration> {
        self.streams().subscribe_position()
    }

    fn subscribe_duration(&self) -> broadcast::Receiver<Duration> {
        self.streams().subscribe_duration()
    }

    fn subscribe_state(&self) -> broadcast::Receiver<BackendState> {
        self.streams().subscribe_state()
    }

    fn close_streams(&self) {
        self.streams().close()
    }
}

/// Converts a command outcome into the boolean contract, recording the failure.
pub(crate) fn settle(
    op: &'static str,
    result: Result<(), BackendError>,
    last_error: &mut Option<BackendError>,
) -> bool {
    match result {
        Ok(()) => true,
        Err(err) => {
            warn!(op, %err, "audio command failed");
            *last_error = Some(err);
            false
        }
    }
}

pub(crate) fn validate_volume(volume: f32) -> Result<f32, BackendError> {
    if volume.is_finite() {
        Ok(volume.clamp(0.0, 1.0))
    } else {
        Err(BackendError::Platform(format!("invalid volume {volume}")))
    }
}

/// Backend for platforms without audio output. Playback stays visual-only.
pub struct NullBackend {
    streams: EventStreams,
    last_error: Mutex<Option<BackendError>>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            streams: EventStreams::new(),
            last_error: Mutex::new(None),
        }
    }

    fn refuse(&self, op: &'static str) -> bool {
        settle(op, Err(BackendError::NotReady), &mut lock(&self.last_error))
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioBackend for NullBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    async fn initialize(&self, source: &AudioSource) -> bool {
        debug!(%source, "null backend cannot load audio");
        let err = BackendError::BackendUnavailable("no audio output on this platform".into());
        settle("initialize", Err(err), &mut lock(&self.last_error))
    }

    fn play(&self) -> bool {
        self.refuse("play")
    }

    fn pause(&self) -> bool {
        self.refuse("pause")
    }

    fn stop(&self) -> bool {
        self.refuse("stop")
    }

    fn seek(&self, _position: Duration) -> bool {
        self.refuse("seek")
    }

    fn set_volume(&self, _volume: f32) -> bool {
        self.refuse("set_volume")
    }

    fn dispose(&self) {
        debug!("disposing null backend");
    }

    fn last_error(&self) -> Option<BackendError> {
        lock(&self.last_error).clone()
    }

    fn streams(&self) -> &EventStreams {
        &self.streams
    }
}

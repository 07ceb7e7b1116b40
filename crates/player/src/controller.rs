use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use wave2notes_audio::{AudioBackend, AudioSource, BackendError, BackendState};

use crate::clock::{PlaybackClock, TimeCursor};

/// Transport surface shared by the controller and every view that hosts it.
pub trait Playable {
    fn start(&mut self);
    fn stop(&mut self);
    fn reset(&mut self);
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Completed,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResetCause {
    Manual,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioCapability {
    /// No source loaded, or `initialize` still in flight.
    Pending,
    Available,
    Unavailable(BackendError),
}

/// Raised once per source when audio cannot be produced. Playback continues silently.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityWarning {
    pub error: BackendError,
}

impl CapabilityWarning {
    pub fn message(&self) -> String {
        format!("Audio is unavailable ({}); playing without sound.", self.error)
    }
}

type InitOutcome = Result<(), BackendError>;

/// Binds the animation clock, the audio backend and transport commands into one
/// state machine. Rendering time always comes from the clock; the backend is a
/// best-effort audio output.
pub struct PlaybackController {
    backend: Arc<dyn AudioBackend>,
    clock: PlaybackClock,
    state: PlaybackState,
    capability: AudioCapability,
    pending_init: Option<oneshot::Receiver<InitOutcome>>,
    warned: bool,
    audio_position: Option<Duration>,
    volume: Option<f32>,
    positions: broadcast::Receiver<Duration>,
    durations: broadcast::Receiver<Duration>,
    backend_states: broadcast::Receiver<BackendState>,
    time_observers: Vec<Box<dyn FnMut(f64)>>,
    warning_observers: Vec<Box<dyn FnMut(&CapabilityWarning)>>,
    reset_observers: Vec<Box<dyn FnMut(ResetCause)>>,
}

impl PlaybackController {
    pub fn new(backend: Arc<dyn AudioBackend>, total_duration: f64) -> Self {
        let positions = backend.subscribe_position();
        let durations = backend.subscribe_duration();
        let backend_states = backend.subscribe_state();
        Self {
            backend,
            clock: PlaybackClock::new(total_duration),
            state: PlaybackState::Idle,
            capability: AudioCapability::Pending,
            pending_init: None,
            warned: false,
            audio_position: None,
            volume: None,
            positions,
            durations,
            backend_states,
            time_observers: Vec::new(),
            warning_observers: Vec::new(),
            reset_observers: Vec::new(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn cursor(&self) -> TimeCursor {
        self.clock.cursor()
    }

    pub fn current_time(&self) -> f64 {
        self.clock.value()
    }

    pub fn capability(&self) -> &AudioCapability {
        &self.capability
    }

    /// Last position reported by the backend. Diagnostics only, never used for rendering.
    pub fn audio_position(&self) -> Option<Duration> {
        self.audio_position
    }

    pub fn on_time_update(&mut self, observer: impl FnMut(f64) + 'static) {
        self.time_observers.push(Box::new(observer));
    }

    pub fn on_capability_warning(&mut self, observer: impl FnMut(&CapabilityWarning) + 'static) {
        self.warning_observers.push(Box::new(observer));
    }

    pub fn on_reset(&mut self, observer: impl FnMut(ResetCause) + 'static) {
        self.reset_observers.push(Box::new(observer));
    }

    /// Starts loading `source`. The returned future must be driven by the host
    /// (spawned on its runtime); its outcome is applied on a later `tick`.
    pub fn initialize_audio(
        &mut self,
        source: AudioSource,
    ) -> impl Future<Output = ()> + Send + 'static {
        let (sender, receiver) = oneshot::channel();
        self.pending_init = Some(receiver);
        self.capability = AudioCapability::Pending;
        self.warned = false;
        let backend = Arc::clone(&self.backend);
        async move {
            let outcome = if backend.initialize(&source).await {
                Ok(())
            } else {
                Err(backend.last_error().unwrap_or_else(|| {
                    BackendError::BackendUnavailable(format!("could not load {source}"))
                }))
            };
            // a dropped receiver means the controller moved on
            let _ = sender.send(outcome);
        }
    }

    pub fn start(&mut self) {
        match self.state {
            PlaybackState::Playing => return,
            PlaybackState::Paused => {}
            PlaybackState::Idle | PlaybackState::Completed => self.clock.reset(),
        }
        self.clock.forward();
        self.discard_stale_states();
        if !self.backend.play() {
            debug!("starting without audio");
        }
        self.state = PlaybackState::Playing;
        debug!(time = self.clock.value(), "playback started");
    }

    pub fn pause(&mut self) {
        if self.state != PlaybackState::Playing {
            debug!(state = ?self.state, "pause ignored");
            return;
        }
        self.clock.halt();
        self.backend.pause();
        self.state = PlaybackState::Paused;
        debug!(time = self.clock.value(), "playback paused");
    }

    pub fn stop(&mut self) {
        self.pause();
    }

    pub fn reset(&mut self) {
        self.clock.reset();
        self.backend.stop();
        self.discard_stale_states();
        self.state = PlaybackState::Idle;
        debug!("playback reset");
        self.notify_reset(ResetCause::Manual);
    }

    /// Moves the cursor. From `Idle` or `Completed` this arms a paused playback at `time`.
    pub fn seek(&mut self, time: f64) {
        if !time.is_finite() {
            warn!(time, "ignoring non-finite seek");
            return;
        }
        let time = self.clock.seek(time);
        if let Some(position) = backend_position(time) {
            self.backend.seek(position);
        }
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Completed) {
            self.state = PlaybackState::Paused;
        }
    }

    /// Lengthens playback to `total` seconds. Never shortens it.
    pub fn extend_total(&mut self, total: f64) {
        if total > self.clock.total() {
            debug!(total, "extending total duration");
            self.clock.set_total(total);
        }
    }

    /// Applies `volume` now if audio is loaded, and again whenever it becomes available.
    pub fn set_volume(&mut self, volume: f32) -> bool {
        self.volume = Some(volume);
        self.backend.set_volume(volume)
    }

    /// One animation tick: pump audio events, advance the clock, detect completion
    /// and notify time observers.
    pub fn tick(&mut self, elapsed: Duration) -> TimeCursor {
        self.backend.pump(elapsed);
        self.poll_initialize();
        let backend_completed = self.drain_backend_events();

        if self.state == PlaybackState::Playing {
            if backend_completed {
                self.complete();
            } else {
                self.clock.advance(elapsed);
                if self.clock.is_at_end() {
                    self.complete();
                }
            }
        }

        let cursor = self.clock.cursor();
        for observer in &mut self.time_observers {
            observer(cursor.current_time);
        }
        cursor
    }

    /// Releases the audio backend. Visual playback keeps working.
    pub fn dispose(&mut self) {
        self.pending_init = None;
        self.backend.dispose();
        self.capability = AudioCapability::Unavailable(BackendError::DisposedStateAccess);
        self.warned = true;
    }

    fn poll_initialize(&mut self) {
        let Some(receiver) = self.pending_init.as_mut() else {
            return;
        };
        let outcome = match receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(oneshot::error::TryRecvError::Empty) => return,
            Err(oneshot::error::TryRecvError::Closed) => {
                debug!("audio initialize abandoned");
                self.pending_init = None;
                return;
            }
        };
        self.pending_init = None;
        match outcome {
            Ok(()) => {
                info!("audio available");
                self.capability = AudioCapability::Available;
                self.sync_backend();
            }
            Err(error) => self.degrade(error),
        }
    }

    /// Brings a freshly loaded backend in line with the clock.
    fn sync_backend(&mut self) {
        if let Some(volume) = self.volume {
            self.backend.set_volume(volume);
        }
        let time = self.clock.value();
        if time > 0.0 {
            if let Some(position) = backend_position(time) {
                self.backend.seek(position);
            }
        }
        if self.state == PlaybackState::Playing {
            self.backend.play();
        }
    }

    fn degrade(&mut self, error: BackendError) {
        if !error.is_capability_loss() {
            debug!(%error, "audio initialize interrupted");
            self.capability = AudioCapability::Unavailable(error);
            return;
        }
        warn!(%error, "continuing with visual-only playback");
        self.capability = AudioCapability::Unavailable(error.clone());
        if self.warned {
            return;
        }
        self.warned = true;
        let warning = CapabilityWarning { error };
        for observer in &mut self.warning_observers {
            observer(&warning);
        }
    }

    /// Drops state events raised before now, so a completion from an earlier
    /// run cannot end the next one.
    fn discard_stale_states(&mut self) {
        self.backend.pump(Duration::ZERO);
        let stale = drain(&mut self.backend_states);
        if !stale.is_empty() {
            debug!(?stale, "discarded stale audio states");
        }
    }

    fn drain_backend_events(&mut self) -> bool {
        if let Some(position) = drain(&mut self.positions).last() {
            self.audio_position = Some(*position);
        }
        for duration in drain(&mut self.durations) {
            self.extend_total(duration.as_secs_f64());
        }
        drain(&mut self.backend_states)
            .into_iter()
            .any(|state| state == BackendState::Completed)
    }

    fn complete(&mut self) {
        info!("playback completed");
        self.state = PlaybackState::Completed;
        self.clock.reset();
        self.backend.stop();
        self.notify_reset(ResetCause::Completed);
    }

    fn notify_reset(&mut self, cause: ResetCause) {
        for observer in &mut self.reset_observers {
            observer(cause);
        }
    }
}

impl Playable for PlaybackController {
    fn start(&mut self) {
        PlaybackController::start(self);
    }

    fn stop(&mut self) {
        PlaybackController::stop(self);
    }

    fn reset(&mut self) {
        PlaybackController::reset(self);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.backend.dispose();
        self.backend.close_streams();
    }
}

/// Backend position for a clock time. Times past `Duration::MAX` stay visual-only.
fn backend_position(time: f64) -> Option<Duration> {
    match Duration::try_from_secs_f64(time) {
        Ok(position) => Some(position),
        Err(err) => {
            warn!(time, %err, "time out of range for the audio backend");
            None
        }
    }
}

fn drain<T: Clone>(receiver: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(item) => items.push(item),
            Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "audio events lagged"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
    items
}

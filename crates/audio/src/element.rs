use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::backend::{lock, settle, validate_volume};
use crate::{AudioBackend, AudioSource, BackendError, BackendKind, BackendState, EventStreams};

/// Browser `HTMLMediaElement` surface the backend needs.
pub trait MediaElement: Send {
    /// Rejects when the page may not start playback (autoplay or CORS policy).
    fn play(&mut self) -> Result<(), BackendError>;
    fn pause(&mut self);
    fn current_time(&self) -> f64;
    fn set_current_time(&mut self, seconds: f64);
    /// `NaN` until metadata has loaded.
    fn duration(&self) -> f64;
    fn ended(&self) -> bool;
    fn set_volume(&mut self, volume: f64);
    /// Detaches the source so the browser frees the media resource.
    fn release(&mut self);
}

#[async_trait]
pub trait MediaElementFactory: Send + Sync {
    async fn create(&self, url: &str) -> Result<Box<dyn MediaElement>, BackendError>;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ElementBackendConfig {
    /// `timeupdate` fires roughly every 250ms, too coarse for animation, so
    /// the element is sampled on this interval instead.
    pub poll_interval: Duration,
}

impl Default for ElementBackendConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

#[derive(Default)]
struct ElementInner {
    epoch: u64,
    element: Option<Box<dyn MediaElement>>,
    disposed: bool,
    last_error: Option<BackendError>,
    since_poll: Duration,
    last_position: Option<Duration>,
    reported_duration: Option<Duration>,
    state: Option<BackendState>,
}

impl ElementInner {
    fn release_element(&mut self) {
        if let Some(mut element) = self.element.take() {
            element.pause();
            element.release();
            debug!(epoch = self.epoch, "released media element");
        }
    }

    fn element(&mut self) -> Result<&mut Box<dyn MediaElement>, BackendError> {
        let disposed = self.disposed;
        match self.element.as_mut() {
            Some(element) => Ok(element),
            None if disposed => Err(BackendError::DisposedStateAccess),
            None => Err(BackendError::NotReady),
        }
    }
}

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

/// Backend over a browser media element, sampled on a fixed timer.
pub struct MediaElementBackend {
    factory: Arc<dyn MediaElementFactory>,
    config: ElementBackendConfig,
    inner: Mutex<ElementInner>,
    streams: EventStreams,
}

impl MediaElementBackend {
    pub fn new(factory: Arc<dyn MediaElementFactory>, config: ElementBackendConfig) -> Self {
        Self {
            factory,
            config,
            inner: Mutex::new(ElementInner::default()),
            streams: EventStreams::new(),
        }
    }

    fn transition(&self, inner: &mut ElementInner, state: BackendState) {
        if inner.state != Some(state) {
            inner.state = Some(state);
            self.streams.emit_state(state);
        }
    }

    fn sample(&self, inner: &mut ElementInner) {
        let Some(element) = inner.element.as_ref() else {
            return;
        };
        let duration = seconds_to_duration(element.duration()).filter(|d| !d.is_zero());
        let position = seconds_to_duration(element.current_time());
        let ended = element.ended();

        if let Some(duration) = duration {
            if inner.reported_duration != Some(duration) {
                inner.reported_duration = Some(duration);
                self.streams.emit_duration(duration);
            }
        }
        if let Some(position) = position {
            if inner.last_position != Some(position) {
                inner.last_position = Some(position);
                self.streams.emit_position(position);
            }
        }
        if ended && inner.state == Some(BackendState::Playing) {
            self.transition(inner, BackendState::Completed);
        }
    }
}

#[async_trait]
impl AudioBackend for MediaElementBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::MediaElement
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn initialize(&self, source: &AudioSource) -> bool {
        let epoch = {
            let mut inner = lock(&self.inner);
            inner.release_element();
            inner.epoch += 1;
            inner.disposed = false;
            inner.last_error = None;
            inner.since_poll = Duration::ZERO;
            inner.last_position = None;
            inner.reported_duration = None;
            inner.state = None;
            inner.epoch
        };

        if source.is_midi() {
            let err = BackendError::UnsupportedSource(format!(
                "browsers cannot play MIDI sources ({source})"
            ));
            let mut inner = lock(&self.inner);
            if inner.epoch != epoch {
                return false;
            }
            return settle("initialize", Err(err), &mut inner.last_error);
        }

        let url = source.to_string();
        let created = self.factory.create(&url).await;

        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        if inner.epoch != epoch {
            debug!(epoch, current = inner.epoch, "discarding stale element initialize");
            if let Ok(mut element) = created {
                element.release();
            }
            return false;
        }
        match created {
            Ok(element) => {
                inner.element = Some(element);
                self.sample(inner);
                info!(epoch, "media element ready");
                true
            }
            Err(err) => settle("initialize", Err(err), &mut inner.last_error),
        }
    }

    fn play(&self) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let result = inner.element().and_then(|element| element.play());
        let ok = settle("play", result, &mut inner.last_error);
        if ok {
            self.transition(inner, BackendState::Playing);
        }
        ok
    }

    fn pause(&self) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let result = inner.element().map(|element| element.pause());
        let ok = settle("pause", result, &mut inner.last_error);
        if ok {
            self.transition(inner, BackendState::Paused);
        }
        ok
    }

    fn stop(&self) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let result = inner.element().map(|element| {
            element.pause();
            element.set_current_time(0.0);
        });
        let ok = settle("stop", result, &mut inner.last_error);
        if ok {
            self.transition(inner, BackendState::Stopped);
            self.sample(inner);
        }
        ok
    }

    fn seek(&self, position: Duration) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let result = inner
            .element()
            .map(|element| element.set_current_time(position.as_secs_f64()));
        let ok = settle("seek", result, &mut inner.last_error);
        if ok {
            self.sample(inner);
        }
        ok
    }

    fn set_volume(&self, volume: f32) -> bool {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        let result = validate_volume(volume).and_then(|volume| {
            inner
                .element()
                .map(|element| element.set_volume(volume as f64))
        });
        settle("set_volume", result, &mut inner.last_error)
    }

    fn pump(&self, elapsed: Duration) {
        let mut guard = lock(&self.inner);
        let inner = &mut *guard;
        if inner.element.is_none() {
            return;
        }
        inner.since_poll += elapsed;
        if inner.since_poll < self.config.poll_interval {
            return;
        }
        inner.since_poll = Duration::ZERO;
        self.sample(inner);
    }

    fn dispose(&self) {
        let mut inner = lock(&self.inner);
        inner.epoch += 1;
        inner.release_element();
        inner.disposed = true;
    }

    fn last_error(&self) -> Option<BackendError> {
        lock(&self.inner).last_error.clone()
    }

    fn streams(&self) -> &EventStreams {
        &self.streams
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::{broadcast::error::TryRecvError, oneshot, Mutex as AsyncMutex};

    use super::*;

    #[derive(Default)]
    struct ElementState {
        current_time: f64,
        duration: f64,
        ended: bool,
        paused: bool,
        volume: f64,
        blocked: bool,
        released: usize,
    }

    struct FakeElement(Arc<Mutex<ElementState>>);

    impl MediaElement for FakeElement {
        fn play(&mut self) -> Result<(), BackendError> {
            let mut state = lock(&self.0);
            if state.blocked {
                return Err(BackendError::UnsupportedSource("NotAllowedError".into()));
            }
            state.paused = false;
            Ok(())
        }
        fn pause(&mut self) {
            lock(&self.0).paused = true;
        }
        fn current_time(&self) -> f64 {
            lock(&self.0).current_time
        }
        fn set_current_time(&mut self, seconds: f64) {
            lock(&self.0).current_time = seconds;
        }
        fn duration(&self) -> f64 {
            lock(&self.0).duration
        }
        fn ended(&self) -> bool {
            lock(&self.0).ended
        }
        fn set_volume(&mut self, volume: f64) {
            lock(&self.0).volume = volume;
        }
        fn release(&mut self) {
            lock(&self.0).released += 1;
        }
    }

    struct FakeFactory {
        state: Arc<Mutex<ElementState>>,
        /// Holds `create` until the test releases it.
        gate: AsyncMutex<Option<oneshot::Receiver<()>>>,
    }

    #[async_trait]
    impl MediaElementFactory for FakeFactory {
        async fn create(&self, _url: &str) -> Result<Box<dyn MediaElement>, BackendError> {
            if let Some(gate) = self.gate.lock().await.take() {
                let _ = gate.await;
            }
            Ok(Box::new(FakeElement(self.state.clone())))
        }
    }

    fn element_state() -> Arc<Mutex<ElementState>> {
        Arc::new(Mutex::new(ElementState {
            duration: f64::NAN,
            paused: true,
            ..Default::default()
        }))
    }

    fn backend() -> (MediaElementBackend, Arc<Mutex<ElementState>>) {
        let state = element_state();
        let factory = FakeFactory {
            state: state.clone(),
            gate: AsyncMutex::new(None),
        };
        let backend = MediaElementBackend::new(Arc::new(factory), ElementBackendConfig::default());
        (backend, state)
    }

    fn wav() -> AudioSource {
        AudioSource::parse("https://host/api/download/take.wav")
    }

    #[tokio::test]
    async fn midi_sources_are_unsupported() {
        let (backend, _) = backend();
        assert!(!backend.initialize(&AudioSource::parse("https://host/take.mid")).await);
        assert!(matches!(
            backend.last_error(),
            Some(BackendError::UnsupportedSource(_))
        ));
        assert!(!backend.play());
    }

    #[tokio::test]
    async fn samples_only_on_poll_interval() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        let mut positions = backend.subscribe_position();
        let mut durations = backend.subscribe_duration();

        assert!(backend.play());
        {
            let mut state = lock(&state);
            state.current_time = 0.5;
            state.duration = 12.0;
        }
        backend.pump(Duration::from_millis(20));
        assert_eq!(positions.try_recv(), Err(TryRecvError::Empty));
        backend.pump(Duration::from_millis(30));
        assert_eq!(positions.try_recv(), Ok(Duration::from_millis(500)));
        assert_eq!(durations.try_recv(), Ok(Duration::from_secs(12)));

        // duration reported once
        lock(&state).current_time = 0.75;
        backend.pump(Duration::from_millis(50));
        assert_eq!(positions.try_recv(), Ok(Duration::from_millis(750)));
        assert_eq!(durations.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn ended_element_completes_once() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        let mut states = backend.subscribe_state();
        assert!(backend.play());
        assert_eq!(states.try_recv(), Ok(BackendState::Playing));
        lock(&state).ended = true;
        backend.pump(Duration::from_millis(50));
        backend.pump(Duration::from_millis(50));
        assert_eq!(states.try_recv(), Ok(BackendState::Completed));
        assert_eq!(states.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn blocked_play_returns_false() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        lock(&state).blocked = true;
        assert!(!backend.play());
        assert!(backend.last_error().is_some());
    }

    #[tokio::test]
    async fn stop_rewinds_and_seek_reports_position() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        let mut positions = backend.subscribe_position();
        assert!(backend.seek(Duration::from_secs(3)));
        assert_eq!(positions.try_recv(), Ok(Duration::from_secs(3)));
        assert!(backend.stop());
        assert_eq!(lock(&state).current_time, 0.0);
        assert!(lock(&state).paused);
        assert_eq!(positions.try_recv(), Ok(Duration::ZERO));
        assert!(backend.set_volume(0.25));
        assert_eq!(lock(&state).volume, 0.25);
    }

    #[tokio::test]
    async fn dispose_releases_element() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        backend.dispose();
        backend.dispose();
        assert_eq!(lock(&state).released, 1);
        assert!(!backend.play());
        assert!(!backend.set_volume(0.5));
        assert_eq!(backend.last_error(), Some(BackendError::DisposedStateAccess));
    }

    #[tokio::test]
    async fn reinitialize_releases_previous_element() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        assert!(backend.play());
        assert!(backend.initialize(&wav()).await);
        let state = lock(&state);
        assert_eq!(state.released, 1);
        assert!(state.paused);
    }

    #[tokio::test]
    async fn initialize_resolving_after_dispose_is_discarded() {
        let state = element_state();
        let (release, gate) = oneshot::channel();
        let factory = FakeFactory {
            state: state.clone(),
            gate: AsyncMutex::new(Some(gate)),
        };
        let backend = Arc::new(MediaElementBackend::new(
            Arc::new(factory),
            ElementBackendConfig::default(),
        ));

        let pending = tokio::spawn({
            let backend = backend.clone();
            async move { backend.initialize(&wav()).await }
        });
        tokio::task::yield_now().await;
        assert!(!backend.play());
        backend.dispose();
        let _ = release.send(());
        assert!(!pending.await.unwrap());
        // the late element was released rather than installed
        assert_eq!(lock(&state).released, 1);
        assert!(!backend.play());
        assert_eq!(backend.last_error(), Some(BackendError::DisposedStateAccess));
    }

    #[tokio::test]
    async fn out_of_range_duration_is_not_reported() {
        let (backend, state) = backend();
        assert!(backend.initialize(&wav()).await);
        let mut durations = backend.subscribe_duration();
        lock(&state).duration = 1e20;
        backend.pump(Duration::from_millis(50));
        assert_eq!(durations.try_recv(), Err(TryRecvError::Empty));
    }
}

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use wave2notes_audio::{AudioBackend, AudioSource};
use wave2notes_domain::{PitchSet, TranscriptionResult};

use crate::clock::TimeCursor;
use crate::controller::{Playable, PlaybackController, PlaybackState};
use crate::window::{NoteTrack, NoteWindow, VisibleNote, WindowConfig};

/// Everything the renderer needs for one frame, borrowed from the session.
#[derive(Clone, Copy, Debug)]
pub struct FrameView<'a> {
    pub cursor: TimeCursor,
    pub state: PlaybackState,
    pub visible: &'a [VisibleNote],
    pub active: &'a PitchSet,
    pub config: &'a WindowConfig,
}

/// Per-tick pipeline: advance the controller, then recompute the note window.
/// Both finish before a [`FrameView`] is handed out, so rendering never sees a
/// half-updated frame.
pub struct PlaybackSession {
    controller: PlaybackController,
    track: NoteTrack,
    window: NoteWindow,
}

impl PlaybackSession {
    pub fn new(backend: Arc<dyn AudioBackend>, track: NoteTrack, config: WindowConfig) -> Self {
        let controller = PlaybackController::new(backend, track.end_time());
        debug!(notes = track.len(), indexed = track.is_indexed(), "playback session created");
        Self {
            controller,
            track,
            window: NoteWindow::new(config),
        }
    }

    pub fn from_result(
        backend: Arc<dyn AudioBackend>,
        result: &TranscriptionResult,
        config: WindowConfig,
    ) -> Self {
        let track = NoteTrack::new(result.notes.clone());
        let mut session = Self::new(backend, track, config);
        if let Some(total) = result.total_duration {
            session.controller.extend_total(total);
        }
        session
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut PlaybackController {
        &mut self.controller
    }

    pub fn track(&self) -> &NoteTrack {
        &self.track
    }

    pub fn initialize_audio(
        &mut self,
        source: AudioSource,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        self.controller.initialize_audio(source)
    }

    pub fn tick(&mut self, elapsed: Duration) -> FrameView<'_> {
        let cursor = self.controller.tick(elapsed);
        self.window.update(&self.track, cursor.current_time);
        if matches!(
            self.controller.state(),
            PlaybackState::Idle | PlaybackState::Completed
        ) {
            self.window.clear_active();
        }
        self.frame()
    }

    /// Last computed frame, without advancing time.
    pub fn frame(&self) -> FrameView<'_> {
        FrameView {
            cursor: self.controller.cursor(),
            state: self.controller.state(),
            visible: self.window.visible(),
            active: self.window.active(),
            config: self.window.config(),
        }
    }

    pub fn seek(&mut self, time: f64) {
        self.controller.seek(time);
        self.window.update(&self.track, self.controller.current_time());
    }

    pub fn dispose(&mut self) {
        self.controller.dispose();
    }
}

impl Playable for PlaybackSession {
    fn start(&mut self) {
        self.controller.start();
    }

    fn stop(&mut self) {
        self.controller.stop();
    }

    fn reset(&mut self) {
        self.controller.reset();
        self.window.clear_active();
    }
}

#[cfg(test)]
mod tests {
    use wave2notes_audio::NullBackend;
    use wave2notes_domain::Note;

    use super::*;

    const FRAME: Duration = Duration::from_millis(250);

    fn session(notes: Vec<Note>) -> PlaybackSession {
        PlaybackSession::new(
            Arc::new(NullBackend::new()),
            NoteTrack::new(notes),
            WindowConfig::default(),
        )
    }

    #[test]
    fn tick_updates_highlights_in_step_with_clock() {
        let mut session = session(vec![Note::new(60, 0.5, 1.0, 0.8).unwrap()]);
        session.start();
        let frame = session.tick(FRAME);
        assert!(frame.active.is_empty());
        let frame = session.tick(FRAME * 3);
        assert_eq!(frame.cursor.current_time, 1.0);
        assert!(frame.active.contains(60));
        assert_eq!(frame.state, PlaybackState::Playing);
    }

    #[test]
    fn idle_session_shows_notes_without_highlights() {
        let mut session = session(vec![Note::new(60, 0.0, 2.0, 0.8).unwrap()]);
        let frame = session.tick(FRAME);
        assert_eq!(frame.visible.len(), 1);
        assert!(frame.active.is_empty());
    }

    #[test]
    fn paused_session_keeps_highlights() {
        let mut session = session(vec![Note::new(60, 0.0, 2.0, 0.8).unwrap()]);
        session.start();
        session.tick(FRAME);
        session.stop();
        let frame = session.tick(FRAME);
        assert_eq!(frame.state, PlaybackState::Paused);
        assert!(frame.active.contains(60));
    }

    #[test]
    fn reset_clears_highlights() {
        let mut session = session(vec![Note::new(60, 0.0, 2.0, 0.8).unwrap()]);
        session.start();
        session.tick(FRAME);
        session.reset();
        let frame = session.frame();
        assert_eq!(frame.cursor.current_time, 0.0);
        assert!(frame.active.is_empty());
    }

    #[test]
    fn session_completes_at_last_note_end() {
        let mut session = session(vec![Note::new(60, 0.0, 0.5, 0.8).unwrap()]);
        session.start();
        session.tick(FRAME);
        let frame = session.tick(FRAME);
        assert_eq!(frame.state, PlaybackState::Completed);
        assert_eq!(frame.cursor.current_time, 0.0);
        assert!(frame.active.is_empty());
    }

    #[test]
    fn seek_refreshes_window_immediately() {
        let mut session = session(vec![Note::new(72, 5.0, 1.0, 0.8).unwrap()]);
        session.seek(5.5);
        let frame = session.frame();
        assert_eq!(frame.cursor.current_time, 5.5);
        assert_eq!(frame.visible.len(), 1);
        assert!(frame.active.contains(72));
    }

    #[test]
    fn reported_total_beyond_duration_range_is_seekable() {
        let body = r#"{
            "success": true,
            "notes": [{"pitch": 60, "time": 0.0, "duration": 1.0}],
            "debug_info": {"total_duration": 1e20}
        }"#;
        let result = TranscriptionResult::from_slice(body.as_bytes()).unwrap();
        let mut session = PlaybackSession::from_result(
            Arc::new(NullBackend::new()),
            &result,
            WindowConfig::default(),
        );
        session.seek(1e20);
        let frame = session.tick(FRAME);
        assert_eq!(frame.cursor.current_time, 1e20);
        assert_eq!(frame.state, PlaybackState::Paused);
        assert!(frame.visible.is_empty());
    }
}

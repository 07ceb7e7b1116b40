use std::time::Duration;

use egui::{Rect, Response, Sense, Ui};
use tracing::warn;
use wave2notes_domain::PitchRange;
use wave2notes_player::{Playable, PlaybackSession, PlaybackState};

use crate::layout::{LayoutCache, LayoutTuning};
use crate::render::{paint, render_frame, Palette, RenderInput};

/// Longest step the view will feed the clock in one frame, so a stalled window
/// does not jump the playback forward.
const MAX_FRAME_STEP: f32 = 0.25;

/// Falling-note piano roll with a keyboard underneath. Owns the playback
/// session and drives it from the egui frame loop.
pub struct PianoRollView {
    session: PlaybackSession,
    layout: LayoutCache,
    range: PitchRange,
    palette: Palette,
    keyboard_height: f32,
    last_layout_error: Option<String>,
}

impl PianoRollView {
    pub fn new(session: PlaybackSession) -> Self {
        Self {
            session,
            layout: LayoutCache::new(LayoutTuning::default()),
            range: PitchRange::PIANO,
            palette: Palette::default(),
            keyboard_height: 110.0,
            last_layout_error: None,
        }
    }

    pub fn with_range(mut self, range: PitchRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_tuning(mut self, tuning: LayoutTuning) -> Self {
        self.layout.set_tuning(tuning);
        self
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PlaybackSession {
        &mut self.session
    }

    pub fn seek(&mut self, time: f64) {
        self.session.seek(time);
    }

    /// Advances playback by this frame's delta, then lays out, renders and paints.
    pub fn show(&mut self, ui: &mut Ui) -> Response {
        let dt = ui.input(|input| input.stable_dt);
        let step = if dt.is_finite() {
            dt.clamp(0.0, MAX_FRAME_STEP)
        } else {
            0.0
        };
        self.show_with_step(ui, Duration::from_secs_f32(step))
    }

    pub fn show_with_step(&mut self, ui: &mut Ui, elapsed: Duration) -> Response {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click());
        let keyboard_height = self.keyboard_height.min(rect.height() * 0.4);
        let roll = Rect::from_min_max(
            rect.min,
            egui::pos2(rect.right(), rect.bottom() - keyboard_height),
        );
        let keyboard = Rect::from_min_max(egui::pos2(rect.left(), roll.bottom()), rect.max);

        let frame = self.session.tick(elapsed);
        let playing = frame.state == PlaybackState::Playing;
        let layout = match self.layout.get(self.range, rect.width()) {
            Ok(layout) => {
                self.last_layout_error = None;
                layout
            }
            Err(err) => {
                let message = err.to_string();
                if self.last_layout_error.as_deref() != Some(message.as_str()) {
                    warn!(%err, "skipping piano roll frame");
                    self.last_layout_error = Some(message);
                }
                return response;
            }
        };
        let primitives = render_frame(&RenderInput {
            layout,
            frame,
            roll,
            keyboard,
            palette: &self.palette,
        });
        paint(&ui.painter_at(rect), &primitives);

        if playing {
            ui.ctx().request_repaint();
        }
        response
    }
}

impl Playable for PianoRollView {
    fn start(&mut self) {
        self.session.start();
    }

    fn stop(&mut self) {
        self.session.stop();
    }

    fn reset(&mut self) {
        self.session.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use egui::{CentralPanel, Context, RawInput};
    use wave2notes_audio::NullBackend;
    use wave2notes_domain::Note;
    use wave2notes_player::{NoteTrack, WindowConfig};

    use super::*;

    fn view() -> PianoRollView {
        let track = NoteTrack::new(vec![Note::new(60, 0.0, 1.0, 0.9).unwrap()]);
        let session =
            PlaybackSession::new(Arc::new(NullBackend::new()), track, WindowConfig::default());
        PianoRollView::new(session)
    }

    fn run_frame(ctx: &Context, view: &mut PianoRollView, step: Duration) {
        let input = RawInput {
            screen_rect: Some(Rect::from_min_size(egui::Pos2::ZERO, egui::vec2(800.0, 600.0))),
            ..RawInput::default()
        };
        let _ = ctx.run(input, |ctx| {
            CentralPanel::default().show(ctx, |ui| {
                view.show_with_step(ui, step);
            });
        });
    }

    #[test]
    fn frames_drive_the_session() {
        let ctx = Context::default();
        let mut view = view();
        view.start();
        run_frame(&ctx, &mut view, Duration::from_millis(500));
        let frame = view.session().frame();
        assert_eq!(frame.cursor.current_time, 0.5);
        assert!(frame.active.contains(60));
    }

    #[test]
    fn transport_goes_through_the_view() {
        let ctx = Context::default();
        let mut view = view();
        view.start();
        run_frame(&ctx, &mut view, Duration::from_millis(250));
        view.stop();
        assert_eq!(view.session().controller().state(), PlaybackState::Paused);
        view.reset();
        run_frame(&ctx, &mut view, Duration::from_millis(250));
        assert_eq!(view.session().frame().cursor.current_time, 0.0);
        assert!(view.session().frame().active.is_empty());
    }
}

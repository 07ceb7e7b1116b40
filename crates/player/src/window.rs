use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wave2notes_domain::{Note, PitchSet};

/// Above this many notes the window bounds are found by binary search instead
/// of scanning the whole track.
pub const INDEXED_SCAN_THRESHOLD: usize = 5_000;

/// Time window, in seconds, around the cursor that is eligible for rendering.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub look_ahead: f64,
    pub look_behind: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            look_ahead: 3.0,
            look_behind: 1.0,
        }
    }
}

/// Immutable, onset-sorted note list shared between the windowing engine and
/// the renderer.
#[derive(Clone, Debug, Default)]
pub struct NoteTrack {
    notes: Arc<[Note]>,
    max_duration: f64,
    end_time: f64,
}

impl NoteTrack {
    pub fn new(mut notes: Vec<Note>) -> Self {
        notes.sort_by(|a, b| a.onset().total_cmp(&b.onset()));
        let max_duration = notes.iter().map(Note::duration).fold(0.0, f64::max);
        let end_time = notes.iter().map(Note::end).fold(0.0, f64::max);
        Self {
            notes: notes.into(),
            max_duration,
            end_time,
        }
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Latest note end. Playback length when no audio reports a longer one.
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn is_indexed(&self) -> bool {
        self.notes.len() > INDEXED_SCAN_THRESHOLD
    }

    /// Index range that can contain visible notes at `time`. Every note before
    /// `start` ends before the look-behind margin; every note from `end` onward
    /// starts after the look-ahead window.
    pub fn candidate_range(&self, time: f64, config: &WindowConfig) -> std::ops::Range<usize> {
        if !self.is_indexed() {
            return 0..self.notes.len();
        }
        let earliest = time - config.look_behind - self.max_duration;
        let latest = time + config.look_ahead;
        let start = self.notes.partition_point(|note| note.onset() < earliest);
        let end = self.notes.partition_point(|note| note.onset() <= latest);
        start..end.max(start)
    }
}

impl From<Vec<Note>> for NoteTrack {
    fn from(notes: Vec<Note>) -> Self {
        Self::new(notes)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VisibleNote {
    /// Position in the owning [`NoteTrack`].
    pub index: usize,
    pub note: Note,
    pub active: bool,
}

/// Visible notes and sounding pitches for one cursor position.
#[derive(Clone, Debug, Default)]
pub struct NoteWindow {
    config: WindowConfig,
    time: f64,
    visible: Vec<VisibleNote>,
    active: PitchSet,
}

impl NoteWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Recomputes both sets with one pass over the candidate range.
    pub fn update(&mut self, track: &NoteTrack, time: f64) {
        self.time = time;
        self.visible.clear();
        self.active.clear();
        let window_start = time - self.config.look_behind;
        let window_end = time + self.config.look_ahead;
        let range = track.candidate_range(time, &self.config);
        let offset = range.start;
        for (i, note) in track.notes()[range].iter().enumerate() {
            if note.onset() > window_end || note.end() < window_start {
                continue;
            }
            let active = note.is_sounding_at(time);
            if active {
                self.active.insert(note.pitch());
            }
            self.visible.push(VisibleNote {
                index: offset + i,
                note: *note,
                active,
            });
        }
    }

    pub fn visible(&self) -> &[VisibleNote] {
        &self.visible
    }

    pub fn active(&self) -> &PitchSet {
        &self.active
    }

    /// Drops highlights but keeps the falling notes on screen.
    pub fn clear_active(&mut self) {
        self.active.clear();
        for note in &mut self.visible {
            note.active = false;
        }
    }

    pub fn clear(&mut self) {
        self.visible.clear();
        self.active.clear();
    }
}

/// Maps time offsets from the cursor onto viewport rows. The look-behind edge
/// sits at the bottom (`height`) and the look-ahead edge at the top (`0`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeAxis {
    pub config: WindowConfig,
    pub height: f32,
}

impl TimeAxis {
    pub fn new(config: WindowConfig, height: f32) -> Self {
        Self { config, height }
    }

    fn span(&self) -> f64 {
        let span = self.config.look_ahead + self.config.look_behind;
        if span > 0.0 {
            span
        } else {
            1.0
        }
    }

    /// Vertical position of `offset` seconds relative to the cursor.
    pub fn y_for_offset(&self, offset: f64) -> f32 {
        let fraction = (offset + self.config.look_behind) / self.span();
        (self.height as f64 * (1.0 - fraction)) as f32
    }

    /// Row at which the cursor (offset zero) is drawn.
    pub fn now_line(&self) -> f32 {
        self.y_for_offset(0.0)
    }

    /// Top and bottom of a note's rectangle at `time`, clipped to the viewport.
    pub fn note_span(&self, note: &Note, time: f64) -> (f32, f32) {
        let top = self.y_for_offset(note.end() - time);
        let bottom = self.y_for_offset(note.onset() - time);
        (top.clamp(0.0, self.height), bottom.clamp(0.0, self.height))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    fn note(pitch: u8, onset: f64, duration: f64) -> Note {
        Note::new(pitch, onset, duration, 0.8).unwrap()
    }

    fn active_pitches(window: &NoteWindow) -> Vec<u8> {
        window.active().iter().collect()
    }

    #[test]
    fn single_note_sounds_inside_its_span() {
        let track = NoteTrack::new(vec![note(60, 0.5, 1.0)]);
        let mut window = NoteWindow::new(WindowConfig::default());
        window.update(&track, 1.0);
        assert_eq!(active_pitches(&window), vec![60]);
        window.update(&track, 2.0);
        assert!(window.active().is_empty());
        // still within the look-behind margin
        assert_eq!(window.visible().len(), 1);
        window.update(&track, 2.6);
        assert!(window.visible().is_empty());
    }

    #[test]
    fn note_end_is_exclusive_for_highlighting() {
        let track = NoteTrack::new(vec![note(64, 1.0, 0.5)]);
        let mut window = NoteWindow::new(WindowConfig::default());
        window.update(&track, 1.0);
        assert_eq!(active_pitches(&window), vec![64]);
        window.update(&track, 1.5);
        assert!(window.active().is_empty());
    }

    #[test]
    fn look_ahead_bounds_upcoming_notes() {
        let track = NoteTrack::new(vec![note(60, 3.0, 0.5), note(62, 3.01, 0.5)]);
        let mut window = NoteWindow::new(WindowConfig::default());
        window.update(&track, 0.0);
        let pitches: Vec<u8> = window.visible().iter().map(|v| v.note.pitch()).collect();
        assert_eq!(pitches, vec![60]);
    }

    #[test]
    fn duplicate_pitches_collapse() {
        let track = NoteTrack::new(vec![
            note(60, 0.0, 2.0),
            note(60, 0.5, 1.0),
            note(67, 0.2, 1.0),
        ]);
        let mut window = NoteWindow::new(WindowConfig::default());
        window.update(&track, 0.8);
        assert_eq!(active_pitches(&window), vec![60, 67]);
        assert_eq!(window.visible().iter().filter(|v| v.active).count(), 3);
    }

    #[test]
    fn active_pitches_are_always_visible() {
        let notes = (0..200)
            .map(|i| note(21 + (i * 7 % 88) as u8, i as f64 * 0.13, 0.05 + (i % 9) as f64 * 0.3))
            .collect();
        let track = NoteTrack::new(notes);
        let mut window = NoteWindow::new(WindowConfig::default());
        for step in 0..300 {
            window.update(&track, step as f64 * 0.1);
            let visible: PitchSet = window.visible().iter().map(|v| v.note.pitch()).collect();
            assert!(window.active().is_subset(&visible));
        }
    }

    #[test]
    fn indexed_scan_matches_linear_scan() {
        let notes: Vec<Note> = (0..6_000)
            .map(|i| {
                let duration = if i % 500 == 0 { 4.0 } else { 0.2 };
                note(21 + (i % 88) as u8, i as f64 * 0.05, duration)
            })
            .collect();
        let track = NoteTrack::new(notes.clone());
        assert!(track.is_indexed());
        let config = WindowConfig::default();
        let mut window = NoteWindow::new(config);
        for time in [0.0, 12.3, 150.0, 299.9, 400.0] {
            window.update(&track, time);
            let expected: Vec<usize> = notes
                .iter()
                .enumerate()
                .filter(|(_, n)| {
                    n.onset() <= time + config.look_ahead && n.end() >= time - config.look_behind
                })
                .map(|(i, _)| i)
                .collect();
            let actual: Vec<usize> = window.visible().iter().map(|v| v.index).collect();
            assert_eq!(actual, expected, "time {time}");
            assert!(track.candidate_range(time, &config).len() < track.len());
        }
    }

    #[test]
    fn clear_active_keeps_visible_notes() {
        let track = NoteTrack::new(vec![note(60, 0.0, 1.0)]);
        let mut window = NoteWindow::new(WindowConfig::default());
        window.update(&track, 0.5);
        window.clear_active();
        assert!(window.active().is_empty());
        assert_eq!(window.visible().len(), 1);
        assert!(!window.visible()[0].active);
    }

    #[test]
    fn time_axis_maps_window_edges() {
        let axis = TimeAxis::new(WindowConfig::default(), 400.0);
        assert_abs_diff_eq!(axis.y_for_offset(3.0), 0.0);
        assert_abs_diff_eq!(axis.y_for_offset(-1.0), 400.0);
        assert_abs_diff_eq!(axis.now_line(), 300.0);
        let (top, bottom) = axis.note_span(&note(60, 1.0, 1.0), 0.0);
        assert_abs_diff_eq!(top, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(bottom, 200.0, epsilon = 1e-3);
    }

    #[test]
    fn degenerate_window_does_not_divide_by_zero() {
        let axis = TimeAxis::new(
            WindowConfig {
                look_ahead: 0.0,
                look_behind: 0.0,
            },
            100.0,
        );
        assert!(axis.now_line().is_finite());
    }
}

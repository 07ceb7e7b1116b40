use egui::{pos2, Color32, Painter, Pos2, Rect, Stroke};
use serde::{Deserialize, Serialize};
use wave2notes_player::{FrameView, TimeAxis};

use crate::layout::{KeyClass, KeyboardLayout};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaletteMode {
    #[default]
    Dark,
    Light,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    pub roll_background: Color32,
    pub grid_line: Color32,
    pub now_line: Color32,
    pub wide_note: Color32,
    pub narrow_note: Color32,
    pub active_note: Color32,
    pub wide_key: Color32,
    pub narrow_key: Color32,
    pub active_key: Color32,
    pub key_border: Color32,
}

impl Palette {
    pub fn for_mode(mode: PaletteMode) -> Self {
        match mode {
            PaletteMode::Dark => Self::dark(),
            PaletteMode::Light => Self::light(),
        }
    }

    pub fn dark() -> Self {
        Self {
            roll_background: Color32::from_rgb(0x0F, 0x11, 0x15),
            grid_line: Color32::from_rgb(0x23, 0x28, 0x34),
            now_line: Color32::from_rgb(0xFF, 0x8C, 0x42),
            wide_note: Color32::from_rgb(0x00, 0xB4, 0xFF),
            narrow_note: Color32::from_rgb(0x00, 0x7A, 0xB8),
            active_note: Color32::from_rgb(0xFF, 0x8C, 0x42),
            wide_key: Color32::from_rgb(0xE6, 0xE6, 0xE6),
            narrow_key: Color32::from_rgb(0x1C, 0x1F, 0x26),
            active_key: Color32::from_rgb(0x00, 0xB4, 0xFF),
            key_border: Color32::from_gray(90),
        }
    }

    pub fn light() -> Self {
        Self {
            roll_background: Color32::from_rgb(0xF2, 0xF4, 0xF8),
            grid_line: Color32::from_gray(210),
            now_line: Color32::from_rgb(0xE0, 0x6A, 0x1F),
            wide_note: Color32::from_rgb(0x3A, 0x7B, 0xD5),
            narrow_note: Color32::from_rgb(0x24, 0x55, 0x9C),
            active_note: Color32::from_rgb(0xE0, 0x6A, 0x1F),
            wide_key: Color32::WHITE,
            narrow_key: Color32::from_gray(30),
            active_key: Color32::from_rgb(0x3A, 0x7B, 0xD5),
            key_border: Color32::from_gray(160),
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawPrimitive {
    Rect {
        rect: Rect,
        fill: Color32,
        stroke: Option<Stroke>,
    },
    Line {
        from: Pos2,
        to: Pos2,
        stroke: Stroke,
    },
}

pub struct RenderInput<'a> {
    pub layout: &'a KeyboardLayout,
    pub frame: FrameView<'a>,
    /// Area for the falling notes.
    pub roll: Rect,
    /// Area for the keyboard, directly below the roll.
    pub keyboard: Rect,
    pub palette: &'a Palette,
}

/// Builds the draw list for one frame. Pure: the same input always yields the
/// same primitives.
pub fn render_frame(input: &RenderInput<'_>) -> Vec<DrawPrimitive> {
    let RenderInput {
        layout,
        frame,
        roll,
        keyboard,
        palette,
    } = input;
    let mut primitives = Vec::with_capacity(frame.visible.len() + layout.keys().len() + 8);

    primitives.push(DrawPrimitive::Rect {
        rect: *roll,
        fill: palette.roll_background,
        stroke: None,
    });
    // octave guides at every C
    for key in layout.wide_keys().filter(|key| key.pitch % 12 == 0) {
        let x = roll.left() + key.x_offset;
        primitives.push(DrawPrimitive::Line {
            from: pos2(x, roll.top()),
            to: pos2(x, roll.bottom()),
            stroke: Stroke::new(1.0, palette.grid_line),
        });
    }

    let axis = TimeAxis::new(*frame.config, roll.height());
    let time = frame.cursor.current_time;
    // narrow notes last so they stay on top of neighbouring wide ones
    for class in [KeyClass::Wide, KeyClass::Narrow] {
        for visible in frame.visible {
            let key = layout.key(visible.note.pitch());
            if key.class != class {
                continue;
            }
            let (top, bottom) = axis.note_span(&visible.note, time);
            if bottom - top < 0.5 {
                continue;
            }
            let base = if visible.active {
                palette.active_note
            } else if class == KeyClass::Wide {
                palette.wide_note
            } else {
                palette.narrow_note
            };
            primitives.push(DrawPrimitive::Rect {
                rect: Rect::from_min_max(
                    pos2(roll.left() + key.x_offset + 1.0, roll.top() + top),
                    pos2(roll.left() + key.right() - 1.0, roll.top() + bottom),
                ),
                fill: velocity_tint(base, visible.note.velocity()),
                stroke: None,
            });
        }
    }

    let now = roll.top() + axis.now_line();
    primitives.push(DrawPrimitive::Line {
        from: pos2(roll.left(), now),
        to: pos2(roll.right(), now),
        stroke: Stroke::new(2.0, palette.now_line),
    });

    let border = Stroke::new(1.0, palette.key_border);
    for key in layout.wide_keys() {
        let fill = if frame.active.contains(key.pitch) {
            palette.active_key
        } else {
            palette.wide_key
        };
        primitives.push(DrawPrimitive::Rect {
            rect: Rect::from_min_max(
                pos2(keyboard.left() + key.x_offset, keyboard.top()),
                pos2(keyboard.left() + key.right(), keyboard.bottom()),
            ),
            fill,
            stroke: Some(border),
        });
    }
    for key in layout.narrow_keys() {
        let fill = if frame.active.contains(key.pitch) {
            palette.active_key
        } else {
            palette.narrow_key
        };
        primitives.push(DrawPrimitive::Rect {
            rect: Rect::from_min_max(
                pos2(keyboard.left() + key.x_offset, keyboard.top()),
                pos2(
                    keyboard.left() + key.right(),
                    keyboard.top() + keyboard.height() * key.height_fraction,
                ),
            ),
            fill,
            stroke: Some(border),
        });
    }
    primitives
}

/// Softer notes are drawn more transparent.
fn velocity_tint(color: Color32, velocity: f32) -> Color32 {
    let alpha = 89.0 + 166.0 * velocity.clamp(0.0, 1.0);
    Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), alpha.round() as u8)
}

pub fn paint(painter: &Painter, primitives: &[DrawPrimitive]) {
    for primitive in primitives {
        match *primitive {
            DrawPrimitive::Rect { rect, fill, stroke } => {
                painter.rect_filled(rect, 0.0, fill);
                if let Some(stroke) = stroke {
                    painter.rect_stroke(rect, 0.0, stroke);
                }
            }
            DrawPrimitive::Line { from, to, stroke } => {
                painter.line_segment([from, to], stroke);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use wave2notes_domain::{Note, PitchRange, PitchSet};
    use wave2notes_player::{PlaybackState, TimeCursor, VisibleNote, WindowConfig};

    use super::*;
    use crate::layout::{compute_layout, LayoutTuning};

    fn rects(primitives: &[DrawPrimitive]) -> Vec<(Rect, Color32)> {
        primitives
            .iter()
            .filter_map(|primitive| match primitive {
                DrawPrimitive::Rect { rect, fill, .. } => Some((*rect, *fill)),
                DrawPrimitive::Line { .. } => None,
            })
            .collect()
    }

    fn render(visible: &[VisibleNote], active: &PitchSet, time: f64) -> Vec<DrawPrimitive> {
        let layout = compute_layout(PitchRange::PIANO, 520.0, &LayoutTuning::default()).unwrap();
        let config = WindowConfig::default();
        let palette = Palette::dark();
        let input = RenderInput {
            layout: &layout,
            frame: FrameView {
                cursor: TimeCursor {
                    current_time: time,
                    total_duration: 10.0,
                },
                state: PlaybackState::Playing,
                visible,
                active,
                config: &config,
            },
            roll: Rect::from_min_max(pos2(0.0, 0.0), pos2(520.0, 400.0)),
            keyboard: Rect::from_min_max(pos2(0.0, 400.0), pos2(520.0, 480.0)),
            palette: &palette,
        };
        render_frame(&input)
    }

    #[test]
    fn note_aligns_under_its_key() {
        let note = Note::new(60, 0.5, 1.0, 1.0).unwrap();
        let visible = [VisibleNote {
            index: 0,
            note,
            active: true,
        }];
        let mut active = PitchSet::new();
        active.insert(60);
        let primitives = render(&visible, &active, 1.0);
        let palette = Palette::dark();

        let (note_rect, note_fill) = rects(&primitives)
            .into_iter()
            .find(|(_, fill)| fill.r() == palette.active_note.r() && fill.a() == 255)
            .unwrap();
        let (key_rect, _) = rects(&primitives)
            .into_iter()
            .find(|(rect, fill)| *fill == palette.active_key && rect.top() == 400.0)
            .unwrap();
        assert_eq!(note_fill.a(), 255);
        assert_eq!(note_rect.left(), key_rect.left() + 1.0);
        assert_eq!(note_rect.right(), key_rect.right() - 1.0);
        // started 0.5s ago, ends 0.5s ahead: straddles the now line at y=300
        assert!(note_rect.top() < 300.0 && note_rect.bottom() > 300.0);
    }

    #[test]
    fn keyboard_has_one_rect_per_key() {
        let primitives = render(&[], &PitchSet::new(), 0.0);
        let keys = rects(&primitives)
            .into_iter()
            .filter(|(rect, _)| rect.top() >= 400.0)
            .count();
        assert_eq!(keys, 88);
    }

    #[test]
    fn narrow_keys_are_shorter_and_drawn_after_wide_keys() {
        let primitives = render(&[], &PitchSet::new(), 0.0);
        let keys: Vec<(Rect, Color32)> = rects(&primitives)
            .into_iter()
            .filter(|(rect, _)| rect.top() >= 400.0)
            .collect();
        let palette = Palette::dark();
        let first_narrow = keys
            .iter()
            .position(|(_, fill)| *fill == palette.narrow_key)
            .unwrap();
        assert_eq!(first_narrow, 52);
        assert!((keys[first_narrow].0.height() - 48.0).abs() < 1e-3);
    }

    #[test]
    fn rendering_is_pure() {
        let note = Note::new(64, 1.0, 0.5, 0.4).unwrap();
        let visible = [VisibleNote {
            index: 0,
            note,
            active: false,
        }];
        let active = PitchSet::new();
        assert_eq!(render(&visible, &active, 0.2), render(&visible, &active, 0.2));
    }

    #[test]
    fn soft_notes_are_translucent() {
        let tinted = velocity_tint(Color32::from_rgb(10, 20, 30), 0.0);
        assert!(tinted.a() < 100);
        assert_eq!(velocity_tint(Color32::from_rgb(10, 20, 30), 1.0).a(), 255);
    }
}

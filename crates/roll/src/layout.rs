use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use wave2notes_domain::PitchRange;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("pitch range {lowest}..={highest} is empty")]
    EmptyRange { lowest: u8, highest: u8 },
    #[error("pitch range {lowest}..={highest} has no wide keys")]
    NoWideKeys { lowest: u8, highest: u8 },
    #[error("canvas width {0} must be positive and finite")]
    InvalidWidth(f32),
    #[error("pitch {pitch} is outside {lowest}..={highest}")]
    PitchOutOfRange { pitch: u8, lowest: u8, highest: u8 },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum KeyClass {
    Wide,
    Narrow,
}

impl KeyClass {
    pub fn of(pitch: u8) -> Self {
        match pitch % 12 {
            1 | 3 | 6 | 8 | 10 => KeyClass::Narrow,
            _ => KeyClass::Wide,
        }
    }
}

/// Horizontal placement of one key, relative to the left edge of the canvas.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeyGeometry {
    pub pitch: u8,
    pub x_offset: f32,
    pub width: f32,
    pub class: KeyClass,
    /// Share of the keyboard height the key occupies.
    pub height_fraction: f32,
}

impl KeyGeometry {
    pub fn right(&self) -> f32 {
        self.x_offset + self.width
    }

    pub fn center(&self) -> f32 {
        self.x_offset + self.width / 2.0
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LayoutTuning {
    pub narrow_width_ratio: f32,
    pub narrow_height_ratio: f32,
    /// Shifts narrow keys left of the exact boundary center, in pixels.
    pub narrow_nudge: f32,
}

impl Default for LayoutTuning {
    fn default() -> Self {
        Self {
            narrow_width_ratio: 0.6,
            narrow_height_ratio: 0.6,
            narrow_nudge: 0.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyboardLayout {
    range: PitchRange,
    canvas_width: f32,
    wide_width: f32,
    keys: Vec<KeyGeometry>,
}

impl KeyboardLayout {
    pub fn range(&self) -> PitchRange {
        self.range
    }

    pub fn canvas_width(&self) -> f32 {
        self.canvas_width
    }

    pub fn wide_width(&self) -> f32 {
        self.wide_width
    }

    /// One entry per pitch, in pitch order.
    pub fn keys(&self) -> &[KeyGeometry] {
        &self.keys
    }

    pub fn wide_keys(&self) -> impl Iterator<Item = &KeyGeometry> {
        self.keys.iter().filter(|key| key.class == KeyClass::Wide)
    }

    pub fn narrow_keys(&self) -> impl Iterator<Item = &KeyGeometry> {
        self.keys.iter().filter(|key| key.class == KeyClass::Narrow)
    }

    pub fn try_key(&self, pitch: u8) -> Result<&KeyGeometry, LayoutError> {
        if !self.range.contains(pitch) {
            return Err(LayoutError::PitchOutOfRange {
                pitch,
                lowest: self.range.lowest,
                highest: self.range.highest,
            });
        }
        Ok(&self.keys[usize::from(pitch - self.range.lowest)])
    }

    /// Geometry for `pitch`, clamped to the nearest key in range.
    pub fn key(&self, pitch: u8) -> &KeyGeometry {
        let clamped = self.range.clamp(pitch);
        &self.keys[usize::from(clamped - self.range.lowest)]
    }
}

/// Maps every pitch in `range` onto `[0, canvas_width)`.
///
/// Wide keys tile the canvas left to right without gaps. A narrow key sits
/// centered on the boundary after the last wide key below it; ranges that start
/// or end on a narrow key clamp that boundary into the keyboard.
pub fn compute_layout(
    range: PitchRange,
    canvas_width: f32,
    tuning: &LayoutTuning,
) -> Result<KeyboardLayout, LayoutError> {
    if range.is_empty() {
        return Err(LayoutError::EmptyRange {
            lowest: range.lowest,
            highest: range.highest,
        });
    }
    if !canvas_width.is_finite() || canvas_width <= 0.0 {
        return Err(LayoutError::InvalidWidth(canvas_width));
    }
    let wide_count = range
        .iter()
        .filter(|pitch| KeyClass::of(*pitch) == KeyClass::Wide)
        .count();
    if wide_count == 0 {
        return Err(LayoutError::NoWideKeys {
            lowest: range.lowest,
            highest: range.highest,
        });
    }

    let wide_width = canvas_width / wide_count as f32;
    let narrow_width = wide_width * tuning.narrow_width_ratio;
    let last_slot = wide_count - 1;
    let mut keys = Vec::with_capacity(range.len());
    let mut wide_before = 0usize;
    for pitch in range.iter() {
        let key = match KeyClass::of(pitch) {
            KeyClass::Wide => {
                let key = KeyGeometry {
                    pitch,
                    x_offset: wide_before as f32 * wide_width,
                    width: wide_width,
                    class: KeyClass::Wide,
                    height_fraction: 1.0,
                };
                wide_before += 1;
                key
            }
            KeyClass::Narrow => {
                let boundary = wide_before.min(last_slot) as f32 * wide_width;
                let x = boundary - narrow_width / 2.0 - tuning.narrow_nudge;
                KeyGeometry {
                    pitch,
                    x_offset: x.clamp(0.0, (canvas_width - narrow_width).max(0.0)),
                    width: narrow_width,
                    class: KeyClass::Narrow,
                    height_fraction: tuning.narrow_height_ratio,
                }
            }
        };
        keys.push(key);
    }
    trace!(
        lowest = range.lowest,
        highest = range.highest,
        canvas_width,
        wide_count,
        "computed keyboard layout"
    );
    Ok(KeyboardLayout {
        range,
        canvas_width,
        wide_width,
        keys,
    })
}

/// Keeps the last layout and recomputes only when the range or width changes.
#[derive(Debug, Default)]
pub struct LayoutCache {
    tuning: LayoutTuning,
    cached: Option<KeyboardLayout>,
    computations: usize,
}

impl LayoutCache {
    pub fn new(tuning: LayoutTuning) -> Self {
        Self {
            tuning,
            cached: None,
            computations: 0,
        }
    }

    pub fn tuning(&self) -> &LayoutTuning {
        &self.tuning
    }

    pub fn set_tuning(&mut self, tuning: LayoutTuning) {
        if tuning != self.tuning {
            self.tuning = tuning;
            self.cached = None;
        }
    }

    pub fn get(
        &mut self,
        range: PitchRange,
        canvas_width: f32,
    ) -> Result<&KeyboardLayout, LayoutError> {
        let layout = match self.cached.take() {
            Some(layout) if layout.range == range && layout.canvas_width == canvas_width => layout,
            _ => {
                let layout = compute_layout(range, canvas_width, &self.tuning)?;
                self.computations += 1;
                layout
            }
        };
        Ok(&*self.cached.insert(layout))
    }

    /// Number of layouts computed so far.
    pub fn computations(&self) -> usize {
        self.computations
    }
}

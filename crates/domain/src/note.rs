use serde::{Deserialize, Serialize};

use crate::DomainError;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One transcribed note. Created once when a transcription result is parsed and
/// never mutated afterwards.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "NoteFields")]
pub struct Note {
    pitch: u8,
    /// Seconds from the start of the recording.
    onset: f64,
    /// Seconds, strictly positive.
    duration: f64,
    /// Normalized to [0, 1].
    velocity: f32,
}

#[derive(Deserialize)]
struct NoteFields {
    pitch: u8,
    onset: f64,
    duration: f64,
    velocity: f32,
}

impl TryFrom<NoteFields> for Note {
    type Error = DomainError;

    fn try_from(fields: NoteFields) -> Result<Self, Self::Error> {
        Note::new(fields.pitch, fields.onset, fields.duration, fields.velocity)
    }
}

impl Note {
    pub fn new(pitch: u8, onset: f64, duration: f64, velocity: f32) -> Result<Self, DomainError> {
        if pitch > 127 {
            return Err(DomainError::validation(format!(
                "pitch {pitch} is outside the MIDI range 0..=127"
            )));
        }
        if !onset.is_finite() || onset < 0.0 {
            return Err(DomainError::validation(
                "note onset must be a finite, non-negative number of seconds",
            ));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(DomainError::validation(
                "note duration must be a finite, positive number of seconds",
            ));
        }
        if !(0.0..=1.0).contains(&velocity) {
            return Err(DomainError::validation(
                "note velocity must be between 0 and 1",
            ));
        }
        Ok(Self {
            pitch,
            onset,
            duration,
            velocity,
        })
    }

    pub fn pitch(&self) -> u8 {
        self.pitch
    }

    pub fn onset(&self) -> f64 {
        self.onset
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    /// Half-open: a note stops sounding exactly at its end.
    pub fn is_sounding_at(&self, time: f64) -> bool {
        self.onset <= time && time < self.end()
    }

    pub fn name(&self) -> String {
        pitch_name(self.pitch)
    }
}

/// Scientific pitch name, with MIDI 60 as "C4".
pub fn pitch_name(pitch: u8) -> String {
    let octave = pitch as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[pitch as usize % 12], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_validation() {
        assert!(Note::new(128, 0.0, 1.0, 0.5).is_err());
        assert!(Note::new(60, -0.1, 1.0, 0.5).is_err());
        assert!(Note::new(60, 0.0, 0.0, 0.5).is_err());
        assert!(Note::new(60, 0.0, f64::NAN, 0.5).is_err());
        assert!(Note::new(60, 0.0, 1.0, 1.5).is_err());
        assert!(Note::new(60, 0.0, 1.0, 0.5).is_ok());
    }

    #[test]
    fn sounding_is_half_open() {
        let note = Note::new(60, 0.5, 1.0, 0.8).unwrap();
        assert!(!note.is_sounding_at(0.4));
        assert!(note.is_sounding_at(0.5));
        assert!(note.is_sounding_at(1.0));
        assert!(!note.is_sounding_at(1.5));
        assert_eq!(note.end(), 1.5);
    }

    #[test]
    fn pitch_names() {
        assert_eq!(pitch_name(60), "C4");
        assert_eq!(pitch_name(21), "A0");
        assert_eq!(pitch_name(108), "C8");
        assert_eq!(Note::new(70, 0.0, 1.0, 0.5).unwrap().name(), "A#4");
    }

    #[test]
    fn deserialize_rejects_invalid_notes() {
        let ok: Result<Note, _> =
            serde_json::from_str(r#"{"pitch":60,"onset":0.0,"duration":1.0,"velocity":0.5}"#);
        assert!(ok.is_ok());
        let bad: Result<Note, _> =
            serde_json::from_str(r#"{"pitch":60,"onset":0.0,"duration":-1.0,"velocity":0.5}"#);
        assert!(bad.is_err());
    }
}

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{note::Note, DomainError};

/// Velocity used by the transcription service when the model gives none.
pub const DEFAULT_VELOCITY: f32 = 0.8;

/// One note record exactly as the transcription service returns it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NoteRecord {
    pub pitch: i64,
    /// Onset in seconds.
    pub time: f64,
    pub duration: f64,
    #[serde(default)]
    pub velocity: Option<f32>,
    #[serde(default)]
    pub velocity_midi: Option<u8>,
    #[serde(default)]
    pub note_name: Option<String>,
}

impl NoteRecord {
    fn normalized_velocity(&self) -> f32 {
        self.velocity
            .or_else(|| self.velocity_midi.map(|v| v as f32 / 127.0))
            .unwrap_or(DEFAULT_VELOCITY)
    }
}

impl TryFrom<&NoteRecord> for Note {
    type Error = DomainError;

    fn try_from(record: &NoteRecord) -> Result<Self, Self::Error> {
        let pitch = u8::try_from(record.pitch).map_err(|_| {
            DomainError::validation(format!("pitch {} is not a MIDI pitch", record.pitch))
        })?;
        Note::new(
            pitch,
            record.time,
            record.duration,
            record.normalized_velocity(),
        )
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DebugInfo {
    #[serde(default)]
    pub total_duration: Option<f64>,
    #[serde(default)]
    pub notes_extracted: Option<usize>,
}

/// Response body of the transcription service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub notes: Vec<NoteRecord>,
    #[serde(default)]
    pub midi_file: Option<String>,
    #[serde(default)]
    pub debug_info: Option<DebugInfo>,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_success() -> bool {
    true
}

/// Validated transcription: notes sorted by onset plus the audio rendering URL.
#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptionResult {
    pub notes: Vec<Note>,
    pub midi_file: Option<String>,
    pub total_duration: Option<f64>,
    /// Records dropped because they failed validation.
    pub rejected: usize,
}

impl TranscriptionResult {
    pub fn from_response(response: TranscriptionResponse) -> Result<Self, DomainError> {
        if !response.success {
            return Err(DomainError::Service(
                response
                    .error
                    .unwrap_or_else(|| "transcription failed".to_string()),
            ));
        }
        let mut notes = Vec::with_capacity(response.notes.len());
        let mut rejected = 0;
        for record in &response.notes {
            match Note::try_from(record) {
                Ok(note) => notes.push(note),
                Err(err) => {
                    rejected += 1;
                    warn!(
                        %err,
                        pitch = record.pitch,
                        time = record.time,
                        "dropping invalid note record"
                    );
                }
            }
        }
        notes.sort_by(|a, b| a.onset().total_cmp(&b.onset()));
        debug!(count = notes.len(), rejected, "parsed transcription result");
        Ok(Self {
            notes,
            midi_file: response.midi_file,
            total_duration: response.debug_info.and_then(|info| info.total_duration),
            rejected,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DomainError> {
        let response: TranscriptionResponse = serde_json::from_slice(bytes)?;
        Self::from_response(response)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DomainError> {
        let response: TranscriptionResponse = serde_json::from_reader(reader)?;
        Self::from_response(response)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            DomainError::Serialization(format!("open {}: {err}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Latest note end, or zero for an empty transcription.
    pub fn notes_end(&self) -> f64 {
        self.notes.iter().map(Note::end).fold(0.0, f64::max)
    }
}

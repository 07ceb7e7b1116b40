pub mod error;
pub mod note;
pub mod pitch;
pub mod transcription;

pub use crate::error::DomainError;
pub use crate::note::{pitch_name, Note};
pub use crate::pitch::{PitchRange, PitchSet};
pub use crate::transcription::{NoteRecord, TranscriptionResponse, TranscriptionResult};

//! Playback timing for the piano roll: the animation clock, the transport state
//! machine wrapped around an audio backend, and per-tick note windowing.

pub mod clock;
pub mod controller;
pub mod pipeline;
pub mod window;

pub use clock::{PlaybackClock, TimeCursor};
pub use controller::{
    AudioCapability, CapabilityWarning, Playable, PlaybackController, PlaybackState, ResetCause,
};
pub use pipeline::{FrameView, PlaybackSession};
pub use window::{
    NoteTrack, NoteWindow, TimeAxis, VisibleNote, WindowConfig, INDEXED_SCAN_THRESHOLD,
};

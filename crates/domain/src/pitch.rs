use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Inclusive range of MIDI pitches shown on the keyboard.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PitchRange {
    pub lowest: u8,
    pub highest: u8,
}

impl PitchRange {
    /// The 88-key piano, A0 to C8.
    pub const PIANO: PitchRange = PitchRange {
        lowest: 21,
        highest: 108,
    };

    pub fn new(lowest: u8, highest: u8) -> Result<Self, DomainError> {
        if lowest > highest {
            return Err(DomainError::validation(format!(
                "pitch range {lowest}..={highest} is empty"
            )));
        }
        if highest > 127 {
            return Err(DomainError::validation(
                "pitch range must stay within the MIDI range 0..=127",
            ));
        }
        Ok(Self { lowest, highest })
    }

    pub fn contains(&self, pitch: u8) -> bool {
        (self.lowest..=self.highest).contains(&pitch)
    }

    pub fn clamp(&self, pitch: u8) -> u8 {
        pitch.max(self.lowest).min(self.highest)
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.highest - self.lowest) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lowest > self.highest
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> {
        self.lowest..=self.highest
    }
}

impl Default for PitchRange {
    fn default() -> Self {
        Self::PIANO
    }
}

/// Set of MIDI pitches packed into a single `u128`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PitchSet(u128);

impl PitchSet {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, pitch: u8) -> bool {
        let bit = Self::bit(pitch);
        let fresh = self.0 & bit == 0;
        self.0 |= bit;
        fresh
    }

    pub fn contains(&self, pitch: u8) -> bool {
        pitch < 128 && self.0 & Self::bit(pitch) != 0
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_subset(&self, other: &PitchSet) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..128).filter(move |pitch| self.contains(*pitch))
    }

    fn bit(pitch: u8) -> u128 {
        1u128 << (pitch & 0x7f)
    }
}

impl FromIterator<u8> for PitchSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = PitchSet::new();
        for pitch in iter {
            set.insert(pitch);
        }
        set
    }
}

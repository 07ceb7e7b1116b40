use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Current time and total length of the piece, in seconds.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TimeCursor {
    pub current_time: f64,
    pub total_duration: f64,
}

impl TimeCursor {
    pub fn progress(&self) -> f64 {
        if self.total_duration > 0.0 {
            (self.current_time / self.total_duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Animation driver: the single source of visual time. It advances only by the
/// tick deltas it is given and never reads the audio device clock.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackClock {
    value: f64,
    total: f64,
    running: bool,
}

impl PlaybackClock {
    pub fn new(total: f64) -> Self {
        Self {
            value: 0.0,
            total: sanitize(total),
            running: false,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn cursor(&self) -> TimeCursor {
        TimeCursor {
            current_time: self.value,
            total_duration: self.total,
        }
    }

    pub fn set_total(&mut self, total: f64) {
        self.total = sanitize(total);
        self.value = self.value.min(self.total);
    }

    /// Runs from the current value.
    pub fn forward(&mut self) {
        self.running = true;
    }

    /// Stops without touching the value.
    pub fn halt(&mut self) {
        self.running = false;
    }

    pub fn reset(&mut self) {
        self.running = false;
        self.value = 0.0;
    }

    pub fn seek(&mut self, time: f64) -> f64 {
        if time.is_finite() {
            self.value = time.clamp(0.0, self.total);
        }
        self.value
    }

    pub fn advance(&mut self, elapsed: Duration) -> f64 {
        if self.running {
            self.value = (self.value + elapsed.as_secs_f64()).min(self.total);
        }
        self.value
    }

    pub fn is_at_end(&self) -> bool {
        self.value >= self.total
    }
}

fn sanitize(total: f64) -> f64 {
    if total.is_finite() {
        total.max(0.0)
    } else {
        0.0
    }
}

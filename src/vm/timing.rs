//! Tick arithmetic for the two clock domains.
//!
//! TIME sequencers run off the host frame counter (60 Hz nominal);
//! MIDI_TIME sequencers run off the audio backend's MIDI clock.  Both
//! share the same scheduler — only the step→tick conversion differs.

use serde::{Deserialize, Serialize};

/// Pulses per quarter note of the MIDI clock.
pub const PPQ: u64 = 480;

/// TIME default: 12 ticks per step, ≈200 ms at 60 Hz.
pub const DEFAULT_TICKS_PER_STEP: u64 = 12;

/// `SetStep(n)` base unit in TIME mode: 3 ticks, 50 ms at 60 Hz.
pub const TIME_STEP_UNIT: u64 = 3;

/// Bound on MIDI catch-up passes per frame (spiral-of-death guard).
pub const MAX_CATCHUP_PASSES: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimingMode {
    Time,
    MidiTime,
}

impl TimingMode {
    /// Ticks per step before any `SetStep`.
    pub fn default_ticks_per_step(self) -> u64 {
        match self {
            TimingMode::Time => DEFAULT_TICKS_PER_STEP,
            TimingMode::MidiTime => PPQ / 8,
        }
    }

    /// Ticks per step after `SetStep(n)`.
    pub fn ticks_per_step(self, n: i64) -> u64 {
        let n = n.max(0) as u64;
        match self {
            TimingMode::Time => n * TIME_STEP_UNIT,
            TimingMode::MidiTime => (PPQ / 8) * n,
        }
    }
}

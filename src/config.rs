//! Explicit, per-call configuration.
//!
//! The Python original reads a YAML file into module-level singletons
//! (`src/config.py`). Per spec.md §9 the core here carries no global state:
//! every planner and capture entry point takes a [`PlannerConfig`] value.

/// Tunables for the fingering planner's cost model and the short-note guard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerConfig {
    /// Per-move penalty coefficient `P_move` (spec.md §4.3.3). Default 5.0.
    pub move_penalty: f64,
    /// Per-distance-squared penalty coefficient `P_dist` (spec.md §4.3.3). Default 50.0.
    pub distance_penalty: f64,
    /// Short-note guard threshold in seconds, `τ_short`. Default 0.25.
    pub short_note_threshold_secs: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            move_penalty: 5.0,
            distance_penalty: 50.0,
            short_note_threshold_secs: 0.25,
        }
    }
}

/// Tunables for the live capture channel (spec.md §4.4, §5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    /// Split pitch below which notes are labelled left-hand. Default 60 (middle C).
    pub split_pitch: u8,
    /// Bounded queue capacity, drop-newest on overflow. Default 100.
    pub queue_capacity: usize,
    /// Consumer poll timeout, in milliseconds. Default 1000.
    pub poll_timeout_ms: u64,
    /// Grace period allowed for the producer to drain on cancellation, in milliseconds. Default 2000.
    pub shutdown_grace_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            split_pitch: 60,
            queue_capacity: 100,
            poll_timeout_ms: 1000,
            shutdown_grace_ms: 2000,
        }
    }
}

/// Pre-processing toggles (spec.md §4.2). Steps 2 and 3 are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreprocessConfig {
    /// Step 4: raise every right-hand note by one octave, clamped to octave 8.
    pub transpose_right_octave: bool,
    /// Step 3: drop left-hand notes at or below the threshold semitone.
    pub filter_left_low_notes: bool,
    /// Step 2: raise low left-hand notes by whole octaves into C3–B3.
    pub transpose_left_low_to_range: bool,
}

impl PreprocessConfig {
    /// Checks the mutual-exclusion precondition of spec.md §4.2.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.filter_left_low_notes && self.transpose_left_low_to_range {
            return Err(crate::error::PlannerError::PreconditionError(
                "--filter-left-low-notes and --transpose-left-low-to-range are mutually exclusive"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Semitone threshold used by the low-note filter and low-note transposition
/// (B2 = 47, per spec.md §4.2).
pub const LOW_NOTE_THRESHOLD: u8 = 47;
/// Lower bound of the C3–B3 lift target range.
pub const LOW_NOTE_LIFT_MIN: u8 = 48;
/// Upper bound of the C3–B3 lift target range.
pub const LOW_NOTE_LIFT_MAX: u8 = 59;
/// Maximum number of octaves the low-note lift may apply (spec.md §4.2).
pub const LOW_NOTE_LIFT_MAX_OCTAVES: u8 = 4;
/// Hand-split pitch for sources that are not already hand-tagged (middle C).
pub const HAND_SPLIT_PITCH: u8 = 60;

//! Error types shared by every stage of the planner pipeline.

use thiserror::Error;

use crate::planner::Trajectory;

/// The tagged error variant surfaced across the crate.
///
/// `OutOfRange` is collected rather than raised: callers get a
/// [`crate::planner::FilterReport`] alongside a successful result instead of
/// an `Err`. `Infeasible` similarly carries a best-effort trajectory rather
/// than discarding the work the DP already did.
#[derive(Debug, Error)]
pub enum PlannerError {
    /// A MIDI file could not be parsed.
    #[error("malformed MIDI file: {reason} (track {track}, tick {tick})")]
    ParseError {
        track: usize,
        tick: u32,
        reason: String,
    },

    /// Two mutually exclusive options were both requested, or a requested
    /// configuration cannot be satisfied.
    #[error("precondition violated: {0}")]
    PreconditionError(String),

    /// The short-note guard eliminated every admissible path through the
    /// DP. The best-effort (guard-relaxed) trajectory is attached.
    #[error("no feasible fingering trajectory under the short-note guard")]
    Infeasible(Box<Trajectory>),

    /// A file read or write failed.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A single note dropped for being outside a hand's hardware range.
#[derive(Debug, Clone, serde::Serialize)]
pub struct FilteredNote {
    pub semitone: u8,
    pub reason: String,
}

pub type Result<T> = std::result::Result<T, PlannerError>;

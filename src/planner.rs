//! C3 — Fingering Planner.
//!
//! The core subsystem: given a per-hand note stream, computes the
//! cost-optimal arm-position and finger trajectory under the hardware reach
//! constraints, forced-position overrides, black-key fingering rules and
//! the short-note guard (spec.md §4.3). Grounded on
//! `original_source/src/midi_handler/notes_to_fingering.py`'s
//! `find_arm_positions_optimized`, re-expressed as a left-to-right DP over
//! an explicit state table instead of the original's dict-of-dicts.

use std::collections::HashMap;

use crate::config::PlannerConfig;
use crate::error::{FilteredNote, PlannerError, Result};
use crate::note::{black_key_region, is_black_key, white_key_index, BlackKeyRegion, Hand, Note};

const COST_EPS: f64 = 1e-9;

/// Whether the right hand's pinky reaches a note in its normal slot or the
/// sixth, extended slot (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinkyKeyType {
    Normal,
    Extended,
}

/// One input note resolved to an arm position and finger (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct PlannedNote {
    pub note: Note,
    pub white_key_index: u8,
    pub arm_position: u8,
    pub finger: u8,
    pub pinky_key_type: PinkyKeyType,
    pub start: f64,
    pub end: f64,
    pub velocity: u8,
    pub hand: Hand,
    pub is_black: bool,
    pub region: Option<BlackKeyRegion>,
}

/// The ordered trajectory for one hand, plus the aggregate statistics
/// spec.md §4.3.1 asks for.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Trajectory {
    pub hand: Hand,
    pub notes: Vec<PlannedNote>,
    pub total_move_distance: u32,
    pub move_count: u32,
    pub max_move_distance: u32,
    /// Set when the short-note guard left at least one step with no
    /// admissible predecessor and the guard had to be relaxed there
    /// (SPEC_FULL.md §10, decision 2).
    pub infeasible: bool,
}

impl Trajectory {
    fn empty(hand: Hand) -> Self {
        Self {
            hand,
            notes: Vec::new(),
            total_move_distance: 0,
            move_count: 0,
            max_move_distance: 0,
            infeasible: false,
        }
    }
}

/// Notes dropped before planning because they fall outside the hand's
/// hardware range (spec.md §4.3.2), carried back alongside a successful
/// plan rather than raised as an error (spec.md §7).
#[derive(Debug, Clone, Default)]
pub struct FilterReport {
    pub filtered: Vec<FilteredNote>,
}

#[derive(Clone, Copy)]
struct DpCell {
    cost: f64,
    moves: u32,
    prev: Option<u8>,
}

/// Plans the fingering trajectory for a single hand's note stream.
///
/// Returns `Err(PlannerError::Infeasible)` carrying the best-effort
/// trajectory when the short-note guard leaves at least one step with no
/// admissible predecessor; every other outcome, including an empty input,
/// is `Ok`.
pub fn plan(notes: &[Note], hand: Hand, config: PlannerConfig) -> Result<(Trajectory, FilterReport)> {
    let (in_range, filtered) = filter_to_hand_range(notes, hand);
    if in_range.is_empty() {
        return Ok((Trajectory::empty(hand), FilterReport { filtered }));
    }

    let windows: Vec<(u8, u8)> = in_range.iter().map(|n| window_for(hand, n.semitone)).collect();

    let mut table: Vec<HashMap<u8, DpCell>> = Vec::with_capacity(in_range.len());
    let (lo0, hi0) = windows[0];
    let mut first = HashMap::new();
    for p in lo0..=hi0 {
        first.insert(
            p,
            DpCell {
                cost: 0.0,
                moves: 0,
                prev: None,
            },
        );
    }
    table.push(first);

    let mut relaxed_anywhere = false;

    for i in 1..in_range.len() {
        let (lo, hi) = windows[i];
        let guard_active = in_range[i - 1].duration <= config.short_note_threshold_secs;

        let mut cur = step(&table[i - 1], lo, hi, guard_active, config);
        if cur.is_empty() {
            // The guard forbade every admissible transition into this
            // window. Relax it for this single step only and flag the
            // trajectory as infeasible, per SPEC_FULL.md §10 decision 2.
            relaxed_anywhere = true;
            cur = step(&table[i - 1], lo, hi, false, config);
        }
        table.push(cur);
    }

    let last = table.last().expect("at least one note");
    let (&best_p, best_cell) = last
        .iter()
        .min_by(|a, b| {
            a.1.cost
                .partial_cmp(&b.1.cost)
                .unwrap()
                .then(a.1.moves.cmp(&b.1.moves))
                .then(a.0.cmp(b.0))
        })
        .expect("window is never empty at step 0, and step() always fills its own window");

    let mut positions = vec![0u8; in_range.len()];
    let last_idx = in_range.len() - 1;
    positions[last_idx] = best_p;
    let mut cell = *best_cell;
    for i in (1..in_range.len()).rev() {
        let prev_p = cell.prev.expect("non-final steps always have a predecessor");
        positions[i - 1] = prev_p;
        cell = table[i - 1][&prev_p];
    }

    let mut planned = Vec::with_capacity(in_range.len());
    let mut total_move_distance = 0u32;
    let mut move_count = 0u32;
    let mut max_move_distance = 0u32;
    for (i, note) in in_range.iter().enumerate() {
        let w = white_key_index(note.semitone);
        let a = positions[i];
        let (finger, pinky_key_type) = assign_finger(hand, note.semitone, w, a);
        if i > 0 {
            let d = (a as i32 - positions[i - 1] as i32).unsigned_abs();
            total_move_distance += d;
            max_move_distance = max_move_distance.max(d);
            if d > 0 {
                move_count += 1;
            }
        }
        planned.push(PlannedNote {
            note: *note,
            white_key_index: w,
            arm_position: a,
            finger,
            pinky_key_type,
            start: note.start,
            end: note.start + note.duration,
            velocity: note.velocity,
            hand,
            is_black: is_black_key(note.semitone),
            region: black_key_region(note.semitone),
        });
    }

    let trajectory = Trajectory {
        hand,
        notes: planned,
        total_move_distance,
        move_count,
        max_move_distance,
        infeasible: relaxed_anywhere,
    };

    if relaxed_anywhere {
        Err(PlannerError::Infeasible(Box::new(trajectory)))
    } else {
        Ok((trajectory, FilterReport { filtered }))
    }
}

/// Plans both hands concurrently; no state is shared across them, so this
/// is a plain `rayon::join` fan-out (spec.md §5, "may be run in parallel").
pub fn plan_both_hands(
    left_notes: &[Note],
    right_notes: &[Note],
    config: PlannerConfig,
) -> (
    Result<(Trajectory, FilterReport)>,
    Result<(Trajectory, FilterReport)>,
) {
    rayon::join(
        || plan(left_notes, Hand::Left, config),
        || plan(right_notes, Hand::Right, config),
    )
}

/// Computes one DP layer: `dp[p]` for every `p` in `[lo, hi]`, minimising
/// over predecessors in `prev`. When `guard_active`, transitions with
/// nonzero distance are excluded outright rather than scored at infinity,
/// so an empty result cleanly signals "no admissible predecessor" to the
/// caller.
fn step(
    prev: &HashMap<u8, DpCell>,
    lo: u8,
    hi: u8,
    guard_active: bool,
    config: PlannerConfig,
) -> HashMap<u8, DpCell> {
    let mut cur = HashMap::new();
    for p in lo..=hi {
        let mut best: Option<(f64, u32, u8)> = None;
        for (&pprev, cell) in prev.iter() {
            let d = (p as i32 - pprev as i32).unsigned_abs();
            if d > 0 && guard_active {
                continue;
            }
            let step_cost = transition_cost(d, config);
            let total_cost = cell.cost + step_cost;
            let total_moves = cell.moves + u32::from(d > 0);

            let is_better = match best {
                None => true,
                Some((best_cost, best_moves, best_p)) => {
                    if total_cost < best_cost - COST_EPS {
                        true
                    } else if (total_cost - best_cost).abs() <= COST_EPS {
                        total_moves < best_moves || (total_moves == best_moves && pprev < best_p)
                    } else {
                        false
                    }
                }
            };
            if is_better {
                best = Some((total_cost, total_moves, pprev));
            }
        }
        if let Some((cost, moves, pprev)) = best {
            cur.insert(
                p,
                DpCell {
                    cost,
                    moves,
                    prev: Some(pprev),
                },
            );
        }
    }
    cur
}

/// `c(i-1, i) = d + P_dist * d^2 + P_move * [d > 0]` (spec.md §4.3.3).
fn transition_cost(d: u32, config: PlannerConfig) -> f64 {
    let d = d as f64;
    d + config.distance_penalty * d * d + if d > 0.0 { config.move_penalty } else { 0.0 }
}

/// Hardware reach window, narrowed to a single forced value or pair for
/// range-boundary pitches (spec.md §4.3.2).
fn window_for(hand: Hand, semitone: u8) -> (u8, u8) {
    if let Some(forced) = forced_position(hand, semitone) {
        return forced;
    }
    let w = white_key_index(semitone);
    match hand {
        Hand::Right => (w.saturating_sub(5).max(1), w.min(52)),
        Hand::Left => (w.saturating_sub(4).max(1), w.min(52)),
    }
}

fn forced_position(hand: Hand, semitone: u8) -> Option<(u8, u8)> {
    match (hand, semitone) {
        (Hand::Right, 60) => Some((24, 24)),  // C4
        (Hand::Right, 107) => Some((46, 47)), // B7
        (Hand::Right, 108) => Some((47, 48)), // C8
        (Hand::Left, 59) => Some((19, 19)),   // B3
        (Hand::Left, 21) => Some((1, 1)),     // A0
        (Hand::Left, 23) => Some((2, 2)),     // B0
        _ => None,
    }
}

/// Drops notes outside the hand's hardware range (Left: A0..B3, Right:
/// C4..C8), reporting each one rather than failing the call.
fn filter_to_hand_range(notes: &[Note], hand: Hand) -> (Vec<Note>, Vec<FilteredNote>) {
    let (min_semitone, max_semitone) = match hand {
        Hand::Left => (21, 59),
        Hand::Right => (60, 108),
    };
    let mut kept = Vec::with_capacity(notes.len());
    let mut filtered = Vec::new();
    for &note in notes {
        if note.semitone < min_semitone || note.semitone > max_semitone {
            log::debug!("dropping out-of-range note: semitone {} for {hand:?} hand", note.semitone);
            filtered.push(FilteredNote {
                semitone: note.semitone,
                reason: format!("semitone {} outside {hand:?} hand range", note.semitone),
            });
        } else {
            kept.push(note);
        }
    }
    (kept, filtered)
}

/// Deterministic finger assignment: black-key rules first, then the
/// white-key offset table (spec.md §4.3.4).
fn assign_finger(hand: Hand, semitone: u8, white_key_index: u8, arm_position: u8) -> (u8, PinkyKeyType) {
    if is_black_key(semitone) {
        if let Some(finger) = black_key_finger(hand, semitone) {
            return (finger, PinkyKeyType::Normal);
        }
    }
    let offset = white_key_index - arm_position;
    white_offset_finger(hand, offset)
}

fn black_key_finger(hand: Hand, semitone: u8) -> Option<u8> {
    // A0# is a special case carved out of the left hand's general A# rule.
    if hand == Hand::Left && semitone == 22 {
        return Some(4);
    }
    match (hand, semitone % 12) {
        (Hand::Right, 1) => Some(2),  // C#
        (Hand::Right, 3) => Some(3),  // D#
        (Hand::Right, 6) => Some(2),  // F#
        (Hand::Right, 8) => Some(3),  // G#
        (Hand::Right, 10) => Some(4), // A#
        (Hand::Left, 1) => Some(3),   // C#
        (Hand::Left, 3) => Some(2),   // D#
        (Hand::Left, 6) => Some(4),   // F#
        (Hand::Left, 8) => Some(3),   // G#
        (Hand::Left, 10) => Some(2),  // A#
        _ => None,
    }
}

fn white_offset_finger(hand: Hand, offset: u8) -> (u8, PinkyKeyType) {
    match hand {
        Hand::Right => match offset {
            0 => (1, PinkyKeyType::Normal),
            1 => (2, PinkyKeyType::Normal),
            2 => (3, PinkyKeyType::Normal),
            3 => (4, PinkyKeyType::Normal),
            4 => (5, PinkyKeyType::Normal),
            5 => (5, PinkyKeyType::Extended),
            other => unreachable!("right-hand offset out of range: {other}"),
        },
        Hand::Left => match offset {
            0 => (5, PinkyKeyType::Normal),
            1 => (4, PinkyKeyType::Normal),
            2 => (3, PinkyKeyType::Normal),
            3 => (2, PinkyKeyType::Normal),
            4 => (1, PinkyKeyType::Normal),
            other => unreachable!("left-hand offset out of range: {other}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(semitone: u8, start: f64, duration: f64) -> Note {
        Note {
            semitone,
            start,
            duration,
            velocity: 80,
            track: 0,
        }
    }

    // S1
    #[test]
    fn single_c4_uses_thumb_at_position_24() {
        let (traj, report) = plan(&[note(60, 0.0, 0.5)], Hand::Right, PlannerConfig::default()).unwrap();
        assert!(report.filtered.is_empty());
        assert_eq!(traj.notes.len(), 1);
        assert_eq!(traj.notes[0].arm_position, 24);
        assert_eq!(traj.notes[0].finger, 1);
        assert_eq!(traj.notes[0].pinky_key_type, PinkyKeyType::Normal);
        assert_eq!(traj.total_move_distance, 0);
        assert_eq!(traj.move_count, 0);
    }

    // S2
    #[test]
    fn c_major_run_stays_at_one_position() {
        let notes = [
            note(60, 0.0, 0.5),
            note(62, 0.5, 0.5),
            note(64, 1.0, 0.5),
            note(65, 1.5, 0.5),
            note(67, 2.0, 0.5),
        ];
        let (traj, _) = plan(&notes, Hand::Right, PlannerConfig::default()).unwrap();
        let positions: Vec<u8> = traj.notes.iter().map(|n| n.arm_position).collect();
        assert!(positions.iter().all(|&p| p == positions[0]));
        let fingers: Vec<u8> = traj.notes.iter().map(|n| n.finger).collect();
        assert_eq!(fingers, vec![1, 2, 3, 4, 5]);
        assert_eq!(traj.move_count, 0);
    }

    // S3 variant: the quadratic distance penalty makes the DP prefer the
    // cheapest reachable position in the next note's window over matching
    // the previous offset, so C4 -> C5 lands on the nearest edge of the
    // window (distance 2) rather than repeating offset 0 (distance 7).
    #[test]
    fn octave_jump_takes_the_cheapest_reachable_position() {
        let notes = [note(60, 0.0, 0.5), note(72, 0.5, 0.5)];
        let (traj, _) = plan(&notes, Hand::Right, PlannerConfig::default()).unwrap();
        assert_eq!(traj.move_count, 1);
        assert_eq!(traj.total_move_distance, 2);
        assert_eq!(traj.notes[0].finger, 1);
        assert_eq!(traj.notes[1].arm_position, 26);
    }

    // S4
    #[test]
    fn short_note_guard_forbids_reposition_or_flags_infeasible() {
        let notes = [note(60, 0.0, 0.1), note(72, 0.1, 0.5)];
        match plan(&notes, Hand::Right, PlannerConfig::default()) {
            Ok((traj, _)) => assert_eq!(traj.notes[0].arm_position, traj.notes[1].arm_position),
            Err(PlannerError::Infeasible(traj)) => assert!(traj.infeasible),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // S5
    #[test]
    fn left_hand_a0_to_b3_spans_extremes() {
        let notes = [note(21, 0.0, 0.5), note(59, 0.5, 0.5)];
        let (traj, _) = plan(&notes, Hand::Left, PlannerConfig::default()).unwrap();
        assert_eq!(traj.notes[0].arm_position, 1);
        assert_eq!(traj.notes[1].arm_position, 19);
        assert_eq!(traj.notes[0].finger, 5);
        assert_eq!(traj.notes[1].finger, 1);
        assert_eq!(traj.total_move_distance, 18);
    }

    // S6: both 46 and 47 cost zero for a lone first note, so the tie-break
    // (smallest position) picks 46 deterministically.
    #[test]
    fn b7_forces_pinky_at_46_or_47() {
        let (traj, _) = plan(&[note(107, 0.0, 0.5)], Hand::Right, PlannerConfig::default()).unwrap();
        let n = &traj.notes[0];
        assert!(n.arm_position == 46 || n.arm_position == 47);
        assert_eq!(n.finger, 5);
        assert_eq!(n.arm_position, 46);
        assert_eq!(n.pinky_key_type, PinkyKeyType::Extended);
    }

    // S7
    #[test]
    fn csharp4_uses_black_key_rule() {
        let (traj, _) = plan(&[note(61, 0.0, 0.5)], Hand::Right, PlannerConfig::default()).unwrap();
        assert_eq!(traj.notes[0].finger, 2);
        assert_eq!(traj.notes[0].white_key_index, white_key_index(60));
    }

    #[test]
    fn empty_input_yields_empty_trajectory() {
        let (traj, report) = plan(&[], Hand::Right, PlannerConfig::default()).unwrap();
        assert!(traj.notes.is_empty());
        assert!(report.filtered.is_empty());
        assert!(!traj.infeasible);
    }

    #[test]
    fn all_out_of_range_notes_are_filtered_not_errored() {
        let (traj, report) = plan(&[note(30, 0.0, 1.0)], Hand::Right, PlannerConfig::default()).unwrap();
        assert!(traj.notes.is_empty());
        assert_eq!(report.filtered.len(), 1);
    }

    #[test]
    fn left_hand_black_key_rules() {
        let cfg = PlannerConfig::default();
        let cases = [(22u8, 4u8), (25, 3), (27, 2), (30, 4), (32, 3), (34, 2)];
        for (semitone, expected_finger) in cases {
            let (traj, _) = plan(&[note(semitone, 0.0, 0.5)], Hand::Left, cfg).unwrap();
            assert_eq!(
                traj.notes[0].finger, expected_finger,
                "semitone {semitone} expected finger {expected_finger}"
            );
        }
    }

    #[test]
    fn move_distance_matches_emitted_positions() {
        let notes = [
            note(60, 0.0, 0.5),
            note(65, 0.5, 0.5),
            note(62, 1.0, 0.5),
            note(72, 1.5, 0.5),
        ];
        let (traj, _) = plan(&notes, Hand::Right, PlannerConfig::default()).unwrap();
        let mut expected = 0u32;
        for w in traj.notes.windows(2) {
            expected += (w[1].arm_position as i32 - w[0].arm_position as i32).unsigned_abs();
        }
        assert_eq!(traj.total_move_distance, expected);
    }
}

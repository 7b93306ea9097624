//! Output serialisation for the planner artifact contract (spec.md §6):
//! `{song}_{hand}_hand_fingering.json`, the matching `.txt` table, and the
//! combined `{song}_summary.txt`. Field names are part of the stable
//! contract and must not be renamed.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::note::{semitone_to_string, Hand};
use crate::planner::{PinkyKeyType, PlannedNote, Trajectory};

/// The machine-readable per-hand artifact (`{song}_{hand}_hand_fingering.json`).
#[derive(Debug, Serialize)]
pub struct FingeringReport<'a> {
    pub song_name: &'a str,
    pub hand: Hand,
    pub notes_count: usize,
    pub original_notes_count: usize,
    pub filtered_count: usize,
    pub move_distance: u32,
    pub move_count: u32,
    pub average_move_distance: f64,
    pub pinky_normal_count: usize,
    pub pinky_extended_count: usize,
    pub fingering_data: &'a [PlannedNote],
}

impl<'a> FingeringReport<'a> {
    pub fn new(song_name: &'a str, trajectory: &'a Trajectory, original_notes_count: usize, filtered_count: usize) -> Self {
        let pinky_extended_count = trajectory
            .notes
            .iter()
            .filter(|n| n.pinky_key_type == PinkyKeyType::Extended)
            .count();
        let pinky_normal_count = trajectory
            .notes
            .iter()
            .filter(|n| n.finger == 5 && n.pinky_key_type == PinkyKeyType::Normal)
            .count();
        let average_move_distance = if trajectory.move_count > 0 {
            trajectory.total_move_distance as f64 / trajectory.move_count as f64
        } else {
            0.0
        };
        Self {
            song_name,
            hand: trajectory.hand,
            notes_count: trajectory.notes.len(),
            original_notes_count,
            filtered_count,
            move_distance: trajectory.total_move_distance,
            move_count: trajectory.move_count,
            average_move_distance,
            pinky_normal_count,
            pinky_extended_count,
            fingering_data: &trajectory.notes,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_table(&self) -> String {
        let mut out = String::new();
        out.push_str("#\tnote\twhite_key\tarm_pos\tfinger\tpinky\tstart\tduration\tend\tvelocity\thand\n");
        for (i, n) in self.fingering_data.iter().enumerate() {
            let pinky = if n.finger == 5 {
                match n.pinky_key_type {
                    PinkyKeyType::Extended => "extended",
                    PinkyKeyType::Normal => "normal",
                }
            } else {
                "-"
            };
            out.push_str(&format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}s\t{:.2}s\t{:.2}s\t{}\t{:?}\n",
                i + 1,
                semitone_to_string(n.note.semitone),
                n.white_key_index,
                n.arm_position,
                n.finger,
                pinky,
                n.start,
                n.note.duration,
                n.end,
                n.velocity,
                n.hand,
            ));
        }
        out
    }
}

/// Writes `{song}_{hand}_hand_fingering.json` and `.txt` into `output_dir`.
pub fn write_hand_report(output_dir: impl AsRef<Path>, report: &FingeringReport) -> Result<()> {
    let hand_name = match report.hand {
        Hand::Left => "left",
        Hand::Right => "right",
    };
    let base = output_dir.as_ref().join(format!("{}_{hand_name}_hand_fingering", report.song_name));

    let json_path = base.with_extension("json");
    let mut json_file = std::fs::File::create(&json_path)?;
    json_file.write_all(
        report
            .to_json()
            .map_err(|e| crate::error::PlannerError::PreconditionError(e.to_string()))?
            .as_bytes(),
    )?;

    let txt_path = base.with_extension("txt");
    std::fs::write(txt_path, report.to_table())?;

    Ok(())
}

/// Writes `{song}_summary.txt` aggregating both hands.
pub fn write_summary(output_dir: impl AsRef<Path>, song_name: &str, left: Option<&Trajectory>, right: Option<&Trajectory>) -> Result<()> {
    let mut out = format!("Fingering summary for {song_name}\n");
    for (label, traj) in [("left", left), ("right", right)] {
        match traj {
            Some(t) => out.push_str(&format!(
                "{label}: {} notes, {} moves, total distance {}, max move {}, infeasible={}\n",
                t.notes.len(),
                t.move_count,
                t.total_move_distance,
                t.max_move_distance,
                t.infeasible
            )),
            None => out.push_str(&format!("{label}: not planned\n")),
        }
    }
    let path = output_dir.as_ref().join(format!("{song_name}_summary.txt"));
    std::fs::write(path, out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::note::Note;
    use crate::planner::plan;

    #[test]
    fn report_field_names_match_the_contract() {
        let notes = [Note {
            semitone: 60,
            start: 0.0,
            duration: 0.5,
            velocity: 80,
            track: 0,
        }];
        let (trajectory, _) = plan(&notes, Hand::Right, PlannerConfig::default()).unwrap();
        let report = FingeringReport::new("twinkle", &trajectory, 1, 0);
        let json = report.to_json().unwrap();
        for field in [
            "song_name",
            "hand",
            "notes_count",
            "original_notes_count",
            "filtered_count",
            "move_distance",
            "move_count",
            "average_move_distance",
            "pinky_normal_count",
            "pinky_extended_count",
            "fingering_data",
        ] {
            assert!(json.contains(field), "missing field {field} in {json}");
        }
    }

    #[test]
    fn writes_expected_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let notes = [Note {
            semitone: 60,
            start: 0.0,
            duration: 0.5,
            velocity: 80,
            track: 0,
        }];
        let (trajectory, _) = plan(&notes, Hand::Right, PlannerConfig::default()).unwrap();
        let report = FingeringReport::new("twinkle", &trajectory, 1, 0);
        write_hand_report(dir.path(), &report).unwrap();
        assert!(dir.path().join("twinkle_right_hand_fingering.json").exists());
        assert!(dir.path().join("twinkle_right_hand_fingering.txt").exists());
    }
}

//! CLI control surface: `<song_name>` plus the mutually exclusive
//! transpose/filter flags (spec.md §6). Drives C1 -> C2 -> C3 end to end
//! and writes the artifact contract of spec.md §6 via `fingerplan::artifact`.

use std::path::PathBuf;

use clap::Parser;
use fingerplan::artifact::{write_hand_report, write_summary, FingeringReport};
use fingerplan::config::{PlannerConfig, PreprocessConfig, HAND_SPLIT_PITCH};
use fingerplan::error::PlannerError;
use fingerplan::note::Hand;
use fingerplan::planner::plan_both_hands;
use fingerplan::{midi, preprocess};
use log::{error, info, warn};
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};

/// Plans arm positions and fingerings for a piece of music.
#[derive(Parser, Debug)]
#[command(name = "fingerplan", about = "Piano fingering and arm-motion planner")]
struct Cli {
    /// Name of the song; input files are looked up under <base>/<song>/...
    song_name: String,

    /// Base directory songs are looked up under (default: current directory).
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Directory the fingering artifacts are written to.
    #[arg(long = "output_dir", default_value = ".")]
    output_dir: PathBuf,

    /// Step 4: raise every right-hand note by one octave.
    #[arg(long)]
    transpose_right_octave: bool,

    /// Step 3: drop left-hand notes at or below the low-note threshold.
    #[arg(long)]
    filter_left_low_notes: bool,

    /// Step 2: lift low left-hand notes into C3-B3.
    #[arg(long, conflicts_with = "filter_left_low_notes")]
    transpose_left_low_to_range: bool,

    /// Verbose logging (debug level).
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    let _ = TermLogger::init(level, LogConfig::default(), TerminalMode::Mixed, ColorChoice::Auto);
}

fn find_hand_file(song_dir: &std::path::Path, marker: &str) -> Option<PathBuf> {
    std::fs::read_dir(song_dir).ok()?.filter_map(|e| e.ok()).map(|e| e.path()).find(|p| {
        p.extension().map(|ext| ext == "mid").unwrap_or(false)
            && p.file_stem()
                .and_then(|s| s.to_str())
                .map(|s| s.to_lowercase().contains(marker))
                .unwrap_or(false)
    })
}

fn run(cli: &Cli) -> Result<(), PlannerError> {
    let preprocess_config = PreprocessConfig {
        transpose_right_octave: cli.transpose_right_octave,
        filter_left_low_notes: cli.filter_left_low_notes,
        transpose_left_low_to_range: cli.transpose_left_low_to_range,
    };
    preprocess_config.validate()?;

    let song_dir = cli.base_dir.join(&cli.song_name);
    let left_path = find_hand_file(&song_dir, "left");
    let right_path = find_hand_file(&song_dir, "right");

    let (left_notes, right_notes) = match (left_path, right_path) {
        (Some(left_path), Some(right_path)) => {
            info!("reading {} and {}", left_path.display(), right_path.display());
            let left = midi::extract_file(&left_path)?;
            let right = midi::extract_file(&right_path)?;
            (left.notes, right.notes)
        }
        _ => {
            // Fall back to a single untagged file, split at middle C.
            let single = song_dir
                .read_dir()
                .map_err(PlannerError::IoError)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .find(|p| p.extension().map(|ext| ext == "mid").unwrap_or(false))
                .ok_or_else(|| PlannerError::PreconditionError(format!("no .mid files found under {}", song_dir.display())))?;
            info!("reading {}", single.display());
            let extracted = midi::extract_file(&single)?;
            preprocess::split_by_pitch(&extracted.notes, HAND_SPLIT_PITCH)
        }
    };

    let original_left_count = left_notes.len();
    let original_right_count = right_notes.len();

    let left_notes = preprocess::apply(&left_notes, Hand::Left, preprocess_config)?;
    let right_notes = preprocess::apply(&right_notes, Hand::Right, preprocess_config)?;

    let planner_config = PlannerConfig::default();
    let (left_result, right_result) = plan_both_hands(&left_notes, &right_notes, planner_config);

    std::fs::create_dir_all(&cli.output_dir)?;

    let mut left_trajectory = None;
    let mut right_trajectory = None;

    match left_result {
        Ok((trajectory, report)) => {
            let fingering = FingeringReport::new(&cli.song_name, &trajectory, original_left_count, report.filtered.len());
            write_hand_report(&cli.output_dir, &fingering)?;
            left_trajectory = Some(trajectory);
        }
        Err(PlannerError::Infeasible(trajectory)) => {
            warn!("left hand trajectory is infeasible under the short-note guard");
            let fingering = FingeringReport::new(&cli.song_name, &trajectory, original_left_count, 0);
            write_hand_report(&cli.output_dir, &fingering)?;
            left_trajectory = Some(*trajectory);
        }
        Err(e) => return Err(e),
    }

    match right_result {
        Ok((trajectory, report)) => {
            let fingering = FingeringReport::new(&cli.song_name, &trajectory, original_right_count, report.filtered.len());
            write_hand_report(&cli.output_dir, &fingering)?;
            right_trajectory = Some(trajectory);
        }
        Err(PlannerError::Infeasible(trajectory)) => {
            warn!("right hand trajectory is infeasible under the short-note guard");
            let fingering = FingeringReport::new(&cli.song_name, &trajectory, original_right_count, 0);
            write_hand_report(&cli.output_dir, &fingering)?;
            right_trajectory = Some(*trajectory);
        }
        Err(e) => return Err(e),
    }

    write_summary(&cli.output_dir, &cli.song_name, left_trajectory.as_ref(), right_trajectory.as_ref())?;

    info!("wrote fingering artifacts to {}", cli.output_dir.display());
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // anyhow only at this boundary, matching `twitchax-kord`'s `bin.rs`;
    // everything below `run` stays on the crate's own tagged error type.
    if let Err(e) = run(&cli).map_err(anyhow::Error::from) {
        error!("{e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

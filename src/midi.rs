//! C1 — Note Extractor.
//!
//! Parses a standard MIDI file into a time-sorted list of [`Note`] events,
//! plus the tempo/controller/pedal side artifacts spec.md §4.1 describes.
//! Those side artifacts are never consumed by the planner; they exist so a
//! caller can inspect a piece without re-parsing it.

use std::collections::HashMap;
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};

use crate::error::{PlannerError, Result};
use crate::note::Note;

/// MIDI channel reserved for percussion; excluded from the fingering input.
const PERCUSSION_CHANNEL: u8 = 9;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ControlEvent {
    pub track: usize,
    pub channel: u8,
    pub time_sec: f64,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TempoChange {
    pub track: usize,
    pub time_sec: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TimeSignatureChange {
    pub track: usize,
    pub time_sec: f64,
    pub numerator: u8,
    pub denominator: u8,
}

/// Controller/pedal events collected alongside the note stream, not
/// consumed by the planner (spec.md §4.1; supplemented per SPEC_FULL.md §9
/// from the original's `control_events` dict).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ControlEvents {
    pub sustain: Vec<ControlEvent>,
    pub sostenuto: Vec<ControlEvent>,
    pub soft: Vec<ControlEvent>,
    pub volume: Vec<ControlEvent>,
    pub expression: Vec<ControlEvent>,
    pub pan: Vec<ControlEvent>,
    pub modulation: Vec<ControlEvent>,
    pub pitch_bend: Vec<ControlEvent>,
    pub tempo_changes: Vec<TempoChange>,
    pub time_signature_changes: Vec<TimeSignatureChange>,
}

/// The result of extracting a MIDI file: the note stream plus side artifacts.
#[derive(Debug, Clone)]
pub struct ExtractedMidi {
    pub notes: Vec<Note>,
    pub controls: ControlEvents,
    /// Tempo in beats per minute, taken from the first `set_tempo` meta
    /// event (or 120.0 if the file has none).
    pub initial_tempo_bpm: f64,
    pub ticks_per_beat: u16,
    pub track_count: usize,
}

const SUSTAIN_PEDAL: u8 = 64;
const SOSTENUTO_PEDAL: u8 = 66;
const SOFT_PEDAL: u8 = 67;
const VOLUME_CONTROL: u8 = 7;
const EXPRESSION_CONTROL: u8 = 11;
const PAN_CONTROL: u8 = 10;
const MODULATION: u8 = 1;

struct PendingNote {
    start_tick: u32,
    velocity: u8,
}

/// Parses a MIDI file from disk.
pub fn extract_file(path: impl AsRef<Path>) -> Result<ExtractedMidi> {
    let bytes = std::fs::read(path)?;
    extract(&bytes)
}

/// Parses MIDI bytes already read into memory.
pub fn extract(bytes: &[u8]) -> Result<ExtractedMidi> {
    let smf = Smf::parse(bytes).map_err(|e| PlannerError::ParseError {
        track: 0,
        tick: 0,
        reason: e.to_string(),
    })?;

    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => tpb.as_int(),
        Timing::Timecode(..) => {
            return Err(PlannerError::ParseError {
                track: 0,
                tick: 0,
                reason: "SMPTE timecode timing is not supported".to_string(),
            })
        }
    };

    let initial_tempo_bpm = first_tempo_bpm(&smf);
    let seconds_per_tick = 60.0 / initial_tempo_bpm / ticks_per_beat as f64;

    let mut notes = Vec::new();
    let mut controls = ControlEvents::default();
    // Keyed by (pitch, channel); each note_on pushes, each matching
    // note_off/zero-velocity note_on pops the earliest pending entry.
    let mut pending: HashMap<(u8, u8), Vec<PendingNote>> = HashMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick: u32 = 0;
        for event in track {
            tick = tick.saturating_add(event.delta.as_int());
            let time_sec = tick as f64 * seconds_per_tick;

            match event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            pending.entry((key.as_int(), channel)).or_default().push(
                                PendingNote {
                                    start_tick: tick,
                                    velocity: vel.as_int(),
                                },
                            );
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            if let Some(list) = pending.get_mut(&(key.as_int(), channel)) {
                                if !list.is_empty() {
                                    let started = list.remove(0);
                                    let duration_ticks = tick.saturating_sub(started.start_tick);
                                    if duration_ticks > 0 && channel != PERCUSSION_CHANNEL {
                                        notes.push(Note {
                                            semitone: key.as_int(),
                                            start: started.start_tick as f64 * seconds_per_tick,
                                            duration: duration_ticks as f64 * seconds_per_tick,
                                            velocity: started.velocity,
                                            track: track_idx,
                                        });
                                    }
                                }
                            }
                        }
                        MidiMessage::Controller { controller, value } => {
                            let value = value.as_int();
                            let ev = ControlEvent {
                                track: track_idx,
                                channel,
                                time_sec,
                                value,
                            };
                            match controller.as_int() {
                                SUSTAIN_PEDAL => controls.sustain.push(ev),
                                SOSTENUTO_PEDAL => controls.sostenuto.push(ev),
                                SOFT_PEDAL => controls.soft.push(ev),
                                VOLUME_CONTROL => controls.volume.push(ev),
                                EXPRESSION_CONTROL => controls.expression.push(ev),
                                PAN_CONTROL => controls.pan.push(ev),
                                MODULATION => controls.modulation.push(ev),
                                _ => {}
                            }
                        }
                        MidiMessage::PitchBend { bend } => {
                            controls.pitch_bend.push(ControlEvent {
                                track: track_idx,
                                channel,
                                time_sec,
                                value: (bend.as_int().max(0) >> 7) as u8,
                            });
                        }
                        _ => {}
                    }
                }
                TrackEventKind::Meta(MetaMessage::Tempo(t)) => {
                    controls.tempo_changes.push(TempoChange {
                        track: track_idx,
                        time_sec,
                        bpm: 60_000_000.0 / t.as_int() as f64,
                    });
                }
                TrackEventKind::Meta(MetaMessage::TimeSignature(num, denom_pow, _, _)) => {
                    controls.time_signature_changes.push(TimeSignatureChange {
                        track: track_idx,
                        time_sec,
                        numerator: num,
                        denominator: 1u8.wrapping_shl(denom_pow as u32),
                    });
                }
                _ => {}
            }
        }

        for (key, leftover) in pending.iter() {
            for p in leftover {
                log::warn!(
                    "unterminated note_on for pitch {} channel {} at tick {} in track {track_idx}; dropping",
                    key.0, key.1, p.start_tick
                );
            }
        }
        for list in pending.values_mut() {
            list.clear();
        }
    }

    notes.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap());

    Ok(ExtractedMidi {
        notes,
        controls,
        initial_tempo_bpm,
        ticks_per_beat,
        track_count: smf.tracks.len(),
    })
}

fn first_tempo_bpm(smf: &Smf) -> f64 {
    for track in &smf.tracks {
        for event in track {
            if let TrackEventKind::Meta(MetaMessage::Tempo(t)) = event.kind {
                return 60_000_000.0 / t.as_int() as f64;
            }
        }
    }
    120.0
}

//! C4 — Live Capture Channel.
//!
//! Owns one open MIDI input port and forwards note-on/off events as a
//! bounded, drop-newest queue (spec.md §4.4, §5). Grounded on the teacher's
//! `midi_input.rs` (`midir::MidiInput`/`MidiInputConnection`, `Arc<AtomicBool>`
//! control flags) generalised from game-key emulation to the structured
//! event stream spec.md calls for, plus `save_to_midi` and hand-usage
//! statistics from `original_source/src/record/midi_record_intime_v2.py`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::CaptureConfig;
use crate::error::{PlannerError, Result};
use crate::note::semitone_to_string;
use crate::Hand;

const CONTROL_CHANGE_STATUS: u8 = 0xB0;
const PITCH_BEND_STATUS: u8 = 0xE0;
const NOTE_ON_STATUS: u8 = 0x90;
const NOTE_OFF_STATUS: u8 = 0x80;

/// Fixed conversion used by [`save_to_midi`]: 120 BPM, 480 ticks per beat,
/// i.e. 960 ticks per wall-clock second (spec.md §4.4).
const SAVE_TICKS_PER_SECOND: f64 = 960.0;
const SAVE_TICKS_PER_BEAT: u16 = 480;
const SAVE_TEMPO_USEC_PER_BEAT: u32 = 500_000; // 120 BPM

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureAction {
    NoteOn,
    NoteOff,
}

/// A single structured capture event (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureEvent {
    pub action: CaptureAction,
    pub key_name: String,
    pub midi_id: u8,
    /// Seconds elapsed since the capture port was opened.
    pub timestamp: f64,
    pub hand: Hand,
}

impl CaptureEvent {
    /// Renders this event as one `data: ...`-prefixed line for Server-Sent
    /// Events framing (spec.md §6). The HTTP route that would write this to
    /// a response stream is external to this crate.
    pub fn to_sse_line(&self) -> serde_json::Result<String> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

/// Lists available MIDI input ports by name.
pub fn list_ports() -> Result<Vec<String>> {
    let input = MidiInput::new("fingerplan-capture").map_err(|e| {
        PlannerError::PreconditionError(format!("failed to initialise MIDI input: {e}"))
    })?;
    Ok(input
        .ports()
        .iter()
        .map(|p| input.port_name(p).unwrap_or_else(|_| "unknown port".to_string()))
        .collect())
}

struct ActiveNote {
    #[allow(dead_code)]
    velocity: u8,
    #[allow(dead_code)]
    opened_at: Instant,
}

/// A running capture session.
pub struct CaptureHandle {
    connection: MidiInputConnection<()>,
    stop: Arc<AtomicBool>,
    shutdown_grace: std::time::Duration,
}

impl CaptureHandle {
    /// Signals the producer to stop, then force-closes the port, blocking
    /// for at most the configured grace period (spec.md §5,
    /// "the producer drains within a bounded grace period (<=2s) and then
    /// the port is force-closed"). `midir` closes its callback thread
    /// synchronously, so the grace period here bounds how long a
    /// still-in-flight callback is allowed to finish before this call
    /// returns regardless.
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        let (tx, rx) = std::sync::mpsc::channel();
        let grace = self.shutdown_grace;
        let connection = self.connection;
        std::thread::spawn(move || {
            connection.close();
            let _ = tx.send(());
        });
        let _ = rx.recv_timeout(grace);
    }
}

/// Opens the given MIDI input port and starts forwarding note events.
/// Returns a handle to control the session and the receiving end of the
/// bounded, drop-newest event channel.
pub fn start(port_index: usize, config: CaptureConfig) -> Result<(CaptureHandle, mpsc::Receiver<CaptureEvent>)> {
    let input = MidiInput::new("fingerplan-capture").map_err(|e| {
        PlannerError::PreconditionError(format!("failed to initialise MIDI input: {e}"))
    })?;
    let ports = input.ports();
    let port: &MidiInputPort = ports.get(port_index).ok_or_else(|| {
        PlannerError::PreconditionError(format!("no MIDI input port at index {port_index}"))
    })?;

    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_in_callback = Arc::clone(&stop);
    let opened_at = Instant::now();
    let active_notes: Arc<Mutex<HashMap<u8, ActiveNote>>> = Arc::new(Mutex::new(HashMap::new()));
    let split_pitch = config.split_pitch;

    let connection = input
        .connect(
            port,
            "fingerplan-capture-in",
            move |_stamp, message, _| {
                if stop_in_callback.load(Ordering::SeqCst) {
                    return;
                }
                handle_message(message, opened_at, split_pitch, &active_notes, &tx);
            },
            (),
        )
        .map_err(|e| PlannerError::PreconditionError(format!("failed to open MIDI port: {e}")))?;

    Ok((
        CaptureHandle {
            connection,
            stop,
            shutdown_grace: std::time::Duration::from_millis(config.shutdown_grace_ms),
        },
        rx,
    ))
}

/// Polls the capture channel with a short timeout so the calling task can
/// observe client disconnection instead of blocking indefinitely
/// (spec.md §5, "reads are non-blocking with a short timeout (~1s)").
/// Returns `None` both on timeout and on channel closure.
pub async fn recv_with_timeout(rx: &mut mpsc::Receiver<CaptureEvent>, config: CaptureConfig) -> Option<CaptureEvent> {
    tokio::time::timeout(std::time::Duration::from_millis(config.poll_timeout_ms), rx.recv())
        .await
        .ok()
        .flatten()
}

fn handle_message(
    message: &[u8],
    opened_at: Instant,
    split_pitch: u8,
    active_notes: &Arc<Mutex<HashMap<u8, ActiveNote>>>,
    tx: &mpsc::Sender<CaptureEvent>,
) {
    if message.len() < 2 {
        return;
    }
    let status = message[0] & 0xF0;
    let timestamp = opened_at.elapsed().as_secs_f64();

    match status {
        s if s == NOTE_ON_STATUS && message.len() >= 3 && message[2] > 0 => {
            let pitch = message[1];
            let velocity = message[2];
            let hand = if pitch < split_pitch { Hand::Left } else { Hand::Right };
            active_notes.lock().unwrap().insert(
                pitch,
                ActiveNote {
                    velocity,
                    opened_at: Instant::now(),
                },
            );
            emit(tx, CaptureAction::NoteOn, pitch, timestamp, hand);
        }
        s if s == NOTE_OFF_STATUS || (s == NOTE_ON_STATUS && message.len() >= 3 && message[2] == 0) => {
            let pitch = message[1];
            let mut active = active_notes.lock().unwrap();
            if active.remove(&pitch).is_some() {
                let hand = if pitch < split_pitch { Hand::Left } else { Hand::Right };
                drop(active);
                emit(tx, CaptureAction::NoteOff, pitch, timestamp, hand);
            }
        }
        s if s == CONTROL_CHANGE_STATUS => {
            log::debug!("control change {:?} at {timestamp:.3}s (not enqueued)", message);
        }
        s if s == PITCH_BEND_STATUS => {
            log::debug!("pitch bend {:?} at {timestamp:.3}s (not enqueued)", message);
        }
        _ => {}
    }
}

fn emit(tx: &mpsc::Sender<CaptureEvent>, action: CaptureAction, pitch: u8, timestamp: f64, hand: Hand) {
    let event = CaptureEvent {
        action,
        key_name: semitone_to_string(pitch),
        midi_id: pitch,
        timestamp,
        hand,
    };
    // Drop-newest on overflow: never block the producer (spec.md §4.4, §5).
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event) {
        log::warn!("capture queue full, dropping event for pitch {pitch}");
    }
}

/// Hand-usage statistics over a captured event stream, supplemented from
/// `display_hand_statistics` in `midi_record_intime_v2.py`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CaptureStats {
    pub left_note_ons: u32,
    pub right_note_ons: u32,
    pub left_pct: f64,
    pub right_pct: f64,
}

pub fn compute_stats(events: &[CaptureEvent]) -> CaptureStats {
    let mut left = 0u32;
    let mut right = 0u32;
    for event in events {
        if event.action != CaptureAction::NoteOn {
            continue;
        }
        match event.hand {
            Hand::Left => left += 1,
            Hand::Right => right += 1,
        }
    }
    let total = (left + right).max(1) as f64;
    CaptureStats {
        left_note_ons: left,
        right_note_ons: right,
        left_pct: 100.0 * left as f64 / total,
        right_pct: 100.0 * right as f64 / total,
    }
}

/// Serialises a captured event stream back into a standard MIDI file at a
/// fixed 120 BPM / 480 ticks-per-beat convention (spec.md §4.4).
pub fn save_to_midi(events: &[CaptureEvent], path: impl AsRef<std::path::Path>) -> Result<()> {
    use midly::num::{u15, u28, u4, u7};
    use midly::{Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};

    let header = Header::new(midly::Format::SingleTrack, Timing::Metrical(u15::new(SAVE_TICKS_PER_BEAT)));
    let mut track: Track = Vec::new();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(SAVE_TEMPO_USEC_PER_BEAT.into())),
    });

    let mut last_tick: u32 = 0;
    for event in events {
        let tick = (event.timestamp * SAVE_TICKS_PER_SECOND).round() as u32;
        let delta = tick.saturating_sub(last_tick);
        last_tick = tick;
        let message = match event.action {
            CaptureAction::NoteOn => MidiMessage::NoteOn {
                key: u7::new(event.midi_id.min(127)),
                vel: u7::new(64),
            },
            CaptureAction::NoteOff => MidiMessage::NoteOff {
                key: u7::new(event.midi_id.min(127)),
                vel: u7::new(0),
            },
        };
        track.push(TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        });
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header,
        tracks: vec![track],
    };
    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| PlannerError::PreconditionError(format!("failed to encode MIDI output: {e}")))?;
    std::fs::write(path, buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(action: CaptureAction, pitch: u8, t: f64, hand: Hand) -> CaptureEvent {
        CaptureEvent {
            action,
            key_name: semitone_to_string(pitch),
            midi_id: pitch,
            timestamp: t,
            hand,
        }
    }

    #[test]
    fn sse_line_is_data_prefixed_and_blank_line_terminated() {
        let event = ev(CaptureAction::NoteOn, 60, 0.5, Hand::Right);
        let line = event.to_sse_line().unwrap();
        assert!(line.starts_with("data: "));
        assert!(line.ends_with("\n\n"));
        assert!(line.contains("\"midi_id\":60"));
    }

    #[test]
    fn stats_count_note_ons_by_hand() {
        let events = vec![
            ev(CaptureAction::NoteOn, 40, 0.0, Hand::Left),
            ev(CaptureAction::NoteOn, 70, 0.1, Hand::Right),
            ev(CaptureAction::NoteOff, 40, 0.2, Hand::Left),
            ev(CaptureAction::NoteOn, 72, 0.3, Hand::Right),
        ];
        let stats = compute_stats(&events);
        assert_eq!(stats.left_note_ons, 1);
        assert_eq!(stats.right_note_ons, 2);
        assert!((stats.right_pct - (200.0 / 3.0)).abs() < 1e-6);
    }

    #[tokio::test]
    async fn recv_with_timeout_returns_none_when_idle() {
        let (_tx, mut rx) = mpsc::channel::<CaptureEvent>(4);
        let config = CaptureConfig {
            poll_timeout_ms: 20,
            ..CaptureConfig::default()
        };
        assert!(recv_with_timeout(&mut rx, config).await.is_none());
    }

    #[tokio::test]
    async fn recv_with_timeout_returns_queued_event() {
        let (tx, mut rx) = mpsc::channel::<CaptureEvent>(4);
        tx.try_send(ev(CaptureAction::NoteOn, 60, 0.0, Hand::Right)).unwrap();
        let event = recv_with_timeout(&mut rx, CaptureConfig::default()).await.unwrap();
        assert_eq!(event.midi_id, 60);
    }

    #[test]
    fn save_to_midi_round_trips_through_extract() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.mid");
        let events = vec![
            ev(CaptureAction::NoteOn, 60, 0.0, Hand::Right),
            ev(CaptureAction::NoteOff, 60, 0.5, Hand::Right),
        ];
        save_to_midi(&events, &path).unwrap();
        let extracted = crate::midi::extract_file(&path).unwrap();
        assert_eq!(extracted.notes.len(), 1);
        assert_eq!(extracted.notes[0].semitone, 60);
    }
}

// MIDI note timing
// Reads note-on events from a standard MIDI file and places them in seconds

use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{normalize, Alphabet, Category, NormalizeError, RawObservation, Timeline};

/// Tempo assumed before the first tempo event, in microseconds per beat (120 bpm)
pub const DEFAULT_TEMPO: u32 = 500_000;

/// Only the first few tracks carry the notes of a roll scan
const MERGED_TRACKS: usize = 3;

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse MIDI data: {0}")]
    Parse(#[from] midly::Error),

    #[error("SMPTE timecode timing is not supported")]
    UnsupportedTiming,

    #[error("Ticks per beat must be positive")]
    ZeroTicksPerBeat,

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Overrides applied while reading note timings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiTimingOptions {
    /// Replaces the value of every tempo event (microseconds per beat)
    pub tempo_override: Option<u32>,

    /// Replaces the file's ticks per beat
    pub ticks_per_beat_override: Option<u16>,

    /// Fold note numbers onto the 12 pitch classes
    pub pitch_classes: bool,
}

/// Resolution and starting tempo of a MIDI file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiSpeed {
    pub ticks_per_beat: u16,

    /// First tempo event in the merged tracks, if any
    pub first_tempo: Option<u32>,
}

/// Merged events as (absolute tick, kind), stable in track order per tick
fn merged_events<'a>(smf: &'a Smf<'a>) -> Vec<(u64, TrackEventKind<'a>)> {
    let tracks = if smf.tracks.len() > MERGED_TRACKS {
        &smf.tracks[..MERGED_TRACKS]
    } else {
        &smf.tracks[..]
    };

    let mut merged = Vec::new();
    for track in tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            merged.push((tick, event.kind));
        }
    }
    merged.sort_by_key(|(tick, _)| *tick);
    merged
}

fn metrical_ticks(smf: &Smf) -> Result<u16, MidiError> {
    match smf.header.timing {
        Timing::Metrical(tpb) => Ok(tpb.as_int()),
        Timing::Timecode(..) => Err(MidiError::UnsupportedTiming),
    }
}

/// Report ticks per beat and the first tempo of a MIDI file
pub fn read_midi_speed(bytes: &[u8]) -> Result<MidiSpeed, MidiError> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_beat = metrical_ticks(&smf)?;

    let first_tempo = merged_events(&smf).into_iter().find_map(|(_, kind)| match kind {
        TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => Some(tempo.as_int()),
        _ => None,
    });

    Ok(MidiSpeed {
        ticks_per_beat,
        first_tempo,
    })
}

/// Read note-on events as a timeline
///
/// Tempo changes are integrated into a running seconds offset, so each note
/// gets the wall-clock time it would sound at. A note-on with velocity 0 is
/// a note-off and is skipped.
pub fn read_timeline(
    bytes: &[u8],
    options: &MidiTimingOptions,
    label: impl Into<String>,
) -> Result<Timeline, MidiError> {
    let label = label.into();
    let smf = Smf::parse(bytes)?;

    let ticks_per_beat = match options.ticks_per_beat_override {
        Some(tpb) => tpb,
        None => metrical_ticks(&smf)?,
    };
    if ticks_per_beat == 0 {
        return Err(MidiError::ZeroTicksPerBeat);
    }

    log::info!(
        "Reading note timings for {} ({} tracks, {} ticks per beat)",
        label,
        smf.tracks.len(),
        ticks_per_beat
    );

    let to_seconds =
        |ticks: u64, tempo: u32| (ticks as f64 * tempo as f64) / (ticks_per_beat as f64 * 1_000_000.0);

    let mut tempo = options.tempo_override.unwrap_or(DEFAULT_TEMPO);
    let mut tempo_start_tick = 0u64;
    let mut seconds_before_tempo = 0.0;
    let mut last_tick = 0u64;
    let mut observations = Vec::new();

    for (tick, kind) in merged_events(&smf) {
        last_tick = tick;
        match kind {
            TrackEventKind::Meta(MetaMessage::Tempo(value)) => {
                let value = value.as_int();
                let new_tempo = options.tempo_override.unwrap_or(value);
                log::info!(
                    "Tempo at tick {}: {} us per beat ({:.2} bpm)",
                    tick,
                    new_tempo,
                    60_000_000.0 / new_tempo as f64
                );

                seconds_before_tempo += to_seconds(tick - tempo_start_tick, tempo);
                tempo = new_tempo;
                tempo_start_tick = tick;
            }
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, vel },
                ..
            } if vel.as_int() > 0 => {
                let time = seconds_before_tempo + to_seconds(tick - tempo_start_tick, tempo);
                let note = key.as_int() as Category;
                let category = if options.pitch_classes { note % 12 } else { note };
                observations.push(RawObservation::new(category, tick, time));
            }
            _ => {}
        }
    }

    log::info!(
        "{}: {} note-on events, last event at tick {}",
        label,
        observations.len(),
        last_tick
    );

    let alphabet = if options.pitch_classes {
        Alphabet::PITCH_CLASS
    } else {
        Alphabet::MIDI_NOTE
    };

    Ok(normalize(observations, alphabet, label)?)
}

/// Read a MIDI file from disk as a timeline labelled with its path
pub fn read_timeline_file(path: &Path, options: &MidiTimingOptions) -> Result<Timeline, MidiError> {
    let bytes = std::fs::read(path)?;
    read_timeline(&bytes, options, path.display().to_string())
}

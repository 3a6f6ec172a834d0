// MIDI module
// Note timings from standard MIDI files, with tempo and resolution overrides

pub mod timing;

pub use timing::{
    read_midi_speed, read_timeline, read_timeline_file, MidiError, MidiSpeed, MidiTimingOptions,
    DEFAULT_TEMPO,
};

/// stepseq - a step-sequencer transport and note-scheduling engine
///
/// This library provides:
/// - A fixed-size note pattern (grid, single-note pads or chord pads)
/// - A sixteenth-note transport with drift-free additive scheduling
/// - An arpeggiator running on its own clock
/// - Monophonic (legato) and fixed-pool polyphonic voice allocation
/// - Audio output through cpal and MIDI output through midir
/// - A playback thread that owns the engine and talks to the UI over channels

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod pitch;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{AudioOutput, SilentTone, ToneGenerator, Waveform};
pub use config::{EnvelopeSettings, SequencerConfig, VoicePolicy};
pub use error::{MidiError, ToneGeneratorError};
pub use midi::MidiOutputDevice;
pub use pitch::{midi_note_name, midi_to_frequency, ChordQuality, Key, MidiNote, PitchMap};
pub use sequencer::arpeggiator::{ArpPattern, ArpState};
pub use sequencer::playback::{Command, PlaybackEngine, PlaybackEvent};
pub use sequencer::sequence::{Sequence, SequenceLayout};
pub use sequencer::transport::{step_duration, TransportState};
pub use sequencer::voice::{CommandSource, EnvelopeState, VoiceCommand};
pub use sequencer::Sequencer;

/// Engine configuration with validated defaults
use crate::audio::Waveform;
use crate::pitch::{ChordQuality, Key, MidiNote, DEFAULT_ROW_NOTES};
use crate::sequencer::arpeggiator::ArpPattern;
use crate::sequencer::sequence::SequenceLayout;
use crate::sequencer::transport::MIN_BPM;

/// Largest voice pool a polyphonic allocator may use.
pub const MAX_POLYPHONY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoicePolicy {
    /// One voice, highest note wins, legato glide between notes.
    Monophonic,
    /// Fixed pool, note i goes to voice i, extra notes are dropped.
    Polyphonic { voices: usize },
}

impl VoicePolicy {
    pub fn pool_size(self) -> usize {
        match self {
            VoicePolicy::Monophonic => 1,
            VoicePolicy::Polyphonic { voices } => voices.clamp(1, MAX_POLYPHONY),
        }
    }
}

impl Default for VoicePolicy {
    fn default() -> Self {
        VoicePolicy::Monophonic
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSettings {
    pub attack_secs: f32,
    pub release_secs: f32,
    /// Used by stop and other hard cuts.
    pub fast_release_secs: f32,
    pub glide_secs: f32,
    pub level: f32,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            attack_secs: 0.005,
            release_secs: 0.1,
            fast_release_secs: 0.005,
            glide_secs: 0.05,
            level: 0.8,
        }
    }
}

impl EnvelopeSettings {
    pub fn validated(self) -> Self {
        let release_secs = non_negative(self.release_secs);
        Self {
            attack_secs: non_negative(self.attack_secs),
            release_secs,
            fast_release_secs: non_negative(self.fast_release_secs).min(release_secs),
            glide_secs: non_negative(self.glide_secs),
            level: if self.level.is_nan() {
                0.0
            } else {
                self.level.clamp(0.0, 1.0)
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    pub step_count: usize,
    /// MIDI notes of the grid rows, top row first.
    pub row_notes: Vec<MidiNote>,
    /// Scale-degree pads available in chord layout.
    pub chord_pads: usize,
    pub layout: SequenceLayout,
    pub voice_policy: VoicePolicy,
    pub tempo_bpm: f32,
    pub min_tempo: f32,
    pub max_tempo: f32,
    pub transpose: i32,
    pub max_transpose: i32,
    pub key: Key,
    pub chord_quality: ChordQuality,
    pub arp_pattern: ArpPattern,
    pub waveform: Waveform,
    pub envelope: EnvelopeSettings,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            step_count: 16,
            row_notes: DEFAULT_ROW_NOTES.to_vec(),
            chord_pads: 8,
            layout: SequenceLayout::Grid,
            voice_policy: VoicePolicy::Monophonic,
            tempo_bpm: 120.0,
            min_tempo: 40.0,
            max_tempo: 240.0,
            transpose: 0,
            max_transpose: 24,
            key: Key::C,
            chord_quality: ChordQuality::Major,
            arp_pattern: ArpPattern::default(),
            waveform: Waveform::Sawtooth,
            envelope: EnvelopeSettings::default(),
        }
    }
}

impl SequencerConfig {
    /// Clamp every field into range. Never fails.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        self.step_count = self.step_count.max(1);
        if self.row_notes.is_empty() {
            self.row_notes = defaults.row_notes;
        }
        self.chord_pads = self.chord_pads.max(1);
        self.voice_policy = match self.voice_policy {
            VoicePolicy::Monophonic => VoicePolicy::Monophonic,
            VoicePolicy::Polyphonic { voices } => VoicePolicy::Polyphonic {
                voices: voices.clamp(1, MAX_POLYPHONY),
            },
        };

        if !self.min_tempo.is_finite() {
            self.min_tempo = defaults.min_tempo;
        }
        self.min_tempo = self.min_tempo.max(MIN_BPM);
        if !(self.max_tempo.is_finite() && self.max_tempo >= self.min_tempo) {
            self.max_tempo = self.min_tempo.max(defaults.max_tempo);
        }
        self.tempo_bpm = self.clamp_tempo(self.tempo_bpm);

        self.max_transpose = self.max_transpose.abs();
        self.transpose = self.clamp_transpose(self.transpose);
        self.envelope = self.envelope.validated();
        self
    }

    /// Rows per step for the configured layout.
    pub fn rows(&self) -> usize {
        match self.layout {
            SequenceLayout::Grid | SequenceLayout::Pad => self.row_notes.len().max(1),
            SequenceLayout::Chord => self.chord_pads.max(1),
        }
    }

    pub fn clamp_tempo(&self, bpm: f32) -> f32 {
        if bpm.is_nan() {
            return self.min_tempo;
        }
        bpm.clamp(self.min_tempo, self.max_tempo)
    }

    pub fn clamp_transpose(&self, semitones: i32) -> i32 {
        semitones.clamp(-self.max_transpose, self.max_transpose)
    }
}

fn non_negative(secs: f32) -> f32 {
    if secs.is_finite() {
        secs.max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SequencerConfig::default();
        assert_eq!(config.clone().validated(), config);
        assert_eq!(config.rows(), 12);
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = SequencerConfig {
            step_count: 0,
            row_notes: Vec::new(),
            voice_policy: VoicePolicy::Polyphonic { voices: 32 },
            tempo_bpm: 900.0,
            transpose: -100,
            envelope: EnvelopeSettings {
                attack_secs: -1.0,
                release_secs: 0.2,
                fast_release_secs: 5.0,
                glide_secs: f32::NAN,
                level: 3.0,
            },
            ..SequencerConfig::default()
        }
        .validated();

        assert_eq!(config.step_count, 1);
        assert_eq!(config.row_notes.len(), 12);
        assert_eq!(config.voice_policy.pool_size(), MAX_POLYPHONY);
        assert_eq!(config.tempo_bpm, 240.0);
        assert_eq!(config.transpose, -24);
        assert_eq!(config.envelope.attack_secs, 0.0);
        assert_eq!(config.envelope.fast_release_secs, 0.2);
        assert_eq!(config.envelope.glide_secs, 0.0);
        assert_eq!(config.envelope.level, 1.0);
    }

    #[test]
    fn test_chord_layout_rows() {
        let config = SequencerConfig {
            layout: SequenceLayout::Chord,
            ..SequencerConfig::default()
        };
        assert_eq!(config.rows(), 8);
    }

    #[test]
    fn test_tiny_min_tempo_is_floored() {
        let config = SequencerConfig {
            min_tempo: 1e-30,
            tempo_bpm: 0.0,
            ..SequencerConfig::default()
        }
        .validated();
        assert_eq!(config.min_tempo, MIN_BPM);
        assert_eq!(config.tempo_bpm, MIN_BPM);
        assert_eq!(config.clamp_tempo(-5.0), MIN_BPM);
    }

    #[test]
    fn test_nan_tempo() {
        let config = SequencerConfig::default();
        assert_eq!(config.clamp_tempo(f32::NAN), 40.0);
    }
}

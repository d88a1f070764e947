/// Voice allocation over a fixed pool of tone generators
///
/// The allocator is the only writer of voice state. Transport, arpeggiator and UI all
/// talk to it through [`VoiceCommand`]s, applied in queue order, so when two commands
/// land in the same instant the later one decides what sounds.
use std::time::Duration;

use crate::audio::{SilentTone, ToneGenerator, Waveform};
use crate::config::{EnvelopeSettings, VoicePolicy};
use crate::pitch::{midi_to_frequency, MidiNote};

pub type VoiceId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    Idle,
    Attacking,
    Sustaining,
    Releasing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: VoiceId,
    pub note: Option<MidiNote>,
    pub frequency: f32,
    pub envelope: EnvelopeState,
    /// When the current attack or release finishes.
    phase_ends: Duration,
}

impl Voice {
    fn new(id: VoiceId) -> Self {
        Self {
            id,
            note: None,
            frequency: 0.0,
            envelope: EnvelopeState::Idle,
            phase_ends: Duration::ZERO,
        }
    }

    /// Attacking or sustaining.
    pub fn is_sounding(&self) -> bool {
        matches!(
            self.envelope,
            EnvelopeState::Attacking | EnvelopeState::Sustaining
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    Ui,
    Transport,
    Arpeggiator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Play a set of notes according to the allocation policy.
    Play(Vec<MidiNote>),
    /// Play one note on voice 0 with legato glide, whatever the policy.
    Legato(MidiNote),
    /// Normal release of every sounding voice.
    Release,
    /// Silence everything, `fast` for a near-instant cut.
    AllOff { fast: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    NoteOn {
        voice: VoiceId,
        note: MidiNote,
        /// Retuned a sounding voice instead of restarting its envelope.
        legato: bool,
        /// Note the voice was sounding before, if any.
        previous: Option<MidiNote>,
    },
    NoteOff {
        voice: VoiceId,
        note: MidiNote,
    },
}

/// Result of a polyphonic note-on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    pub voices: Vec<(VoiceId, MidiNote)>,
    pub dropped: Vec<MidiNote>,
}

pub struct VoiceAllocator {
    policy: VoicePolicy,
    envelope: EnvelopeSettings,
    waveform: Waveform,
    voices: Vec<Voice>,
    tones: Vec<Box<dyn ToneGenerator>>,
    events: Vec<VoiceEvent>,
}

impl VoiceAllocator {
    /// Missing tone generators are filled with [`SilentTone`]s; extra ones are unused.
    pub fn new(
        policy: VoicePolicy,
        envelope: EnvelopeSettings,
        waveform: Waveform,
        mut tones: Vec<Box<dyn ToneGenerator>>,
    ) -> Self {
        let pool = policy.pool_size();
        if tones.len() < pool {
            log::debug!(
                "{} tone generator(s) for {} voice(s), padding with silent tones",
                tones.len(),
                pool
            );
        }
        tones.truncate(pool);
        while tones.len() < pool {
            tones.push(Box::new(SilentTone::default()));
        }

        Self {
            policy,
            envelope,
            waveform,
            voices: (0..pool).map(Voice::new).collect(),
            tones,
            events: Vec::new(),
        }
    }

    pub fn policy(&self) -> VoicePolicy {
        self.policy
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn active_voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter().filter(|v| v.is_sounding())
    }

    pub fn envelope(&self) -> EnvelopeSettings {
        self.envelope
    }

    pub fn set_glide(&mut self, glide_secs: f32) {
        self.envelope.glide_secs = glide_secs;
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Applies on the next triggered note.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    pub fn take_events(&mut self) -> Vec<VoiceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn apply(&mut self, command: VoiceCommand, now: Duration) {
        match command {
            VoiceCommand::Play(notes) => {
                self.note_on(&notes, now);
            }
            VoiceCommand::Legato(note) => self.legato_note_on(note, now),
            VoiceCommand::Release => self.note_off(now),
            VoiceCommand::AllOff { fast } => self.all_notes_off(fast, now),
        }
    }

    /// Monophonic: the highest note wins and glides from whatever is sounding.
    /// Polyphonic: note i goes to voice i; notes past the pool are dropped and
    /// voices past the note count are released.
    pub fn note_on(&mut self, notes: &[MidiNote], now: Duration) -> Assignment {
        match self.policy {
            VoicePolicy::Monophonic => match notes.iter().copied().max() {
                Some(note) => {
                    self.legato_note_on(note, now);
                    Assignment {
                        voices: vec![(0, note)],
                        dropped: notes.iter().copied().filter(|&n| n != note).collect(),
                    }
                }
                None => {
                    self.note_off(now);
                    Assignment::default()
                }
            },
            VoicePolicy::Polyphonic { .. } => self.poly_note_on(notes, now),
        }
    }

    fn poly_note_on(&mut self, notes: &[MidiNote], now: Duration) -> Assignment {
        let pool = self.voices.len();
        let count = notes.len().min(pool);
        let dropped = notes[count..].to_vec();
        if !dropped.is_empty() {
            log::debug!("dropping {} note(s) beyond {} voices", dropped.len(), pool);
        }

        let sounding = self.voices.iter().filter(|v| v.is_sounding()).count();
        let retune = count > 0 && sounding == count;

        let mut voices = Vec::with_capacity(count);
        for (id, &note) in notes.iter().take(count).enumerate() {
            if retune && self.voices[id].is_sounding() {
                self.glide(id, note);
            } else {
                self.trigger(id, note, now);
            }
            voices.push((id, note));
        }
        for id in count..pool {
            self.release_voice(id, self.envelope.release_secs, now);
        }

        Assignment { voices, dropped }
    }

    /// Single note on voice 0 without restarting a sounding envelope.
    pub fn legato_note_on(&mut self, note: MidiNote, now: Duration) {
        if self.voices[0].is_sounding() {
            self.glide(0, note);
        } else {
            self.trigger(0, note, now);
        }
        for id in 1..self.voices.len() {
            self.release_voice(id, self.envelope.release_secs, now);
        }
    }

    /// Release every sounding voice. No-op when nothing sounds.
    pub fn note_off(&mut self, now: Duration) {
        for id in 0..self.voices.len() {
            self.release_voice(id, self.envelope.release_secs, now);
        }
    }

    /// Silence all voices. `fast` cuts with the short release, also shortening
    /// voices already fading out.
    pub fn all_notes_off(&mut self, fast: bool, now: Duration) {
        let ramp = if fast {
            self.envelope.fast_release_secs
        } else {
            self.envelope.release_secs
        };
        for id in 0..self.voices.len() {
            if fast && self.voices[id].envelope == EnvelopeState::Releasing {
                self.tones[id].set_amplitude(0.0, ramp);
                let ends = now + secs(ramp);
                if ends < self.voices[id].phase_ends {
                    self.voices[id].phase_ends = ends;
                }
            } else {
                self.release_voice(id, ramp, now);
            }
        }
    }

    /// Advance envelope phases whose time is up.
    pub fn update(&mut self, now: Duration) {
        for voice in &mut self.voices {
            if now < voice.phase_ends {
                continue;
            }
            match voice.envelope {
                EnvelopeState::Attacking => voice.envelope = EnvelopeState::Sustaining,
                EnvelopeState::Releasing => {
                    voice.envelope = EnvelopeState::Idle;
                    voice.note = None;
                }
                EnvelopeState::Idle | EnvelopeState::Sustaining => {}
            }
        }
    }

    fn trigger(&mut self, id: VoiceId, note: MidiNote, now: Duration) {
        let previous = self.voices[id].note.filter(|_| self.voices[id].is_sounding());
        if let Some(old) = previous {
            // stolen
            self.events.push(VoiceEvent::NoteOff {
                voice: id,
                note: old,
            });
        }

        let tone = &mut self.tones[id];
        if tone.waveform() != self.waveform {
            tone.set_waveform(self.waveform);
        }
        let hz = midi_to_frequency(note);
        tone.set_frequency(hz, 0.0);
        tone.set_amplitude(self.envelope.level, self.envelope.attack_secs);

        let voice = &mut self.voices[id];
        voice.note = Some(note);
        voice.frequency = hz;
        voice.envelope = EnvelopeState::Attacking;
        voice.phase_ends = now + secs(self.envelope.attack_secs);

        self.events.push(VoiceEvent::NoteOn {
            voice: id,
            note,
            legato: false,
            previous: None,
        });
    }

    fn glide(&mut self, id: VoiceId, note: MidiNote) {
        let hz = midi_to_frequency(note);
        self.tones[id].set_frequency(hz, self.envelope.glide_secs);

        let voice = &mut self.voices[id];
        let previous = voice.note.replace(note);
        voice.frequency = hz;

        self.events.push(VoiceEvent::NoteOn {
            voice: id,
            note,
            legato: true,
            previous,
        });
    }

    fn release_voice(&mut self, id: VoiceId, ramp: f32, now: Duration) {
        if !self.voices[id].is_sounding() {
            return;
        }
        self.tones[id].set_amplitude(0.0, ramp);

        let voice = &mut self.voices[id];
        voice.envelope = EnvelopeState::Releasing;
        voice.phase_ends = now + secs(ramp);
        if let Some(note) = voice.note {
            self.events.push(VoiceEvent::NoteOff { voice: id, note });
        }
    }
}

fn secs(value: f32) -> Duration {
    Duration::from_secs_f32(value.max(0.0))
}

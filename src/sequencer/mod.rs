/// Core sequencer logic - one owned context for sequence, transport, arpeggiator and voices
///
/// Everything is mutated from a single thread. Transport and arpeggiator are two clocks
/// polled in a fixed order (transport first); each turns its tick into voice commands
/// on a shared queue, and the queue is drained into the allocator in order.
use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::audio::{ToneGenerator, Waveform};
use crate::config::SequencerConfig;
use crate::pitch::{ChordQuality, Key, MidiNote, PitchMap};

pub mod arpeggiator;
pub mod playback;
pub mod sequence;
pub mod transport;
pub mod voice;

use arpeggiator::{ArpPattern, ArpTick, Arpeggiator, HoldSource};
use playback::PlaybackEvent;
use sequence::{Sequence, SequenceLayout, Step};
use transport::Transport;
use voice::{CommandSource, Voice, VoiceAllocator, VoiceCommand};

pub struct Sequencer {
    config: SequencerConfig,
    sequence: Sequence,
    pitch_map: PitchMap,
    transport: Transport,
    arpeggiator: Arpeggiator,
    allocator: VoiceAllocator,
    key: Key,
    transpose: i32,
    chord_quality: ChordQuality,
    held_pad: Option<usize>,
    /// When a previewed cell's note is released.
    audition_ends: Option<Duration>,
    rng: StdRng,
    commands: VecDeque<(CommandSource, VoiceCommand)>,
    events: Vec<PlaybackEvent>,
}

impl Sequencer {
    pub fn new(config: SequencerConfig, tones: Vec<Box<dyn ToneGenerator>>) -> Self {
        let config = config.validated();
        let sequence = Sequence::new(config.layout, config.step_count, config.rows());
        let allocator = VoiceAllocator::new(
            config.voice_policy,
            config.envelope,
            config.waveform,
            tones,
        );

        Self {
            sequence,
            pitch_map: PitchMap::new(config.row_notes.clone()),
            transport: Transport::new(config.step_count, config.tempo_bpm),
            arpeggiator: Arpeggiator::new(config.arp_pattern.clone()),
            allocator,
            key: config.key,
            transpose: config.transpose,
            chord_quality: config.chord_quality,
            held_pad: None,
            audition_ends: None,
            rng: StdRng::from_entropy(),
            commands: VecDeque::new(),
            events: Vec::new(),
            config,
        }
    }

    /// No audio at all; every voice is a silent tone.
    pub fn headless(config: SequencerConfig) -> Self {
        Self::new(config, Vec::new())
    }

    /// Replace the random source, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    pub fn pitch_map(&self) -> &PitchMap {
        &self.pitch_map
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn arpeggiator(&self) -> &Arpeggiator {
        &self.arpeggiator
    }

    pub fn voices(&self) -> &[Voice] {
        self.allocator.voices()
    }

    pub fn is_running(&self) -> bool {
        self.transport.is_running()
    }

    pub fn current_step(&self) -> usize {
        self.transport.current_step()
    }

    pub fn cell_state(&self, step: usize, row: usize) -> bool {
        self.sequence.get(step, row)
    }

    pub fn bpm(&self) -> f32 {
        self.transport.bpm()
    }

    pub fn transpose(&self) -> i32 {
        self.transpose
    }

    pub fn key(&self) -> Key {
        self.key
    }

    pub fn chord_quality(&self) -> ChordQuality {
        self.chord_quality
    }

    pub fn arp_enabled(&self) -> bool {
        self.arpeggiator.is_enabled()
    }

    pub fn held_pad(&self) -> Option<usize> {
        self.held_pad
    }

    // --- sequence editing ---

    pub fn toggle_cell(&mut self, step: usize, row: usize) {
        self.sequence.toggle(step, row);
    }

    /// Column-exclusive edit. While stopped with the arpeggiator off, a cell that turns
    /// on is previewed: its notes play and release once the attack is done.
    pub fn select_cell(&mut self, step: usize, row: usize, now: Duration) {
        self.sequence.select(step, row);
        if self.transport.is_running()
            || self.arpeggiator.is_enabled()
            || self.held_pad.is_some()
            || !self.sequence.get(step, row)
        {
            return;
        }

        let notes = self.resolve_step(step);
        log::debug!("previewing step {} {:?}", step, notes);
        self.commands
            .push_back((CommandSource::Ui, VoiceCommand::Play(notes)));
        self.flush(now);
        let attack = Duration::from_secs_f32(self.allocator.envelope().attack_secs);
        self.audition_ends = Some(now + attack);
    }

    pub fn clear_sequence(&mut self) {
        self.sequence.clear();
    }

    pub fn randomize_sequence(&mut self, density: f32) {
        self.sequence.randomize(density, &mut self.rng);
    }

    // --- settings ---

    /// Clamped to the configured range; applies from the next step boundary.
    pub fn set_tempo(&mut self, bpm: f32) {
        let bpm = self.config.clamp_tempo(bpm);
        self.transport.set_bpm(bpm);
    }

    pub fn set_transpose(&mut self, semitones: i32) {
        self.transpose = self.config.clamp_transpose(semitones);
    }

    pub fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    pub fn set_chord_quality(&mut self, quality: ChordQuality) {
        self.chord_quality = quality;
    }

    pub fn set_arp_pattern(&mut self, pattern: ArpPattern) {
        self.arpeggiator.set_pattern(pattern);
    }

    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.allocator.set_waveform(waveform);
    }

    pub fn set_glide(&mut self, glide_secs: f32) {
        self.allocator.set_glide(glide_secs.max(0.0));
    }

    // --- transport and performance ---

    pub fn start(&mut self, now: Duration) {
        if self.transport.is_running() {
            return;
        }
        self.audition_ends = None;
        self.transport.start(now);
        log::info!("transport started at {:.1} bpm", self.transport.bpm());
        self.events.push(PlaybackEvent::Started);
    }

    /// Stops the clock and cuts every voice before returning.
    pub fn stop(&mut self, now: Duration) {
        if !self.transport.is_running() {
            return;
        }
        self.transport.stop();
        self.arpeggiator.release(HoldSource::Sequence);
        self.commands
            .push_back((CommandSource::Ui, VoiceCommand::AllOff { fast: true }));
        self.flush(now);
        log::info!("transport stopped");
        self.events.push(PlaybackEvent::Stopped);
    }

    pub fn set_arp_mode(&mut self, enabled: bool, now: Duration) {
        if enabled == self.arpeggiator.is_enabled() {
            return;
        }
        self.arpeggiator.set_enabled(enabled);
        log::debug!("arpeggiator {}", if enabled { "on" } else { "off" });

        if enabled {
            if let Some(pad) = self.held_pad {
                let chord = self.resolve_pad(pad);
                self.arpeggiator.hold(chord, HoldSource::Pad(pad), now);
            }
        } else {
            self.commands
                .push_back((CommandSource::Ui, VoiceCommand::AllOff { fast: true }));
        }
        self.flush(now);
    }

    /// Press a pad: arpeggiated when the arpeggiator is on, played directly otherwise.
    pub fn hold_pad(&mut self, pad: usize, now: Duration) {
        let chord = self.resolve_pad(pad);
        let previous = self.held_pad.replace(pad);
        self.audition_ends = None;

        if self.arpeggiator.is_enabled() {
            self.arpeggiator.hold(chord, HoldSource::Pad(pad), now);
        } else {
            if previous.is_some_and(|p| p != pad) {
                self.commands
                    .push_back((CommandSource::Ui, VoiceCommand::AllOff { fast: true }));
            }
            self.commands
                .push_back((CommandSource::Ui, VoiceCommand::Play(chord)));
        }
        self.flush(now);
    }

    pub fn release_pad(&mut self, now: Duration) {
        let Some(pad) = self.held_pad.take() else {
            return;
        };
        let was_arpeggiating = self.arpeggiator.release(HoldSource::Pad(pad));
        if was_arpeggiating || !self.arpeggiator.is_enabled() {
            self.commands
                .push_back((CommandSource::Ui, VoiceCommand::Release));
        }
        self.flush(now);
    }

    /// Queue a voice command to be applied, in order, on the next poll.
    pub fn submit(&mut self, source: CommandSource, command: VoiceCommand) {
        self.commands.push_back((source, command));
    }

    /// Run both clocks, apply their commands and advance voice envelopes.
    /// Safe to call as often as you like; nothing happens before a deadline.
    pub fn poll(&mut self, now: Duration) -> Vec<PlaybackEvent> {
        if self.audition_ends.is_some_and(|ends| now >= ends) {
            self.audition_ends = None;
            self.commands
                .push_back((CommandSource::Ui, VoiceCommand::Release));
        }
        self.tick_transport(now);
        self.tick_arpeggiator(now);
        self.flush(now);
        self.allocator.update(now);
        self.take_events()
    }

    pub fn take_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    /// MIDI notes of a step with the current key and transpose, ascending.
    pub fn resolve_step(&self, step: usize) -> Vec<MidiNote> {
        let mut notes: Vec<MidiNote> = match self.sequence.step(step) {
            Some(Step::Rows(_)) | Some(Step::Pad(_)) => self
                .sequence
                .active_rows(step)
                .into_iter()
                .map(|row| self.pitch_map.row_note(row, self.transpose))
                .collect(),
            Some(Step::Chord(Some(degree))) => {
                self.pitch_map
                    .chord(*degree, self.chord_quality, self.key, self.transpose)
            }
            Some(Step::Chord(None)) | None => Vec::new(),
        };
        notes.sort_unstable();
        notes.dedup();
        notes
    }

    /// Notes a pad plays: one row note, or a chord in chord layout.
    pub fn resolve_pad(&self, pad: usize) -> Vec<MidiNote> {
        match self.sequence.layout() {
            SequenceLayout::Chord => {
                self.pitch_map
                    .chord(pad, self.chord_quality, self.key, self.transpose)
            }
            SequenceLayout::Grid | SequenceLayout::Pad => {
                vec![self.pitch_map.row_note(pad, self.transpose)]
            }
        }
    }

    fn tick_transport(&mut self, now: Duration) {
        let Some(step) = self.transport.tick(now) else {
            return;
        };
        self.events.push(PlaybackEvent::StepAdvanced(step));

        let notes = self.resolve_step(step);
        if self.arpeggiator.is_enabled() {
            if notes.is_empty() {
                self.arpeggiator.release(HoldSource::Sequence);
                // a held pad keeps arpeggiating through empty steps
                if !self.arpeggiator.is_running() {
                    self.commands
                        .push_back((CommandSource::Transport, VoiceCommand::Release));
                    self.events.push(PlaybackEvent::Rest(step));
                }
            } else {
                self.arpeggiator.hold(notes, HoldSource::Sequence, now);
            }
        } else if notes.is_empty() {
            self.commands
                .push_back((CommandSource::Transport, VoiceCommand::Release));
            self.events.push(PlaybackEvent::Rest(step));
        } else {
            self.commands
                .push_back((CommandSource::Transport, VoiceCommand::Play(notes)));
        }
    }

    fn tick_arpeggiator(&mut self, now: Duration) {
        let interval = self.transport.step_duration();
        match self.arpeggiator.tick(now, interval) {
            Some(ArpTick::Note(note)) => self
                .commands
                .push_back((CommandSource::Arpeggiator, VoiceCommand::Legato(note))),
            Some(ArpTick::Silence) => self
                .commands
                .push_back((CommandSource::Arpeggiator, VoiceCommand::Release)),
            None => {}
        }
    }

    fn flush(&mut self, now: Duration) {
        while let Some((source, command)) = self.commands.pop_front() {
            log::trace!("{:?} -> {:?}", source, command);
            self.allocator.apply(command, now);
        }
        self.events
            .extend(self.allocator.take_events().into_iter().map(PlaybackEvent::from));
    }
}

#[cfg(test)]
mod tests {
    use super::voice::EnvelopeState;
    use super::*;
    use crate::config::VoicePolicy;

    const STEP: Duration = Duration::from_millis(125);

    fn grid() -> Sequencer {
        Sequencer::headless(SequencerConfig::default()).with_rng(StdRng::seed_from_u64(1))
    }

    fn note_ons(events: &[PlaybackEvent]) -> Vec<MidiNote> {
        events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::NoteOn { note, .. } => Some(*note),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_grid_step_plays_highest_row_note() {
        let mut seq = grid();
        seq.toggle_cell(0, 11); // C1 = 24
        seq.toggle_cell(0, 4); // G1 = 31
        seq.start(Duration::ZERO);
        let events = seq.poll(Duration::ZERO);

        assert_eq!(events[0], PlaybackEvent::Started);
        assert_eq!(events[1], PlaybackEvent::StepAdvanced(0));
        assert_eq!(note_ons(&events), vec![31]);
        assert_eq!(seq.current_step(), 1);
    }

    #[test]
    fn test_empty_step_rests() {
        let mut seq = grid();
        seq.toggle_cell(0, 0);
        seq.start(Duration::ZERO);
        seq.poll(Duration::ZERO);
        let events = seq.poll(STEP);
        assert!(events.contains(&PlaybackEvent::Rest(1)));
        assert!(events.contains(&PlaybackEvent::NoteOff { voice: 0, note: 35 }));
    }

    #[test]
    fn test_transpose_is_clamped_and_applied() {
        let mut seq = grid();
        seq.set_transpose(100);
        assert_eq!(seq.transpose(), 24);
        seq.toggle_cell(0, 0);
        assert_eq!(seq.resolve_step(0), vec![59]);
    }

    #[test]
    fn test_tempo_is_clamped() {
        let mut seq = grid();
        seq.set_tempo(1.0);
        assert_eq!(seq.bpm(), 40.0);
        seq.set_tempo(1000.0);
        assert_eq!(seq.bpm(), 240.0);
    }

    #[test]
    fn test_stop_cuts_voices_fast() {
        let mut seq = grid();
        seq.toggle_cell(0, 0);
        seq.start(Duration::ZERO);
        seq.poll(Duration::ZERO);
        seq.stop(Duration::from_millis(10));

        assert!(!seq.is_running());
        assert_eq!(seq.voices()[0].envelope, EnvelopeState::Releasing);
        let events = seq.take_events();
        assert_eq!(events.last(), Some(&PlaybackEvent::Stopped));
        // fast release is 5 ms
        seq.poll(Duration::from_millis(16));
        assert_eq!(seq.voices()[0].envelope, EnvelopeState::Idle);
    }

    #[test]
    fn test_chord_layout_resolves_chords() {
        let config = SequencerConfig {
            layout: SequenceLayout::Chord,
            voice_policy: VoicePolicy::Polyphonic { voices: 4 },
            ..SequencerConfig::default()
        };
        let mut seq = Sequencer::headless(config);
        seq.set_key(Key::A);
        seq.set_chord_quality(ChordQuality::Minor);
        seq.toggle_cell(0, 0);
        assert_eq!(seq.resolve_step(0), vec![57, 60, 64]);
        assert_eq!(seq.resolve_pad(4), vec![64, 67, 71]);
    }

    #[test]
    fn test_pad_switch_cuts_previous_pad() {
        let mut seq = grid();
        seq.hold_pad(0, Duration::ZERO);
        seq.take_events();
        seq.hold_pad(3, Duration::from_millis(50));
        let events = seq.take_events();
        assert_eq!(events[0], PlaybackEvent::NoteOff { voice: 0, note: 35 });
        assert_eq!(note_ons(&events), vec![32]);
        seq.release_pad(Duration::from_millis(60));
        assert_eq!(seq.voices()[0].envelope, EnvelopeState::Releasing);
        assert_eq!(seq.held_pad(), None);
    }
}

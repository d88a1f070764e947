use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use stepseq::{
    step_duration, ArpPattern, ArpState, CommandSource, EnvelopeState, MidiNote, PlaybackEvent,
    SequenceLayout, Sequencer, SequencerConfig, ToneGenerator, VoiceCommand, VoicePolicy,
    Waveform,
};

static INIT: Once = Once::new();

fn init_logger() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

#[derive(Debug, Clone, PartialEq)]
enum ToneCall {
    Frequency(f32, f32),
    Amplitude(f32, f32),
}

#[derive(Clone, Default)]
struct RecordingTone {
    calls: Arc<Mutex<Vec<ToneCall>>>,
    waveform: Waveform,
}

impl RecordingTone {
    fn attacks(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ToneCall::Amplitude(level, _) if *level > 0.0))
            .count()
    }

    fn glides(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, ToneCall::Frequency(_, glide) if *glide > 0.0))
            .count()
    }
}

impl ToneGenerator for RecordingTone {
    fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    fn waveform(&self) -> Waveform {
        self.waveform
    }

    fn set_frequency(&mut self, hz: f32, glide_secs: f32) {
        self.calls
            .lock()
            .unwrap()
            .push(ToneCall::Frequency(hz, glide_secs));
    }

    fn set_amplitude(&mut self, level: f32, ramp_secs: f32) {
        self.calls
            .lock()
            .unwrap()
            .push(ToneCall::Amplitude(level, ramp_secs));
    }
}

fn sequencer_with_tones(config: SequencerConfig) -> (Sequencer, Vec<RecordingTone>) {
    init_logger();
    let tones: Vec<RecordingTone> = (0..config.voice_policy.pool_size())
        .map(|_| RecordingTone::default())
        .collect();
    let boxed = tones
        .iter()
        .cloned()
        .map(|t| Box::new(t) as Box<dyn ToneGenerator>)
        .collect();
    let sequencer = Sequencer::new(config, boxed).with_rng(StdRng::seed_from_u64(99));
    (sequencer, tones)
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

/// Poll exactly at every transport deadline, `ticks` times.
fn run_ticks(seq: &mut Sequencer, ticks: usize) -> Vec<PlaybackEvent> {
    let mut events = Vec::new();
    for _ in 0..ticks {
        let now = seq.transport().next_deadline();
        events.extend(seq.poll(now));
    }
    events
}

#[test]
fn test_deadline_after_n_ticks_is_exact() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.set_tempo(137.0);
    let start = Duration::from_millis(500);
    seq.start(start);

    let ticks = 777;
    for _ in 0..ticks {
        // late polls must not shift the grid
        let now = seq.transport().next_deadline() + Duration::from_micros(900);
        seq.poll(now);
    }
    assert_eq!(
        seq.transport().next_deadline(),
        start + step_duration(137.0) * ticks
    );
}

#[test]
fn test_playhead_wraps() {
    let config = SequencerConfig {
        step_count: 5,
        ..SequencerConfig::default()
    };
    let (mut seq, _) = sequencer_with_tones(config);
    seq.start(Duration::ZERO);
    run_ticks(&mut seq, 5);
    assert_eq!(seq.current_step(), 0);
}

#[test]
fn test_repeated_poll_before_deadline_does_nothing() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.toggle_cell(0, 0);
    seq.start(Duration::ZERO);
    assert!(!seq.poll(Duration::ZERO).is_empty());
    for ms in [0, 10, 60, 124] {
        assert!(seq.poll(Duration::from_millis(ms)).is_empty());
    }
    assert_eq!(seq.current_step(), 1);
}

#[test]
fn test_mono_legato_keeps_one_voice() {
    let (mut seq, tones) = sequencer_with_tones(SequencerConfig::default());
    seq.toggle_cell(0, 11);
    seq.toggle_cell(1, 0);
    seq.start(Duration::ZERO);

    let events = run_ticks(&mut seq, 2);
    assert_eq!(note_ons(&events), vec![24, 35]);
    assert!(events.contains(&PlaybackEvent::NoteOn {
        voice: 0,
        note: 35,
        legato: true,
        previous: Some(24),
    }));
    assert_eq!(seq.voices().len(), 1);
    assert_eq!(tones[0].attacks(), 1);
    assert_eq!(tones[0].glides(), 1);
}

#[test]
fn test_polyphonic_truncation() {
    let config = SequencerConfig {
        voice_policy: VoicePolicy::Polyphonic { voices: 4 },
        ..SequencerConfig::default()
    };
    let (mut seq, _) = sequencer_with_tones(config);
    for row in 0..6 {
        seq.toggle_cell(0, row);
    }
    seq.start(Duration::ZERO);
    let events = seq.poll(Duration::ZERO);

    // rows 0..6 are 35 down to 30; voices take them lowest first
    assert_eq!(note_ons(&events), vec![30, 31, 32, 33]);
    let sounding: Vec<_> = seq
        .voices()
        .iter()
        .map(|v| (v.id, v.note, v.envelope))
        .collect();
    assert_eq!(
        sounding,
        vec![
            (0, Some(30), EnvelopeState::Attacking),
            (1, Some(31), EnvelopeState::Attacking),
            (2, Some(32), EnvelopeState::Attacking),
            (3, Some(33), EnvelopeState::Attacking),
        ]
    );
}

#[test]
fn test_arpeggiator_patterns_over_held_chord() {
    for (pattern, expected) in [
        (ArpPattern::Up, vec![60, 64, 67, 60, 64, 67]),
        (ArpPattern::Down, vec![67, 64, 60, 67, 64, 60]),
    ] {
        let config = SequencerConfig {
            layout: SequenceLayout::Chord,
            ..SequencerConfig::default()
        };
        let (mut seq, _) = sequencer_with_tones(config);
        seq.set_transpose(12);
        seq.set_arp_pattern(pattern);
        seq.set_arp_mode(true, Duration::ZERO);
        seq.hold_pad(0, Duration::ZERO);
        assert_eq!(seq.arpeggiator().held_chord(), &[60, 64, 67]);

        let mut played = Vec::new();
        for _ in 0..6 {
            let now = seq.arpeggiator().next_deadline();
            played.extend(note_ons(&seq.poll(now)));
        }
        assert_eq!(played, expected);
        assert_eq!(seq.voices()[0].envelope, EnvelopeState::Sustaining);
    }
}

#[test]
fn test_releasing_pad_stops_arpeggio() {
    let config = SequencerConfig {
        layout: SequenceLayout::Chord,
        voice_policy: VoicePolicy::Polyphonic { voices: 4 },
        ..SequencerConfig::default()
    };
    let (mut seq, _) = sequencer_with_tones(config);
    seq.set_arp_mode(true, Duration::ZERO);
    seq.hold_pad(2, Duration::ZERO);
    seq.poll(Duration::ZERO);
    assert_eq!(seq.arpeggiator().state(), ArpState::Running);
    // arpeggiated notes never overlap, even with a polyphonic pool
    assert_eq!(seq.voices().iter().filter(|v| v.is_sounding()).count(), 1);

    seq.release_pad(Duration::from_millis(50));
    assert_eq!(seq.arpeggiator().state(), ArpState::Idle);
    assert!(seq.voices().iter().all(|v| !v.is_sounding()));
    assert!(note_ons(&seq.poll(Duration::from_millis(125))).is_empty());
}

#[test]
fn test_sequence_feeds_arpeggiator() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.set_arp_mode(true, Duration::ZERO);
    seq.set_arp_pattern(ArpPattern::default());
    seq.toggle_cell(0, 11);
    seq.toggle_cell(1, 11);
    seq.start(Duration::ZERO);

    let events = run_ticks(&mut seq, 3);
    // C1 with the 0,3,7 offsets, then an empty step rests
    assert_eq!(note_ons(&events), vec![24, 27]);
    assert!(events.contains(&PlaybackEvent::Rest(2)));
    assert_eq!(seq.arpeggiator().state(), ArpState::Idle);
}

#[test]
fn test_held_pad_arpeggiates_through_empty_steps() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.set_arp_mode(true, Duration::ZERO);
    seq.set_arp_pattern(ArpPattern::Up);
    seq.start(Duration::ZERO);
    seq.hold_pad(0, Duration::ZERO);

    let events = run_ticks(&mut seq, 4);
    assert_eq!(note_ons(&events), vec![35, 35, 35, 35]);
    assert!(!events.iter().any(|e| matches!(e, PlaybackEvent::Rest(_))));
}

#[test]
fn test_later_command_wins_in_the_same_instant() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.toggle_cell(0, 0);
    seq.start(Duration::ZERO);
    seq.submit(CommandSource::Ui, VoiceCommand::Legato(60));
    seq.poll(Duration::ZERO);
    // queued UI command first, then the transport's step
    assert_eq!(seq.voices()[0].note, Some(35));

    seq.submit(CommandSource::Ui, VoiceCommand::Legato(48));
    let events = seq.poll(Duration::from_millis(1));
    assert_eq!(note_ons(&events), vec![48]);
    assert_eq!(seq.voices()[0].note, Some(48));
}

#[test]
fn test_stop_silences_and_disables_clock() {
    let (mut seq, tones) = sequencer_with_tones(SequencerConfig::default());
    seq.toggle_cell(0, 3);
    seq.start(Duration::ZERO);
    seq.poll(Duration::ZERO);
    seq.stop(Duration::from_millis(40));

    let last = tones[0].calls.lock().unwrap().last().cloned();
    assert_eq!(last, Some(ToneCall::Amplitude(0.0, 0.005)));
    let events = seq.take_events();
    assert_eq!(events.last(), Some(&PlaybackEvent::Stopped));
    assert!(seq.poll(Duration::from_secs(5)).is_empty());
    assert!(!seq.is_running());
}

#[test]
fn test_arp_off_flushes_voices() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.set_arp_mode(true, Duration::ZERO);
    seq.hold_pad(5, Duration::ZERO);
    seq.poll(Duration::ZERO);
    assert!(seq.voices()[0].is_sounding());

    seq.set_arp_mode(false, Duration::from_millis(30));
    assert!(!seq.voices()[0].is_sounding());
    assert_eq!(seq.arpeggiator().state(), ArpState::Idle);
}

#[test]
fn test_sequence_editing_api() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.toggle_cell(3, 4);
    seq.toggle_cell(3, 4);
    assert!(!seq.cell_state(3, 4));

    seq.randomize_sequence(1.0);
    assert!((0..16).all(|s| (0..12).all(|r| seq.cell_state(s, r))));
    seq.randomize_sequence(0.0);
    assert!(seq.sequence().is_empty());

    seq.randomize_sequence(0.5);
    seq.clear_sequence();
    assert!((0..16).all(|s| seq.resolve_step(s).is_empty()));
}

#[test]
fn test_tempo_change_applies_on_next_boundary() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.start(Duration::ZERO);
    seq.poll(Duration::ZERO);
    seq.set_tempo(60.0);
    assert_eq!(seq.transport().next_deadline(), Duration::from_millis(125));
    seq.poll(Duration::from_millis(125));
    assert_eq!(seq.transport().next_deadline(), Duration::from_millis(375));
}

#[test]
fn test_headless_engine_runs_without_audio() {
    init_logger();
    let mut seq = Sequencer::headless(SequencerConfig {
        voice_policy: VoicePolicy::Polyphonic { voices: 4 },
        ..SequencerConfig::default()
    });
    seq.toggle_cell(0, 2);
    seq.start(Duration::ZERO);
    assert_eq!(note_ons(&seq.poll(Duration::ZERO)), vec![33]);
}

#[test]
fn test_selecting_a_cell_while_stopped_previews_it() {
    let (mut seq, tones) = sequencer_with_tones(SequencerConfig::default());
    seq.select_cell(2, 11, Duration::ZERO);
    assert!(seq.cell_state(2, 11));
    assert_eq!(note_ons(&seq.take_events()), vec![24]);
    assert!(seq.voices()[0].is_sounding());

    // released as soon as the attack is over
    let events = seq.poll(Duration::from_millis(10));
    assert!(events.contains(&PlaybackEvent::NoteOff { voice: 0, note: 24 }));
    assert_eq!(seq.voices()[0].envelope, EnvelopeState::Releasing);
    assert_eq!(tones[0].attacks(), 1);

    // turning the cell off is silent
    seq.select_cell(2, 11, Duration::from_millis(500));
    assert!(!seq.cell_state(2, 11));
    assert!(note_ons(&seq.take_events()).is_empty());
}

#[test]
fn test_no_preview_while_playing_or_arpeggiating() {
    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.start(Duration::ZERO);
    seq.poll(Duration::ZERO);
    seq.select_cell(5, 0, Duration::from_millis(20));
    assert!(seq.cell_state(5, 0));
    assert!(note_ons(&seq.take_events()).is_empty());

    let (mut seq, _) = sequencer_with_tones(SequencerConfig::default());
    seq.set_arp_mode(true, Duration::ZERO);
    seq.select_cell(5, 0, Duration::ZERO);
    assert!(seq.cell_state(5, 0));
    assert!(note_ons(&seq.take_events()).is_empty());
    assert!(seq.voices().iter().all(|v| !v.is_sounding()));
}

/// Playback engine - owns the sequencer on its own thread
///
/// The UI never touches the [`Sequencer`] directly. It sends [`Command`]s over a channel;
/// the playback thread applies them between polls, so every mutation happens on one
/// thread and no tick ever sees a half-applied change.
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::arpeggiator::ArpPattern;
use super::sequence::Sequence;
use super::voice::{VoiceEvent, VoiceId};
use super::Sequencer;
use crate::audio::Waveform;
use crate::pitch::{ChordQuality, Key, MidiNote};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started,
    Stopped,
    /// The step that was just played.
    StepAdvanced(usize),
    /// The step had no notes.
    Rest(usize),
    NoteOn {
        voice: VoiceId,
        note: MidiNote,
        legato: bool,
        previous: Option<MidiNote>,
    },
    NoteOff {
        voice: VoiceId,
        note: MidiNote,
    },
    /// Fresh copy of the pattern after an edit.
    SequenceChanged(Sequence),
}

impl From<VoiceEvent> for PlaybackEvent {
    fn from(event: VoiceEvent) -> Self {
        match event {
            VoiceEvent::NoteOn {
                voice,
                note,
                legato,
                previous,
            } => PlaybackEvent::NoteOn {
                voice,
                note,
                legato,
                previous,
            },
            VoiceEvent::NoteOff { voice, note } => PlaybackEvent::NoteOff { voice, note },
        }
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    ToggleCell(usize, usize),
    SelectCell(usize, usize),
    ClearSequence,
    RandomizeSequence(f32),
    SetTempo(f32),
    SetTranspose(i32),
    SetKey(Key),
    SetChordQuality(ChordQuality),
    SetArpPattern(ArpPattern),
    SetArpMode(bool),
    SetWaveform(Waveform),
    SetGlide(f32),
    Start,
    Stop,
    HoldPad(usize),
    ReleasePad,
}

impl Command {
    fn edits_sequence(&self) -> bool {
        matches!(
            self,
            Command::ToggleCell(..)
                | Command::SelectCell(..)
                | Command::ClearSequence
                | Command::RandomizeSequence(_)
        )
    }
}

/// Apply one UI command to the sequencer at time `now`.
pub fn apply_command(sequencer: &mut Sequencer, command: Command, now: Duration) {
    match command {
        Command::ToggleCell(step, row) => sequencer.toggle_cell(step, row),
        Command::SelectCell(step, row) => sequencer.select_cell(step, row, now),
        Command::ClearSequence => sequencer.clear_sequence(),
        Command::RandomizeSequence(density) => sequencer.randomize_sequence(density),
        Command::SetTempo(bpm) => sequencer.set_tempo(bpm),
        Command::SetTranspose(semitones) => sequencer.set_transpose(semitones),
        Command::SetKey(key) => sequencer.set_key(key),
        Command::SetChordQuality(quality) => sequencer.set_chord_quality(quality),
        Command::SetArpPattern(pattern) => sequencer.set_arp_pattern(pattern),
        Command::SetArpMode(enabled) => sequencer.set_arp_mode(enabled, now),
        Command::SetWaveform(waveform) => sequencer.set_waveform(waveform),
        Command::SetGlide(secs) => sequencer.set_glide(secs),
        Command::Start => sequencer.start(now),
        Command::Stop => sequencer.stop(now),
        Command::HoldPad(pad) => sequencer.hold_pad(pad, now),
        Command::ReleasePad => sequencer.release_pad(now),
    }
}

pub struct PlaybackEngine {
    commands: Sender<Command>,
    receiver: Receiver<PlaybackEvent>,
    is_alive: Arc<Mutex<bool>>,
    is_running: bool,
    current_step: usize,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Move `sequencer` onto a new playback thread.
    pub fn spawn(sequencer: Sequencer) -> Self {
        let (command_tx, command_rx) = channel::<Command>();
        let (event_tx, event_rx) = channel();
        let is_alive = Arc::new(Mutex::new(true));

        let alive = Arc::clone(&is_alive);
        let handle = thread::spawn(move || run(sequencer, command_rx, event_tx, alive));

        Self {
            commands: command_tx,
            receiver: event_rx,
            is_alive,
            is_running: false,
            current_step: 0,
            handle: Some(handle),
        }
    }

    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("playback thread is gone, command dropped");
        }
    }

    pub fn start(&self) {
        self.send(Command::Start);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// As last reported by the playback thread.
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            match &event {
                PlaybackEvent::Started => self.is_running = true,
                PlaybackEvent::Stopped => self.is_running = false,
                PlaybackEvent::StepAdvanced(step) => self.current_step = *step,
                _ => {}
            }
            events.push(event);
        }
        events
    }

    pub fn shutdown(&mut self) {
        if let Ok(mut alive) = self.is_alive.lock() {
            *alive = false;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("playback thread panicked");
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut sequencer: Sequencer,
    commands: Receiver<Command>,
    events: Sender<PlaybackEvent>,
    is_alive: Arc<Mutex<bool>>,
) {
    let epoch = Instant::now();
    let _ = events.send(PlaybackEvent::SequenceChanged(sequencer.sequence().clone()));

    while is_alive.lock().map(|alive| *alive).unwrap_or(false) {
        let mut edited = false;
        while let Ok(command) = commands.try_recv() {
            edited |= command.edits_sequence();
            apply_command(&mut sequencer, command, epoch.elapsed());
        }
        if edited {
            let _ = events.send(PlaybackEvent::SequenceChanged(sequencer.sequence().clone()));
        }

        for event in sequencer.poll(epoch.elapsed()) {
            if events.send(event).is_err() {
                return;
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    sequencer.stop(epoch.elapsed());
    log::debug!("playback thread exiting");
}

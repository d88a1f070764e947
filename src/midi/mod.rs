/// MIDI output using midir
use midir::{MidiOutput, MidiOutputConnection};

use crate::error::MidiError;
use crate::pitch::MidiNote;
use crate::sequencer::playback::PlaybackEvent;

const CLIENT_NAME: &str = "stepseq MIDI Output";

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    channel: u8,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            channel: 0,
        }
    }

    pub fn available_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(err) => {
                log::warn!("cannot list MIDI ports: {}", err);
                vec![]
            }
        }
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or(MidiError::InvalidPort(port_index))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "stepseq")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        log::info!("connected MIDI output to {}", name);
        self.connection = Some(connection);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Channel 0..=15.
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel.min(15);
    }

    /// Notes outside 0..=127 are skipped.
    pub fn send_note_on(&mut self, note: MidiNote, velocity: u8) -> Result<(), MidiError> {
        match note_on_message(self.channel, note, velocity) {
            Some(message) => self.send(&message),
            None => Ok(()),
        }
    }

    pub fn send_note_off(&mut self, note: MidiNote) -> Result<(), MidiError> {
        match note_off_message(self.channel, note) {
            Some(message) => self.send(&message),
            None => Ok(()),
        }
    }

    /// Mirror a playback event.
    pub fn send_event(&mut self, event: &PlaybackEvent, velocity: u8) -> Result<(), MidiError> {
        for message in event_messages(self.channel, event, velocity) {
            self.send(&message)?;
        }
        Ok(())
    }

    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        if let Some(ref mut conn) = self.connection {
            conn.send(message)?;
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
            log::info!("MIDI output disconnected");
        }
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn to_midi_byte(note: MidiNote) -> Option<u8> {
    u8::try_from(note).ok().filter(|&n| n <= 127)
}

fn note_on_message(channel: u8, note: MidiNote, velocity: u8) -> Option<[u8; 3]> {
    to_midi_byte(note).map(|note| [0x90 | channel, note, velocity.min(127)])
}

fn note_off_message(channel: u8, note: MidiNote) -> Option<[u8; 3]> {
    to_midi_byte(note).map(|note| [0x80 | channel, note, 0])
}

/// Raw messages for a playback event. A legato note-on sends the new note before
/// releasing the old one so receiving mono synths glide; retriggering the note already
/// sounding sends nothing.
fn event_messages(channel: u8, event: &PlaybackEvent, velocity: u8) -> Vec<[u8; 3]> {
    match *event {
        PlaybackEvent::NoteOn { note, previous, .. } => {
            if previous == Some(note) {
                return Vec::new();
            }
            note_on_message(channel, note, velocity)
                .into_iter()
                .chain(previous.and_then(|old| note_off_message(channel, old)))
                .collect()
        }
        PlaybackEvent::NoteOff { note, .. } => {
            note_off_message(channel, note).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_notes_are_skipped() {
        assert_eq!(to_midi_byte(-1), None);
        assert_eq!(to_midi_byte(128), None);
        assert_eq!(to_midi_byte(127), Some(127));
        assert_eq!(to_midi_byte(0), Some(0));
    }

    #[test]
    fn test_unconnected_device_accepts_events() {
        let mut device = MidiOutputDevice::new();
        let on = PlaybackEvent::NoteOn {
            voice: 0,
            note: 60,
            legato: true,
            previous: Some(55),
        };
        assert!(device.send_event(&on, 100).is_ok());
        assert!(device.send_note_on(-5, 100).is_ok());
        assert!(!device.is_connected());
    }

    #[test]
    fn test_legato_messages() {
        let glide = PlaybackEvent::NoteOn {
            voice: 0,
            note: 60,
            legato: true,
            previous: Some(55),
        };
        assert_eq!(
            event_messages(2, &glide, 100),
            vec![[0x92, 60, 100], [0x82, 55, 0]]
        );

        let same = PlaybackEvent::NoteOn {
            voice: 0,
            note: 60,
            legato: true,
            previous: Some(60),
        };
        assert!(event_messages(0, &same, 100).is_empty());

        let fresh = PlaybackEvent::NoteOn {
            voice: 0,
            note: 60,
            legato: false,
            previous: None,
        };
        assert_eq!(event_messages(0, &fresh, 200), vec![[0x90, 60, 127]]);
        let off = PlaybackEvent::NoteOff { voice: 0, note: 60 };
        assert_eq!(event_messages(0, &off, 100), vec![[0x80, 60, 0]]);
    }

    #[test]
    fn test_channel_is_clamped() {
        let mut device = MidiOutputDevice::new();
        device.set_channel(40);
        assert_eq!(device.channel, 15);
    }
}

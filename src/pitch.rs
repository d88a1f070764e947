/// Pitch resolution - grid rows, pads and chord symbols to MIDI note numbers
///
/// Everything here is a pure function of its inputs. Notes are plain `i32`s so that
/// transposition far outside the MIDI range still yields a number instead of an error.

/// MIDI note number, unclamped.
pub type MidiNote = i32;

/// Sub-bass chromatic rows, top row first (B1 down to C1).
pub const DEFAULT_ROW_NOTES: [MidiNote; 12] = [35, 34, 33, 32, 31, 30, 29, 28, 27, 26, 25, 24];

/// Semitone offsets of the major scale degrees.
pub const MAJOR_SCALE: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

/// MIDI note of C3, the root octave for chord pads.
const CHORD_ROOT_BASE: MidiNote = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Key {
    #[default]
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl Key {
    pub const ALL: [Key; 12] = [
        Key::C,
        Key::CSharp,
        Key::D,
        Key::DSharp,
        Key::E,
        Key::F,
        Key::FSharp,
        Key::G,
        Key::GSharp,
        Key::A,
        Key::ASharp,
        Key::B,
    ];

    pub fn pitch_class(self) -> i32 {
        self as i32
    }

    pub fn root_midi(self) -> MidiNote {
        CHORD_ROOT_BASE + self.pitch_class()
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChordQuality {
    #[default]
    Major,
    Minor,
    Seventh,
    MinorSeventh,
    Sus2,
    Sus4,
    Power,
    Octave,
}

impl ChordQuality {
    pub const ALL: [ChordQuality; 8] = [
        ChordQuality::Major,
        ChordQuality::Minor,
        ChordQuality::Seventh,
        ChordQuality::MinorSeventh,
        ChordQuality::Sus2,
        ChordQuality::Sus4,
        ChordQuality::Power,
        ChordQuality::Octave,
    ];

    /// Semitone offsets including the root.
    pub fn intervals(self) -> &'static [i32] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Seventh => &[0, 4, 7, 10],
            ChordQuality::MinorSeventh => &[0, 3, 7, 10],
            ChordQuality::Sus2 => &[0, 2, 7],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::Power => &[0, 7],
            ChordQuality::Octave => &[0, 12],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChordQuality::Major => "Major",
            ChordQuality::Minor => "Minor",
            ChordQuality::Seventh => "7th",
            ChordQuality::MinorSeventh => "m7",
            ChordQuality::Sus2 => "sus2",
            ChordQuality::Sus4 => "sus4",
            ChordQuality::Power => "Power",
            ChordQuality::Octave => "Octave",
        }
    }
}

/// What a cell or pad stands for before key and transpose are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchSource {
    /// A row of the grid or a single-note pad.
    Row(usize),
    /// One tone of a chord built on a scale degree of the current key.
    ChordTone { degree: usize, interval: i32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitchMap {
    row_notes: Vec<MidiNote>,
}

impl PitchMap {
    pub fn new(row_notes: Vec<MidiNote>) -> Self {
        let row_notes = if row_notes.is_empty() {
            DEFAULT_ROW_NOTES.to_vec()
        } else {
            row_notes
        };
        Self { row_notes }
    }

    pub fn rows(&self) -> usize {
        self.row_notes.len()
    }

    pub fn resolve(&self, source: PitchSource, key: Key, transpose: i32) -> MidiNote {
        let base = match source {
            PitchSource::Row(row) => self.row_base(row),
            PitchSource::ChordTone { degree, interval } => {
                key.root_midi() + scale_degree_offset(degree) + interval
            }
        };
        base + transpose
    }

    /// Rows past the end of the table continue it one octave lower per lap.
    fn row_base(&self, row: usize) -> MidiNote {
        let len = self.row_notes.len();
        let lap = (row / len) as i32;
        self.row_notes[row % len] - 12 * lap
    }

    pub fn row_note(&self, row: usize, transpose: i32) -> MidiNote {
        self.resolve(PitchSource::Row(row), Key::C, transpose)
    }

    /// Chord tones in ascending interval order.
    pub fn chord(
        &self,
        degree: usize,
        quality: ChordQuality,
        key: Key,
        transpose: i32,
    ) -> Vec<MidiNote> {
        quality
            .intervals()
            .iter()
            .map(|&interval| {
                self.resolve(PitchSource::ChordTone { degree, interval }, key, transpose)
            })
            .collect()
    }
}

impl Default for PitchMap {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_NOTES.to_vec())
    }
}

/// Degrees past the seventh wrap into the next octave.
pub fn scale_degree_offset(degree: usize) -> i32 {
    let octave = (degree / MAJOR_SCALE.len()) as i32;
    MAJOR_SCALE[degree % MAJOR_SCALE.len()] + 12 * octave
}

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

pub fn midi_note_name(note: MidiNote) -> String {
    let octave = note.div_euclid(12) - 1;
    let index = note.rem_euclid(12) as usize;
    format!("{}{}", NOTE_NAMES[index], octave)
}

pub fn midi_to_frequency(note: MidiNote) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Arpeggiator - walks a held chord on its own sixteenth-note clock
use std::time::Duration;

use crate::pitch::MidiNote;

/// Interval pattern used when no other custom pattern is given.
pub const DEFAULT_CUSTOM_PATTERN: [i32; 8] = [0, 3, 7, 10, 12, 10, 7, 3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpPattern {
    Up,
    Down,
    /// Semitone offsets from the chord root, cycled.
    Custom(Vec<i32>),
}

impl Default for ArpPattern {
    fn default() -> Self {
        ArpPattern::Custom(DEFAULT_CUSTOM_PATTERN.to_vec())
    }
}

impl ArpPattern {
    pub fn name(&self) -> &'static str {
        match self {
            ArpPattern::Up => "Up",
            ArpPattern::Down => "Down",
            ArpPattern::Custom(_) => "Custom",
        }
    }

    /// Note for the given step over `chord`, or `None` for an empty chord.
    pub fn note_at(&self, step_counter: u64, chord: &[MidiNote]) -> Option<MidiNote> {
        let len = chord.len() as u64;
        if len == 0 {
            return None;
        }
        let note = match self {
            ArpPattern::Up => chord[(step_counter % len) as usize],
            ArpPattern::Down => chord[(len - 1 - step_counter % len) as usize],
            ArpPattern::Custom(intervals) => {
                let interval = if intervals.is_empty() {
                    0
                } else {
                    intervals[(step_counter % intervals.len() as u64) as usize]
                };
                chord[0] + interval
            }
        };
        Some(note)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    Idle,
    Running,
}

/// Who is holding the current chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldSource {
    /// A pad held down from the UI; wins over the sequence.
    Pad(usize),
    /// The transport's current step.
    Sequence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpTick {
    Note(MidiNote),
    Silence,
}

#[derive(Debug, Clone)]
pub struct Arpeggiator {
    enabled: bool,
    pattern: ArpPattern,
    state: ArpState,
    step_counter: u64,
    held: Vec<MidiNote>,
    holder: Option<HoldSource>,
    next_deadline: Duration,
}

impl Arpeggiator {
    pub fn new(pattern: ArpPattern) -> Self {
        Self {
            enabled: false,
            pattern,
            state: ArpState::Idle,
            step_counter: 0,
            held: Vec::new(),
            holder: None,
            next_deadline: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn state(&self) -> ArpState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ArpState::Running
    }

    pub fn pattern(&self) -> &ArpPattern {
        &self.pattern
    }

    pub fn set_pattern(&mut self, pattern: ArpPattern) {
        self.pattern = pattern;
    }

    pub fn step_counter(&self) -> u64 {
        self.step_counter
    }

    pub fn held_chord(&self) -> &[MidiNote] {
        &self.held
    }

    pub fn holder(&self) -> Option<HoldSource> {
        self.holder
    }

    pub fn next_deadline(&self) -> Duration {
        self.next_deadline
    }

    /// Returns true if this stopped a running arpeggio.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        self.enabled = enabled;
        if enabled {
            false
        } else {
            self.release_all()
        }
    }

    /// Hold `chord`. An empty chord releases it instead. A pad hold is never replaced
    /// by a sequence hold. Returns true if the chord is now held.
    pub fn hold(&mut self, chord: Vec<MidiNote>, source: HoldSource, now: Duration) -> bool {
        if !self.enabled {
            return false;
        }
        if chord.is_empty() {
            self.release(source);
            return false;
        }
        if matches!(self.holder, Some(HoldSource::Pad(_))) && source == HoldSource::Sequence {
            return false;
        }

        self.held = chord;
        self.holder = Some(source);
        if self.state == ArpState::Idle {
            self.state = ArpState::Running;
            self.step_counter = 0;
            self.next_deadline = now;
        }
        true
    }

    /// Release the chord if `source` is holding it. Pad releases drop any pad hold.
    /// Returns true if the arpeggio stopped.
    pub fn release(&mut self, source: HoldSource) -> bool {
        let matches = match (self.holder, source) {
            (Some(HoldSource::Pad(_)), HoldSource::Pad(_)) => true,
            (Some(HoldSource::Sequence), HoldSource::Sequence) => true,
            _ => false,
        };
        if matches {
            self.release_all()
        } else {
            false
        }
    }

    pub fn release_all(&mut self) -> bool {
        let was_running = self.is_running();
        self.held.clear();
        self.holder = None;
        self.state = ArpState::Idle;
        was_running
    }

    /// Fires once per interval while running. Before the deadline this does nothing.
    pub fn tick(&mut self, now: Duration, interval: Duration) -> Option<ArpTick> {
        if !self.is_running() || now < self.next_deadline {
            return None;
        }

        match self.pattern.note_at(self.step_counter, &self.held) {
            Some(note) => {
                self.step_counter = self.step_counter.wrapping_add(1);
                self.next_deadline += interval;
                Some(ArpTick::Note(note))
            }
            None => {
                self.release_all();
                Some(ArpTick::Silence)
            }
        }
    }
}

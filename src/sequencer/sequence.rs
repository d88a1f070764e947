/// Note-pattern storage - pure data, no timing
///
/// A sequence has a fixed number of steps and a fixed row domain set at construction.
/// Nothing here ever resizes it; out-of-range coordinates are ignored.
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceLayout {
    /// Any number of rows may be active per step.
    #[default]
    Grid,
    /// At most one single-note pad per step.
    Pad,
    /// At most one scale-degree chord pad per step.
    Chord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Rows(Vec<bool>),
    Pad(Option<usize>),
    Chord(Option<usize>),
}

impl Step {
    fn empty(layout: SequenceLayout, rows: usize) -> Self {
        match layout {
            SequenceLayout::Grid => Step::Rows(vec![false; rows]),
            SequenceLayout::Pad => Step::Pad(None),
            SequenceLayout::Chord => Step::Chord(None),
        }
    }

    fn is_active(&self, row: usize) -> bool {
        match self {
            Step::Rows(cells) => cells.get(row).copied().unwrap_or(false),
            Step::Pad(selected) | Step::Chord(selected) => *selected == Some(row),
        }
    }

    fn set(&mut self, row: usize, value: bool) {
        match self {
            Step::Rows(cells) => {
                if let Some(cell) = cells.get_mut(row) {
                    *cell = value;
                }
            }
            Step::Pad(selected) | Step::Chord(selected) => {
                if value {
                    *selected = Some(row);
                } else if *selected == Some(row) {
                    *selected = None;
                }
            }
        }
    }

    fn clear(&mut self) {
        match self {
            Step::Rows(cells) => cells.iter_mut().for_each(|cell| *cell = false),
            Step::Pad(selected) | Step::Chord(selected) => *selected = None,
        }
    }

    /// Active rows, lowest row index first.
    pub fn active_rows(&self) -> Vec<usize> {
        match self {
            Step::Rows(cells) => cells
                .iter()
                .enumerate()
                .filter(|(_, active)| **active)
                .map(|(row, _)| row)
                .collect(),
            Step::Pad(selected) | Step::Chord(selected) => selected.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    layout: SequenceLayout,
    steps: Vec<Step>,
    rows: usize,
}

impl Sequence {
    pub fn new(layout: SequenceLayout, step_count: usize, rows: usize) -> Self {
        let step_count = step_count.max(1);
        let rows = rows.max(1);
        Self {
            layout,
            steps: (0..step_count).map(|_| Step::empty(layout, rows)).collect(),
            rows,
        }
    }

    pub fn layout(&self) -> SequenceLayout {
        self.layout
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn step(&self, step: usize) -> Option<&Step> {
        self.steps.get(step)
    }

    pub fn get(&self, step: usize, row: usize) -> bool {
        row < self.rows && self.steps.get(step).map_or(false, |s| s.is_active(row))
    }

    pub fn set(&mut self, step: usize, row: usize, value: bool) {
        if row >= self.rows {
            return;
        }
        if let Some(s) = self.steps.get_mut(step) {
            s.set(row, value);
        }
    }

    /// Flips one cell. A pad or chord step already holding another row is left alone;
    /// replacing a selection is what [`Sequence::select`] is for.
    pub fn toggle(&mut self, step: usize, row: usize) {
        if row >= self.rows {
            return;
        }
        let Some(s) = self.steps.get_mut(step) else {
            return;
        };
        if let Step::Pad(Some(selected)) | Step::Chord(Some(selected)) = s {
            if *selected != row {
                return;
            }
        }
        let current = s.is_active(row);
        s.set(row, !current);
    }

    /// Column-exclusive click: clears the step, then activates `row` unless it was
    /// already the only active cell.
    pub fn select(&mut self, step: usize, row: usize) {
        if row >= self.rows || step >= self.steps.len() {
            return;
        }
        let was_sole = self.steps[step].active_rows() == [row];
        self.steps[step].clear();
        if !was_sole {
            self.steps[step].set(row, true);
        }
    }

    pub fn active_rows(&self, step: usize) -> Vec<usize> {
        self.steps
            .get(step)
            .map(Step::active_rows)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.iter().all(|s| s.active_rows().is_empty())
    }

    pub fn clear(&mut self) {
        for step in &mut self.steps {
            step.clear();
        }
    }

    /// Grid steps get every cell independently with probability `density`;
    /// pad and chord steps get one random row with probability `density`.
    pub fn randomize<R: Rng + ?Sized>(&mut self, density: f32, rng: &mut R) {
        let density = f64::from(density.clamp(0.0, 1.0));
        let rows = self.rows;
        self.clear();
        for step in &mut self.steps {
            match step {
                Step::Rows(cells) => {
                    for cell in cells.iter_mut() {
                        *cell = rng.gen_bool(density);
                    }
                }
                Step::Pad(selected) | Step::Chord(selected) => {
                    if rng.gen_bool(density) {
                        *selected = Some(rng.gen_range(0..rows));
                    }
                }
            }
        }
    }
}

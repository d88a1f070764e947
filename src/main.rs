#[cfg(feature = "gui")]
use eframe::egui;

#[cfg(feature = "gui")]
use stepseq::{
    midi_note_name, ArpPattern, AudioOutput, Command, MidiOutputDevice, PitchMap, PlaybackEngine,
    PlaybackEvent, Sequence, SequenceLayout, Sequencer, SequencerConfig, SilentTone,
    ToneGenerator, Waveform,
};

use env_logger::{Builder, Env};

#[cfg(feature = "gui")]
fn main() -> Result<(), eframe::Error> {
    Builder::from_env(Env::default().default_filter_or("info")).init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 720.0])
            .with_title("stepseq - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "stepseq",
        options,
        Box::new(|_cc| Ok(Box::new(SequencerApp::new()))),
    )
}

#[cfg(not(feature = "gui"))]
fn main() {
    Builder::from_env(Env::default().default_filter_or("info")).init();
    log::error!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
const MIDI_VELOCITY: u8 = 100;

#[cfg(feature = "gui")]
const ARP_PATTERNS: [&str; 3] = ["Up", "Down", "Custom"];

#[cfg(feature = "gui")]
struct SequencerApp {
    engine: PlaybackEngine,
    // keeps the stream alive
    _audio_output: Option<AudioOutput>,
    midi_output: MidiOutputDevice,
    pitch_map: PitchMap,

    // UI state
    sequence: Sequence,
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    bpm: f32,
    transpose: i32,
    arp_enabled: bool,
    arp_pattern: usize,
    waveform: Waveform,
    held_pad: Option<usize>,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new() -> Self {
        // one note per column
        let config = SequencerConfig {
            layout: SequenceLayout::Pad,
            ..SequencerConfig::default()
        };
        let voices = config.voice_policy.pool_size();

        let (audio_output, tones): (Option<AudioOutput>, Vec<Box<dyn ToneGenerator>>) =
            match AudioOutput::new(voices) {
                Ok(output) => {
                    let tones = output
                        .oscillators()
                        .into_iter()
                        .map(|osc| Box::new(osc) as Box<dyn ToneGenerator>)
                        .collect();
                    (Some(output), tones)
                }
                Err(err) => {
                    log::warn!("audio unavailable ({}), running silent", err);
                    let tones = (0..voices)
                        .map(|_| Box::new(SilentTone::default()) as Box<dyn ToneGenerator>)
                        .collect();
                    (None, tones)
                }
            };

        let sequencer = Sequencer::new(config.clone(), tones);
        let sequence = sequencer.sequence().clone();

        Self {
            engine: PlaybackEngine::spawn(sequencer),
            _audio_output: audio_output,
            midi_output: MidiOutputDevice::new(),
            pitch_map: PitchMap::new(config.row_notes.clone()),
            sequence,
            available_midi_ports: MidiOutputDevice::available_ports(),
            selected_port: None,
            bpm: config.tempo_bpm,
            transpose: config.transpose,
            arp_enabled: false,
            arp_pattern: 2,
            waveform: config.waveform,
            held_pad: None,
        }
    }

    fn handle_playback_events(&mut self) {
        for event in self.engine.poll_events() {
            match event {
                PlaybackEvent::SequenceChanged(sequence) => self.sequence = sequence,
                ref note_event @ (PlaybackEvent::NoteOn { .. } | PlaybackEvent::NoteOff { .. }) => {
                    if let Err(err) = self.midi_output.send_event(note_event, MIDI_VELOCITY) {
                        log::warn!("{}", err);
                    }
                }
                _ => {}
            }
        }
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.engine.is_running() {
                if ui.button("⏹ Stop").clicked() {
                    self.engine.stop();
                }
            } else if ui.button("▶ Start").clicked() {
                self.engine.start();
            }

            if ui.button("Clear").clicked() {
                self.engine.send(Command::ClearSequence);
            }
            if ui.button("Random").clicked() {
                self.engine.send(Command::RandomizeSequence(0.7));
            }

            let arp_label = if self.arp_enabled { "Arp: ON" } else { "Arp: OFF" };
            if ui.selectable_label(self.arp_enabled, arp_label).clicked() {
                self.arp_enabled = !self.arp_enabled;
                self.engine.send(Command::SetArpMode(self.arp_enabled));
            }

            let mut pattern = self.arp_pattern;
            egui::ComboBox::from_id_source("arp_pattern")
                .selected_text(ARP_PATTERNS[pattern])
                .show_ui(ui, |ui| {
                    for (i, name) in ARP_PATTERNS.iter().enumerate() {
                        ui.selectable_value(&mut pattern, i, *name);
                    }
                });
            if pattern != self.arp_pattern {
                self.arp_pattern = pattern;
                let pattern = match pattern {
                    0 => ArpPattern::Up,
                    1 => ArpPattern::Down,
                    _ => ArpPattern::default(),
                };
                self.engine.send(Command::SetArpPattern(pattern));
            }
        });

        ui.horizontal(|ui| {
            ui.label("BPM:");
            if ui
                .add(egui::Slider::new(&mut self.bpm, 40.0..=240.0).step_by(1.0))
                .changed()
            {
                self.engine.send(Command::SetTempo(self.bpm));
            }

            ui.add_space(20.0);

            ui.label("Transpose:");
            if ui
                .add(egui::Slider::new(&mut self.transpose, -24..=24))
                .changed()
            {
                self.engine.send(Command::SetTranspose(self.transpose));
            }

            ui.add_space(20.0);

            let mut waveform = self.waveform;
            egui::ComboBox::from_id_source("waveform")
                .selected_text(waveform.name())
                .show_ui(ui, |ui| {
                    for w in [Waveform::Sawtooth, Waveform::Square] {
                        ui.selectable_value(&mut waveform, w, w.name());
                    }
                });
            if waveform != self.waveform {
                self.waveform = waveform;
                self.engine.send(Command::SetWaveform(waveform));
            }
        });
    }

    fn step_grid(&mut self, ui: &mut egui::Ui) {
        let is_playing = self.engine.is_running();
        let current = self.engine.current_step();
        let toggle_mode = ui.input(|i| i.modifiers.shift);

        for row in 0..self.sequence.rows() {
            ui.horizontal(|ui| {
                let note = self.pitch_map.row_note(row, self.transpose);
                ui.add_sized([50.0, 28.0], egui::Label::new(midi_note_name(note)));

                for step in 0..self.sequence.step_count() {
                    let is_current = is_playing && current == step;
                    let active = self.sequence.get(step, row);

                    let button = egui::Button::new("")
                        .min_size(egui::vec2(40.0, 28.0))
                        .fill(if active {
                            egui::Color32::from_rgb(20, 20, 20)
                        } else if is_current && self.arp_enabled {
                            egui::Color32::from_rgb(255, 165, 0)
                        } else if is_current {
                            egui::Color32::from_rgb(100, 200, 100)
                        } else {
                            egui::Color32::from_rgb(0, 112, 221)
                        });

                    if ui.add(button).clicked() {
                        let command = if toggle_mode {
                            Command::ToggleCell(step, row)
                        } else {
                            Command::SelectCell(step, row)
                        };
                        self.engine.send(command);
                    }
                }
            });
        }
    }

    fn pads(&mut self, ui: &mut egui::Ui) {
        let mut pressed = None;
        ui.horizontal(|ui| {
            for pad in 0..self.sequence.rows() {
                let note = self.pitch_map.row_note(pad, self.transpose);
                let response = ui.add(
                    egui::Button::new(midi_note_name(note)).min_size(egui::vec2(56.0, 40.0)),
                );
                if response.is_pointer_button_down_on() {
                    pressed = Some(pad);
                }
            }
        });

        if pressed != self.held_pad {
            match pressed {
                Some(pad) => self.engine.send(Command::HoldPad(pad)),
                None => self.engine.send(Command::ReleasePad),
            }
            self.held_pad = pressed;
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("stepseq - Step Sequencer");
            ui.add_space(10.0);

            // MIDI Port Selection
            let mut selected_port_changed = None;
            ui.horizontal(|ui| {
                ui.label("MIDI Output:");
                if self.available_midi_ports.is_empty() {
                    ui.label("No MIDI ports available");
                } else {
                    egui::ComboBox::from_label("")
                        .selected_text(
                            self.selected_port
                                .map(|i| self.available_midi_ports[i].as_str())
                                .unwrap_or("Select port..."),
                        )
                        .show_ui(ui, |ui| {
                            for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                                if ui
                                    .selectable_label(self.selected_port == Some(i), port_name)
                                    .clicked()
                                {
                                    selected_port_changed = Some(i);
                                }
                            }
                        });
                }
            });

            if let Some(port_idx) = selected_port_changed {
                match self.midi_output.connect(port_idx) {
                    Ok(()) => self.selected_port = Some(port_idx),
                    Err(err) => log::error!("{}", err),
                }
            }

            ui.add_space(10.0);
            self.transport_controls(ui);
            ui.add_space(10.0);
            self.step_grid(ui);
            ui.add_space(10.0);

            ui.label("Pads (hold to play, arpeggiated when Arp is on):");
            self.pads(ui);

            ui.separator();
            ui.label("Click a cell to select it in its column, shift-click to toggle it");
            if !self.midi_output.is_connected() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No MIDI output connected - audio playback only",
                );
            }
        });
    }
}

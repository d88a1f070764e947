/// Audio output using cpal
///
/// The sequencer only talks to the [`ToneGenerator`] trait. [`AudioOutput`] backs it with
/// a real stream; [`SilentTone`] keeps the engine usable when no device is available.
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};

use crate::error::ToneGeneratorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Waveform {
    #[default]
    Sawtooth,
    Square,
}

impl Waveform {
    pub fn name(self) -> &'static str {
        match self {
            Waveform::Sawtooth => "Sawtooth",
            Waveform::Square => "Square",
        }
    }
}

/// One oscillator voice as seen by the voice allocator.
pub trait ToneGenerator: Send {
    fn set_waveform(&mut self, waveform: Waveform);
    fn waveform(&self) -> Waveform;
    /// Move to `hz`, gliding linearly over `glide_secs` (0 jumps).
    fn set_frequency(&mut self, hz: f32, glide_secs: f32);
    /// Ramp the output level to `level` (0..1) over `ramp_secs`.
    fn set_amplitude(&mut self, level: f32, ramp_secs: f32);
}

/// Tone generator that makes no sound.
#[derive(Debug, Default, Clone)]
pub struct SilentTone {
    waveform: Waveform,
}

impl ToneGenerator for SilentTone {
    fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    fn waveform(&self) -> Waveform {
        self.waveform
    }

    fn set_frequency(&mut self, _hz: f32, _glide_secs: f32) {}

    fn set_amplitude(&mut self, _level: f32, _ramp_secs: f32) {}
}

/// A linear ramp towards `target`, advanced once per sample.
#[derive(Debug, Clone, Copy, Default)]
struct Ramp {
    value: f32,
    target: f32,
    step: f32,
}

impl Ramp {
    fn set(&mut self, target: f32, secs: f32, sample_rate: f32) {
        let samples = secs * sample_rate;
        if samples < 1.0 {
            self.value = target;
            self.step = 0.0;
        } else {
            self.step = (target - self.value) / samples;
        }
        self.target = target;
    }

    fn next(&mut self) -> f32 {
        if self.step != 0.0 {
            self.value += self.step;
            let overshot = (self.step > 0.0 && self.value >= self.target)
                || (self.step < 0.0 && self.value <= self.target);
            if overshot {
                self.value = self.target;
                self.step = 0.0;
            }
        }
        self.value
    }
}

#[derive(Debug, Clone, Default)]
struct Oscillator {
    waveform: Waveform,
    frequency: Ramp,
    amplitude: Ramp,
    phase: f32,
    sample_rate: f32,
}

impl Oscillator {
    fn sample(&mut self) -> f32 {
        let frequency = self.frequency.next();
        let amplitude = self.amplitude.next();
        if amplitude <= 0.0 {
            return 0.0;
        }

        let raw = match self.waveform {
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
            Waveform::Square => {
                if self.phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        };

        self.phase += frequency / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        raw * amplitude
    }
}

/// Handle to one oscillator of a running [`AudioOutput`] stream.
#[derive(Clone)]
pub struct OscillatorHandle {
    oscillator: Arc<Mutex<Oscillator>>,
}

impl OscillatorHandle {
    fn with<R>(&self, f: impl FnOnce(&mut Oscillator) -> R) -> R {
        // A poisoned lock only means the audio callback panicked; keep the state usable.
        let mut osc = match self.oscillator.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut osc)
    }
}

impl ToneGenerator for OscillatorHandle {
    fn set_waveform(&mut self, waveform: Waveform) {
        self.with(|osc| osc.waveform = waveform);
    }

    fn waveform(&self) -> Waveform {
        self.with(|osc| osc.waveform)
    }

    fn set_frequency(&mut self, hz: f32, glide_secs: f32) {
        self.with(|osc| {
            let sample_rate = osc.sample_rate;
            osc.frequency.set(hz, glide_secs, sample_rate);
        });
    }

    fn set_amplitude(&mut self, level: f32, ramp_secs: f32) {
        self.with(|osc| {
            let sample_rate = osc.sample_rate;
            osc.amplitude.set(level.clamp(0.0, 1.0), ramp_secs, sample_rate);
        });
    }
}

/// Output stream mixing a fixed pool of oscillators.
pub struct AudioOutput {
    _stream: cpal::Stream,
    oscillators: Vec<Arc<Mutex<Oscillator>>>,
}

impl AudioOutput {
    pub fn new(voices: usize) -> Result<Self, ToneGeneratorError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(ToneGeneratorError::NoOutputDevice)?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let oscillators: Vec<Arc<Mutex<Oscillator>>> = (0..voices.max(1))
            .map(|_| {
                Arc::new(Mutex::new(Oscillator {
                    sample_rate,
                    ..Oscillator::default()
                }))
            })
            .collect();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                let shared = oscillators.clone();
                device.build_output_stream(
                    &config.into(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut locked: Vec<_> = shared
                            .iter()
                            .map(|osc| match osc.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            })
                            .collect();

                        for frame in data.chunks_mut(channels.max(1)) {
                            let mixed: f32 =
                                locked.iter_mut().map(|osc| osc.sample()).sum::<f32>() * 0.2;
                            for sample in frame.iter_mut() {
                                *sample = mixed;
                            }
                        }
                    },
                    |err| log::error!("audio stream error: {}", err),
                    None,
                )?
            }
            other => return Err(ToneGeneratorError::UnsupportedSampleFormat(other)),
        };

        stream.play()?;
        log::info!(
            "audio output running at {} Hz with {} oscillator(s)",
            sample_rate,
            oscillators.len()
        );

        Ok(Self {
            _stream: stream,
            oscillators,
        })
    }

    pub fn voices(&self) -> usize {
        self.oscillators.len()
    }

    pub fn oscillators(&self) -> Vec<OscillatorHandle> {
        self.oscillators
            .iter()
            .map(|osc| OscillatorHandle {
                oscillator: Arc::clone(osc),
            })
            .collect()
    }
}

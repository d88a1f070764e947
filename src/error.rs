/// Error types for the hardware-facing collaborators.
///
/// The sequencing core never fails; only opening an audio stream or a MIDI port can.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToneGeneratorError {
    #[error("no default audio output device")]
    NoOutputDevice,
    #[error("failed to query output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("unsupported sample format: {0:?}")]
    UnsupportedSampleFormat(cpal::SampleFormat),
    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

#[derive(Error, Debug)]
pub enum MidiError {
    #[error("failed to create MIDI output: {0}")]
    Init(#[from] midir::InitError),
    #[error("invalid port index {0}")]
    InvalidPort(usize),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("failed to send message: {0}")]
    Send(#[from] midir::SendError),
}

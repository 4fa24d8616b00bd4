//! The one error type that every fallible part of PopOnBeat returns.

use crate::gui::GuiError;
use thiserror::Error;

/// Everything that can go wrong between opening the WAV file and the last
/// redraw.
#[derive(Error, Debug)]
pub enum PopError {
    /// The onset envelope was entirely silent, so it cannot be normalized.
    #[error("onset envelope is silent, refusing to divide by zero")]
    DivisionByZero,

    /// The audio cannot be analysed or played as given.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    /// The sensor stopped answering, either by disconnecting or timing out.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(std::io::Error),

    /// No usable audio output device.
    #[error("audio device error: {0}")]
    AudioDevice(String),

    /// A configuration value makes the loop impossible to run.
    #[error("bad configuration: {0}")]
    Config(String),

    /// The RON config file could not be parsed.
    #[error("could not parse config file: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Reading the WAV file failed.
    #[error("wav error: {0}")]
    Hound(#[from] hound::Error),

    /// Terminal drawing failed.
    #[error("display error: {0}")]
    Gui(#[from] GuiError),

    /// Any other IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

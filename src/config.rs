//! Run-time parameters for a PopOnBeat session.
//!
//! Everything the loop needs is collected into a [`SyncConfig`], which can
//! be written by hand as a [ron] file. Every field has a default, so a file
//! only needs to mention what it changes:
//!
//! ```text
//! (
//!     audio_path: Some("West_Bubbles.wav"),
//!     serial: (port: Some("/dev/ttyUSB0")),
//!     force_policy: PerIteration,
//! )
//! ```

use crate::error::PopError;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

/// Which channel of a stereo file feeds the onset analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
pub enum Channel {
    /// Channel 0
    Left,
    /// Channel 1
    Right,
}

impl Channel {
    /// The interleaved index of this channel in a file with `channels`
    /// channels. Mono files only have channel 0.
    pub fn index(self, channels: u16) -> usize {
        match self {
            Channel::Right if channels > 1 => 1,
            _ => 0,
        }
    }
}

/// How many force values get appended per loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
pub enum ForcePolicy {
    /// One copy of the force per envelope frame elapsed, so both plots
    /// scroll at the same speed.
    PerFrame,
    /// Exactly one force value per iteration, regardless of elapsed frames.
    PerIteration,
}

/// Whether the sensor is read on the loop's own thread or on a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ConcurrencyMode {
    /// Audio write, sensor read and redraw happen one after the other.
    Lockstep,
    /// The sensor read for the next iteration overlaps the audio write.
    Threaded,
}

/// Parameters of the onset-strength analysis.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// STFT window length in samples
    pub n_fft: usize,
    /// Samples between successive analysis frames
    pub hop_length: usize,
    /// Number of mel bands
    pub n_mels: usize,
    /// Frame lag used for the spectral difference
    pub lag: usize,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            lag: 1,
        }
    }
}

/// Where and how to talk to the force sensor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`. `None` asks the user.
    pub port: Option<String>,
    /// Line speed
    pub baud_rate: u32,
    /// How long a single line read may block before the sensor is declared
    /// unavailable
    pub timeout_ms: u64,
}

impl SerialSettings {
    /// The read timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: 19200,
            timeout_ms: 2000,
        }
    }
}

/// All parameters of a sync session.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncConfig {
    /// WAV file to play and analyse
    pub audio_path: Option<String>,
    /// Sensor transport settings
    pub serial: SerialSettings,
    /// Frames read from the audio source per iteration
    pub chunk: usize,
    /// Onset analysis settings
    pub onset: OnsetConfig,
    /// Channel used for onset analysis
    pub channel: Channel,
    /// Points kept in the sensor plot
    pub sensor_capacity: usize,
    /// Points kept in the onset plot
    pub onset_capacity: usize,
    /// Upper bound of the sensor plot's y axis
    pub sensor_max: f64,
    /// How sensor readings are spread over elapsed frames
    pub force_policy: ForcePolicy,
    /// Where the sensor gets read
    pub mode: ConcurrencyMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            audio_path: None,
            serial: SerialSettings::default(),
            chunk: 2048,
            onset: OnsetConfig::default(),
            channel: Channel::Right,
            sensor_capacity: 50,
            onset_capacity: 86,
            sensor_max: 1023.0,
            force_policy: ForcePolicy::PerFrame,
            mode: ConcurrencyMode::Lockstep,
        }
    }
}

impl SyncConfig {
    /// Parse a config from RON text.
    pub fn from_ron(text: &str) -> Result<Self, PopError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PopError> {
        let text = fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// Reject parameter combinations the loop cannot run with.
    pub fn validate(&self) -> Result<(), PopError> {
        if self.chunk == 0 {
            return Err(PopError::Config("chunk must be at least one frame".into()));
        }
        if self.onset.hop_length == 0 {
            return Err(PopError::Config("hop_length must be positive".into()));
        }
        if self.onset.n_fft < self.onset.hop_length {
            return Err(PopError::Config(format!(
                "n_fft ({}) must not be shorter than hop_length ({})",
                self.onset.n_fft, self.onset.hop_length
            )));
        }
        if self.onset.n_mels == 0 {
            return Err(PopError::Config("n_mels must be positive".into()));
        }
        if self.sensor_capacity == 0 || self.onset_capacity == 0 {
            return Err(PopError::Config("plot capacities must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_bench_setup() {
        let config = SyncConfig::default();
        assert_eq!(config.chunk, 2048);
        assert_eq!(config.onset.hop_length, 512);
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.sensor_capacity, 50);
        assert_eq!(config.onset_capacity, 86);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_ron_keeps_defaults() {
        let text = r#"(
            audio_path: Some("song.wav"),
            serial: (port: Some("/dev/ttyUSB0")),
            force_policy: PerIteration,
        )"#;
        let config = SyncConfig::from_ron(text).unwrap();
        assert_eq!(config.audio_path.as_deref(), Some("song.wav"));
        assert_eq!(config.serial.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.serial.baud_rate, 19200);
        assert_eq!(config.force_policy, ForcePolicy::PerIteration);
        assert_eq!(config.chunk, 2048);
    }

    #[test]
    fn garbage_ron_is_an_error() {
        assert!(matches!(
            SyncConfig::from_ron("(chunk: \"lots\")"),
            Err(PopError::ConfigParse(_))
        ));
    }

    #[test]
    fn zero_hop_is_rejected() {
        let mut config = SyncConfig::default();
        config.onset.hop_length = 0;
        assert!(matches!(config.validate(), Err(PopError::Config(_))));
    }

    #[test]
    fn right_channel_of_mono_is_channel_zero() {
        assert_eq!(Channel::Right.index(1), 0);
        assert_eq!(Channel::Right.index(2), 1);
        assert_eq!(Channel::Left.index(2), 0);
    }
}

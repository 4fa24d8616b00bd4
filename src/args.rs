//! Commandline argument parser using clap for PopOnBeat

use crate::config::{Channel, ConcurrencyMode, ForcePolicy, SyncConfig};
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
/// Play a song and plot its beat against a force sensor
pub struct PopArgs {
    #[command(subcommand)]
    /// What to do
    pub command: CommandTask,
}

/// The `popbeat` subcommands.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Play a WAV file and plot its onsets next to live sensor readings
    #[command(about)]
    Run(RunCommand),

    /// Compute a WAV file's onset envelope and summarise it
    #[command(about)]
    Envelope(EnvelopeCommand),

    /// List the serial ports
    #[command(about)]
    Ports,
}

/// Arguments of `popbeat run`. Anything given here overrides the config file.
#[derive(Debug, Args, Clone, Default)]
pub struct RunCommand {
    /// RON config file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// WAV file to play
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,

    /// Serial port of the sensor; asks interactively when neither this nor
    /// the config names one
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Baud rate of the sensor
    #[arg(short = 'b', long = "baud")]
    pub baud: Option<u32>,

    /// Frames played per iteration
    #[arg(long)]
    pub chunk: Option<usize>,

    /// Samples per onset frame
    #[arg(long)]
    pub hop: Option<usize>,

    /// Channel to analyse
    #[arg(long, value_enum)]
    pub channel: Option<Channel>,

    /// How force readings are spread over elapsed frames
    #[arg(long, value_enum)]
    pub policy: Option<ForcePolicy>,

    /// Read the sensor on a worker thread
    #[arg(long)]
    pub threaded: bool,

    /// Don't play audio, but keep real-time pacing
    #[arg(long)]
    pub mute: bool,

    /// Use a simulated sensor instead of a serial port
    #[arg(long)]
    pub dummy_sensor: bool,

    /// Lines per second from the simulated sensor
    #[arg(long, requires = "dummy_sensor")]
    pub dummy_rate: Option<f64>,

    /// Chance per line that the simulated sensor starts a pop, 0 to 1
    #[arg(long, requires = "dummy_sensor")]
    pub dummy_pop_chance: Option<f64>,
}

impl RunCommand {
    /// Write the overrides into `config`.
    pub fn apply(&self, config: &mut SyncConfig) {
        if let Some(file) = &self.file {
            config.audio_path = Some(file.clone());
        }
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(chunk) = self.chunk {
            config.chunk = chunk;
        }
        if let Some(hop) = self.hop {
            config.onset.hop_length = hop;
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(policy) = self.policy {
            config.force_policy = policy;
        }
        if self.threaded {
            config.mode = ConcurrencyMode::Threaded;
        }
    }
}

/// Arguments of `popbeat envelope`.
#[derive(Debug, Args, Clone)]
pub struct EnvelopeCommand {
    /// WAV file to analyse
    pub file: String,

    /// Channel to analyse
    #[arg(long, value_enum, default_value = "right")]
    pub channel: Channel,

    /// Samples per onset frame
    #[arg(long, default_value_t = 512)]
    pub hop: usize,

    /// Write every envelope value, one per line, to this file
    #[arg(short = 'o', long = "out")]
    pub out: Option<String>,
}

/// Arguments of the `monitor` binary.
#[derive(Debug, Parser, Clone)]
#[clap(version, about = "Plot a force sensor's readings live")]
pub struct MonitorArgs {
    /// Serial port of the sensor; asks interactively when omitted
    #[arg(short = 'p', long = "port")]
    pub port: Option<String>,

    /// Baud rate of the sensor
    #[arg(short = 'b', long = "baud", default_value_t = 19200)]
    pub baud: u32,

    /// Points shown on the plot
    #[arg(short = 'n', long = "points", default_value_t = 50)]
    pub points: usize,

    /// Read timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,

    /// Use a simulated sensor instead of a serial port
    #[arg(long)]
    pub dummy_sensor: bool,

    /// Lines per second from the simulated sensor
    #[arg(long, requires = "dummy_sensor")]
    pub dummy_rate: Option<f64>,

    /// Chance per line that the simulated sensor starts a pop, 0 to 1
    #[arg(long, requires = "dummy_sensor")]
    pub dummy_pop_chance: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_overrides_config() {
        let args = PopArgs::try_parse_from([
            "popbeat", "run", "-f", "song.wav", "-p", "COM3", "--hop", "256", "--channel", "left",
            "--policy", "per-iteration", "--threaded",
        ])
        .unwrap();
        let CommandTask::Run(run) = args.command else {
            panic!("expected run");
        };
        let mut config = SyncConfig::default();
        run.apply(&mut config);
        assert_eq!(config.audio_path.as_deref(), Some("song.wav"));
        assert_eq!(config.serial.port.as_deref(), Some("COM3"));
        assert_eq!(config.onset.hop_length, 256);
        assert_eq!(config.channel, Channel::Left);
        assert_eq!(config.force_policy, ForcePolicy::PerIteration);
        assert_eq!(config.mode, ConcurrencyMode::Threaded);
        assert_eq!(config.chunk, 2048);
    }

    #[test]
    fn envelope_defaults() {
        let args = PopArgs::try_parse_from(["popbeat", "envelope", "song.wav"]).unwrap();
        let CommandTask::Envelope(env) = args.command else {
            panic!("expected envelope");
        };
        assert_eq!(env.channel, Channel::Right);
        assert_eq!(env.hop, 512);
        assert!(env.out.is_none());
    }

    #[test]
    fn monitor_defaults() {
        let args = MonitorArgs::try_parse_from(["monitor", "--dummy-sensor"]).unwrap();
        assert_eq!(args.baud, 19200);
        assert_eq!(args.points, 50);
        assert!(args.dummy_sensor);
        assert!(args.dummy_rate.is_none());
    }

    #[test]
    fn dummy_rate_needs_the_dummy_sensor() {
        let args = PopArgs::try_parse_from([
            "popbeat", "run", "--dummy-sensor", "--dummy-rate", "10", "--dummy-pop-chance", "0.5",
        ])
        .unwrap();
        let CommandTask::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.dummy_rate, Some(10.0));
        assert_eq!(run.dummy_pop_chance, Some(0.5));
        assert!(MonitorArgs::try_parse_from(["monitor", "--dummy-rate", "10"]).is_err());
    }
}

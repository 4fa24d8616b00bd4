//! Pull-based access to the audio being played, chunk by chunk.
//!
//! [`WavSource`] wraps [hound]'s reader. It is the only source the binaries
//! use; [`BufferSource`] serves synthetic audio from memory.

use crate::config::Channel;
use crate::error::PopError;

use hound::{SampleFormat, WavReader};
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The shape of the audio a source delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpec {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channels per frame
    pub channels: u16,
    /// Bit depth of the stored samples
    pub bits_per_sample: u16,
    /// Length of the whole track, in frames
    pub total_frames: usize,
}

impl AudioSpec {
    /// Track duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / f64::from(self.sample_rate.max(1))
    }
}

/// A block of interleaved samples, scaled to `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AudioChunk {
    /// Interleaved channels per frame
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<f32>,
}

impl AudioChunk {
    /// Number of whole frames in the chunk.
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// True once the source is exhausted.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A rewindable stream of audio frames.
pub trait AudioSource {
    /// The format of the track.
    fn spec(&self) -> AudioSpec;

    /// Read up to `frames` frames. An empty chunk means the track is over.
    fn read_chunk(&mut self, frames: usize) -> Result<AudioChunk, PopError>;

    /// Go back to the first frame.
    fn rewind(&mut self) -> Result<(), PopError>;

    /// Frames handed out since the last rewind.
    fn position(&self) -> usize;
}

/// A WAV file on disk.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    spec: AudioSpec,
    format: SampleFormat,
    position: usize,
}

impl WavSource {
    /// Open `path` and read its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PopError> {
        let reader = WavReader::open(path.as_ref())?;
        let wav_spec = reader.spec();
        if wav_spec.channels == 0 {
            return Err(PopError::InvalidAudio("wav file has no channels".into()));
        }
        let spec = AudioSpec {
            sample_rate: wav_spec.sample_rate,
            channels: wav_spec.channels,
            bits_per_sample: wav_spec.bits_per_sample,
            total_frames: reader.duration() as usize,
        };
        info!(
            "Opened {}: {} Hz, {} ch, {} bit, {:.1} s",
            path.as_ref().display(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            spec.duration_secs()
        );
        Ok(Self {
            reader,
            spec,
            format: wav_spec.sample_format,
            position: 0,
        })
    }
}

impl AudioSource for WavSource {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn read_chunk(&mut self, frames: usize) -> Result<AudioChunk, PopError> {
        let wanted = frames * self.spec.channels as usize;
        let samples = match self.format {
            SampleFormat::Float => self
                .reader
                .samples::<f32>()
                .take(wanted)
                .collect::<Result<Vec<f32>, hound::Error>>()?,
            SampleFormat::Int => {
                let scale = int_scale(self.spec.bits_per_sample);
                self.reader
                    .samples::<i32>()
                    .take(wanted)
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<Vec<f32>, hound::Error>>()?
            }
        };
        let chunk = AudioChunk {
            channels: self.spec.channels,
            samples,
        };
        self.position += chunk.frames();
        Ok(chunk)
    }

    fn rewind(&mut self) -> Result<(), PopError> {
        self.reader.seek(0)?;
        self.position = 0;
        Ok(())
    }

    fn position(&self) -> usize {
        self.position
    }
}

/// Audio held in memory, interleaved and already scaled.
#[derive(Debug, Clone)]
pub struct BufferSource {
    spec: AudioSpec,
    samples: Vec<f32>,
    position: usize,
}

impl BufferSource {
    /// Serve `samples` as `channels`-channel audio at `sample_rate`.
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            spec: AudioSpec {
                sample_rate,
                channels,
                bits_per_sample: 32,
                total_frames: samples.len() / channels as usize,
            },
            samples,
            position: 0,
        }
    }
}

impl AudioSource for BufferSource {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn read_chunk(&mut self, frames: usize) -> Result<AudioChunk, PopError> {
        let channels = self.spec.channels as usize;
        let end = (self.position + frames).min(self.spec.total_frames);
        let samples = self.samples[self.position * channels..end * channels].to_vec();
        self.position = end;
        Ok(AudioChunk {
            channels: self.spec.channels,
            samples,
        })
    }

    fn rewind(&mut self) -> Result<(), PopError> {
        self.position = 0;
        Ok(())
    }

    fn position(&self) -> usize {
        self.position
    }
}

fn int_scale(bits_per_sample: u16) -> f32 {
    1.0 / (1u64 << (bits_per_sample.clamp(1, 32) - 1)) as f32
}

/// Read the whole track and keep one channel of it, for analysis. The
/// source is rewound before and after.
pub fn read_waveform<S: AudioSource + ?Sized>(
    source: &mut S,
    channel: Channel,
) -> Result<Vec<f32>, PopError> {
    let spec = source.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(PopError::InvalidAudio("audio has no channels".into()));
    }
    let index = channel.index(spec.channels);

    source.rewind()?;
    let mut waveform = Vec::with_capacity(spec.total_frames);
    loop {
        let chunk = source.read_chunk(1 << 16)?;
        if chunk.is_empty() {
            break;
        }
        waveform.extend(chunk.samples.iter().skip(index).step_by(channels));
    }
    source.rewind()?;
    Ok(waveform)
}

//! Playback of the chunks the sync loop pulls from its source.

use crate::audio_source::{AudioChunk, AudioSpec};
use crate::error::PopError;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// How long `write` waits on a device that has stopped pulling samples.
const WRITE_STALL: Duration = Duration::from_secs(2);

/// Somewhere to send audio. `write` blocks for roughly as long as the chunk
/// takes to play, which is what paces the loop.
pub trait AudioSink {
    /// Queue a chunk for playback.
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), PopError>;

    /// Let queued audio finish and release the device.
    fn close(&mut self) -> Result<(), PopError> {
        Ok(())
    }
}

impl<K: AudioSink + ?Sized> AudioSink for Box<K> {
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), PopError> {
        (**self).write(chunk)
    }

    fn close(&mut self) -> Result<(), PopError> {
        (**self).close()
    }
}

type SampleQueue = Arc<(Mutex<VecDeque<f32>>, Condvar)>;

/// The default output device, fed through a shared sample queue. The device
/// callback only ever touches that queue.
pub struct CpalSink {
    stream: Option<cpal::Stream>,
    queue: SampleQueue,
    high_water: usize,
}

impl CpalSink {
    /// Open the default output device for audio of the given shape. Fails
    /// before any playback if there is no device or it refuses the format.
    pub fn open(bits_per_sample: u16, channels: u16, sample_rate: u32) -> Result<Self, PopError> {
        if bits_per_sample == 0 || bits_per_sample > 32 || channels == 0 {
            return Err(PopError::InvalidAudio(format!(
                "cannot play {} channel(s) of {} bit audio",
                channels, bits_per_sample
            )));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PopError::AudioDevice("no audio output device found".into()))?;
        let config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let queue: SampleQueue = Arc::new((Mutex::new(VecDeque::new()), Condvar::new()));
        let callback_queue = Arc::clone(&queue);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let (samples, drained) = &*callback_queue;
                    let mut samples = samples.lock().unwrap();
                    for out in data.iter_mut() {
                        *out = samples.pop_front().unwrap_or(0.0);
                    }
                    drained.notify_all();
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| PopError::AudioDevice(format!("failed to build audio stream: {}", e)))?;
        stream
            .play()
            .map_err(|e| PopError::AudioDevice(format!("failed to start audio stream: {}", e)))?;

        info!(
            "Audio: {} @ {} Hz, {} ch",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            sample_rate,
            channels
        );

        Ok(Self {
            stream: Some(stream),
            queue,
            high_water: 0,
        })
    }

    /// Open a sink matching `spec`.
    pub fn for_spec(spec: &AudioSpec) -> Result<Self, PopError> {
        Self::open(spec.bits_per_sample, spec.channels, spec.sample_rate)
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), PopError> {
        // Two chunks in flight keeps the device fed without running ahead.
        self.high_water = self.high_water.max(2 * chunk.samples.len());

        let (samples, drained) = &*self.queue;
        let mut queued = samples.lock().unwrap();
        queued.extend(chunk.samples.iter().copied());
        while queued.len() > self.high_water {
            let (guard, wait) = drained.wait_timeout(queued, WRITE_STALL).unwrap();
            queued = guard;
            if wait.timed_out() && queued.len() > self.high_water {
                return Err(PopError::AudioDevice(
                    "audio device stopped consuming samples".into(),
                ));
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), PopError> {
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        let (samples, drained) = &*self.queue;
        let mut queued = samples.lock().unwrap();
        while !queued.is_empty() {
            let (guard, wait) = drained.wait_timeout(queued, WRITE_STALL).unwrap();
            queued = guard;
            if wait.timed_out() {
                warn!("Dropping {} unplayed samples", queued.len());
                queued.clear();
            }
        }
        drop(queued);
        if let Err(e) = stream.pause() {
            warn!("Could not pause audio stream: {}", e);
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Audio sink did not close cleanly: {}", e);
        }
    }
}

/// Discards audio but takes as long as playing it would, so a muted run
/// scrolls at the real speed.
#[derive(Debug, Clone)]
pub struct NullSink {
    sample_rate: u32,
}

impl NullSink {
    /// A silent sink for audio at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
        }
    }

    /// How long `chunk` would take to play.
    pub fn play_time(&self, chunk: &AudioChunk) -> Duration {
        Duration::from_secs_f64(chunk.frames() as f64 / f64::from(self.sample_rate))
    }
}

impl AudioSink for NullSink {
    fn write(&mut self, chunk: &AudioChunk) -> Result<(), PopError> {
        spin_sleep::sleep(self.play_time(chunk));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn chunk(frames: usize) -> AudioChunk {
        AudioChunk {
            channels: 2,
            samples: vec![0.0; frames * 2],
        }
    }

    #[test]
    fn null_sink_takes_real_time() {
        let mut sink = NullSink::new(1000);
        assert_eq!(sink.play_time(&chunk(50)), Duration::from_millis(50));
        let start = Instant::now();
        sink.write(&chunk(20)).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn nonsense_formats_are_rejected_before_touching_a_device() {
        assert!(matches!(
            CpalSink::open(0, 2, 44100),
            Err(PopError::InvalidAudio(_))
        ));
        assert!(matches!(
            CpalSink::open(16, 0, 44100),
            Err(PopError::InvalidAudio(_))
        ));
    }
}

//! The coordinator that keeps playback, the onset envelope and the sensor
//! in step.
//!
//! Every iteration plays one chunk of audio, works out how many envelope
//! frames that chunk moved the playhead, and appends exactly that stretch
//! of envelope to the onset plot, together with the latest force reading,
//! to the sensor plot. The audio sink's blocking write sets the pace.

use crate::audio_sink::AudioSink;
use crate::audio_source::AudioSource;
use crate::config::{ForcePolicy, SyncConfig};
use crate::envelope::Envelope;
use crate::error::PopError;
use crate::rolling_buffer::RollingBuffer;
use crate::sensor::SensorTransport;
use crate::sensor_line::ForceReading;

use log::{debug, info};

/// What the display wants after a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// Keep going
    Continue,
    /// The user asked to stop
    Quit,
}

/// Two line plots, one for force and one for onset strength.
pub trait PlotSurface {
    /// Replace the force plot's data.
    fn set_sensor(&mut self, data: &RollingBuffer);
    /// Replace the onset plot's data.
    fn set_onset(&mut self, data: &RollingBuffer);
    /// Draw both plots now.
    fn request_redraw(&mut self) -> Result<DisplayEvent, PopError>;
}

impl<D: PlotSurface + ?Sized> PlotSurface for Box<D> {
    fn set_sensor(&mut self, data: &RollingBuffer) {
        (**self).set_sensor(data)
    }
    fn set_onset(&mut self, data: &RollingBuffer) {
        (**self).set_onset(data)
    }
    fn request_redraw(&mut self) -> Result<DisplayEvent, PopError> {
        (**self).request_redraw()
    }
}

/// Whether the loop has more to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Audio remains
    Running,
    /// Audio exhausted, or the user quit
    Stopped,
}

/// Where the loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cursors {
    /// Audio frames played since the start
    pub audio_frame: usize,
    /// Envelope frame reached, always `audio_frame / hop_length`
    pub envelope_index: usize,
    /// Sensor lines consumed
    pub sensor_samples: usize,
}

/// Plays a track while plotting its onset envelope next to live sensor
/// readings.
pub struct SyncLoop<S, K, T> {
    source: S,
    sink: K,
    sensor: T,
    envelope: Envelope,
    chunk: usize,
    hop_length: usize,
    force_policy: ForcePolicy,
    sensor_plot: RollingBuffer,
    onset_plot: RollingBuffer,
    cursors: Cursors,
    force: u32,
    malformed: usize,
    state: SyncState,
}

impl<S, K, T> SyncLoop<S, K, T>
where
    S: AudioSource,
    K: AudioSink,
    T: SensorTransport,
{
    /// Wire the loop together. The envelope must come from the same track
    /// as `source`, analysed with `config.onset.hop_length`.
    pub fn new(
        config: &SyncConfig,
        source: S,
        sink: K,
        sensor: T,
        envelope: Envelope,
    ) -> Result<Self, PopError> {
        config.validate()?;
        if envelope.hop_length() != config.onset.hop_length {
            return Err(PopError::Config(format!(
                "envelope hop {} does not match configured hop {}",
                envelope.hop_length(),
                config.onset.hop_length
            )));
        }
        Ok(Self {
            source,
            sink,
            sensor,
            envelope,
            chunk: config.chunk,
            hop_length: config.onset.hop_length,
            force_policy: config.force_policy,
            sensor_plot: RollingBuffer::new(config.sensor_capacity),
            onset_plot: RollingBuffer::new(config.onset_capacity),
            cursors: Cursors::default(),
            force: 0,
            malformed: 0,
            state: SyncState::Running,
        })
    }

    /// Back to the start of the track with empty plots.
    pub fn reset(&mut self) -> Result<(), PopError> {
        self.source.rewind()?;
        self.sensor_plot.reset();
        self.onset_plot.reset();
        self.cursors = Cursors::default();
        self.force = 0;
        self.malformed = 0;
        self.state = SyncState::Running;
        Ok(())
    }

    /// Run one iteration: play a chunk, advance the onset plot by the frames
    /// it covered, take one sensor reading and redraw.
    pub fn step<D: PlotSurface + ?Sized>(&mut self, display: &mut D) -> Result<SyncState, PopError> {
        if self.state == SyncState::Stopped {
            return Ok(SyncState::Stopped);
        }

        let chunk = self.source.read_chunk(self.chunk)?;
        if chunk.is_empty() {
            self.state = SyncState::Stopped;
            return Ok(SyncState::Stopped);
        }
        self.sink.write(&chunk)?;

        let prev_frame = self.cursors.envelope_index;
        let audio_frame = self.source.position();
        let new_frame = audio_frame / self.hop_length;
        let delta = new_frame - prev_frame;

        let onsets = self.envelope.slice(prev_frame, delta);
        self.onset_plot.extend(onsets.iter().map(|&v| f64::from(v)));

        let line = self.sensor.read_line()?;
        match line.parse::<ForceReading>() {
            Ok(ForceReading(force)) => self.force = force,
            Err(e) => {
                self.malformed += 1;
                debug!("Keeping force {} over malformed line {:?}: {:?}", self.force, line, e.code);
            }
        }
        let copies = match self.force_policy {
            ForcePolicy::PerFrame => delta,
            ForcePolicy::PerIteration => 1,
        };
        self.sensor_plot.push_repeated(f64::from(self.force), copies);

        self.cursors = Cursors {
            audio_frame,
            envelope_index: new_frame,
            sensor_samples: self.cursors.sensor_samples + 1,
        };

        display.set_sensor(&self.sensor_plot);
        display.set_onset(&self.onset_plot);
        if display.request_redraw()? == DisplayEvent::Quit {
            info!("Stopped by user at frame {}", self.cursors.audio_frame);
            self.state = SyncState::Stopped;
        }
        Ok(self.state)
    }

    /// Play the whole track from the start.
    pub fn run<D: PlotSurface + ?Sized>(&mut self, display: &mut D) -> Result<Cursors, PopError> {
        self.reset()?;
        info!(
            "Playing {} frames in chunks of {}",
            self.source.spec().total_frames,
            self.chunk
        );
        while self.step(display)? == SyncState::Running {}
        info!(
            "Done: {} frames, {} sensor lines ({} malformed)",
            self.cursors.audio_frame, self.cursors.sensor_samples, self.malformed
        );
        Ok(self.cursors)
    }

    /// Shut the audio sink down, letting queued audio finish.
    pub fn close(&mut self) -> Result<(), PopError> {
        self.sink.close()
    }

    /// Current cursor values.
    pub fn cursors(&self) -> Cursors {
        self.cursors
    }

    /// The most recent valid force reading.
    pub fn force(&self) -> u32 {
        self.force
    }

    /// The force plot's window.
    pub fn sensor_plot(&self) -> &RollingBuffer {
        &self.sensor_plot
    }

    /// The onset plot's window.
    pub fn onset_plot(&self) -> &RollingBuffer {
        &self.onset_plot
    }

    /// Whether the loop has finished.
    pub fn state(&self) -> SyncState {
        self.state
    }
}

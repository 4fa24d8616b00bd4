//! Onset-strength envelope of a track, computed once before playback.
//!
//! The envelope is the mean positive change, frame to frame, of a
//! log-power mel spectrogram. That is the spectral-flux onset strength used
//! by librosa, with its defaults: a centred Hann STFT, 128 Slaney mel bands,
//! `power_to_db` with an 80 dB floor, and a lag of one frame.

use crate::audio_source::{read_waveform, AudioSource};
use crate::config::{Channel, OnsetConfig};
use crate::error::PopError;

use log::{debug, info};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

const AMIN: f32 = 1e-10;
const TOP_DB: f32 = 80.0;

/// One triangular mel filter, stored as the run of FFT bins it covers.
struct MelBand {
    start: usize,
    weights: Vec<f32>,
}

fn hz_to_mel(hz: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if hz >= min_log_hz {
        min_log_mel + (hz / min_log_hz).ln() / logstep
    } else {
        hz / f_sp
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f64.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * (logstep * (mel - min_log_mel)).exp()
    } else {
        mel * f_sp
    }
}

/// Slaney-normalised mel filterbank from 0 Hz to Nyquist.
fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize) -> Vec<MelBand> {
    let n_bins = n_fft / 2 + 1;
    let nyquist = f64::from(sample_rate) / 2.0;
    let max_mel = hz_to_mel(nyquist);
    let mel_f: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();
    let bin_hz = |k: usize| k as f64 * f64::from(sample_rate) / n_fft as f64;

    (0..n_mels)
        .map(|m| {
            let (lo, centre, hi) = (mel_f[m], mel_f[m + 1], mel_f[m + 2]);
            let enorm = 2.0 / (hi - lo);
            let weights: Vec<(usize, f32)> = (0..n_bins)
                .filter_map(|k| {
                    let f = bin_hz(k);
                    let lower = (f - lo) / (centre - lo);
                    let upper = (hi - f) / (hi - centre);
                    let w = lower.min(upper);
                    (w > 0.0).then(|| (k, (w * enorm) as f32))
                })
                .collect();
            MelBand {
                start: weights.first().map_or(0, |&(k, _)| k),
                weights: weights.into_iter().map(|(_, w)| w).collect(),
            }
        })
        .collect()
}

/// Periodic Hann window of length `size`.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / size as f32).cos())
        .collect()
}

/// Log-power mel spectrogram, one row of `n_mels` values per frame.
fn log_mel_spectrogram(waveform: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<Vec<f32>> {
    let n_fft = config.n_fft;
    let hop = config.hop_length;
    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; (waveform.len() + 2 * pad).max(n_fft)];
    padded[pad..pad + waveform.len()].copy_from_slice(waveform);
    let n_frames = 1 + (padded.len() - n_fft) / hop;

    let window = hann_window(n_fft);
    let bands = mel_filterbank(sample_rate, n_fft, config.n_mels);
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
    let mut power = vec![0.0f32; n_fft / 2 + 1];

    let mut spectrogram: Vec<Vec<f32>> = (0..n_frames)
        .map(|t| {
            let frame = &padded[t * hop..t * hop + n_fft];
            for ((slot, &x), &w) in buffer.iter_mut().zip(frame).zip(&window) {
                *slot = Complex::new(x * w, 0.0);
            }
            fft.process(&mut buffer);
            for (p, c) in power.iter_mut().zip(&buffer) {
                *p = c.norm_sqr();
            }
            bands
                .iter()
                .map(|band| {
                    let mel: f32 = band
                        .weights
                        .iter()
                        .zip(&power[band.start..])
                        .map(|(w, p)| w * p)
                        .sum();
                    10.0 * mel.max(AMIN).log10()
                })
                .collect()
        })
        .collect();

    let max_db = spectrogram
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = max_db - TOP_DB;
    spectrogram
        .iter_mut()
        .flatten()
        .for_each(|db| *db = db.max(floor));
    spectrogram
}

/// Onset strength of `waveform`, one non-negative value per hop-length
/// frame (`1 + len / hop_length` frames), averaged across mel bands.
///
/// An `OnsetConfig` with a zero hop, a zero mel count, or an FFT shorter
/// than the hop is rejected with [`PopError::InvalidAudio`].
pub fn onset_strength(
    waveform: &[f32],
    sample_rate: u32,
    config: &OnsetConfig,
) -> Result<Vec<f32>, PopError> {
    if config.hop_length == 0 || config.n_fft < config.hop_length || config.n_mels == 0 {
        return Err(PopError::InvalidAudio(format!(
            "cannot analyse with n_fft {}, hop {} and {} mel bands",
            config.n_fft, config.hop_length, config.n_mels
        )));
    }
    let spectrogram = log_mel_spectrogram(waveform, sample_rate, config);
    let n_frames = spectrogram.len();
    let lag = config.lag.max(1);

    let flux = (lag..n_frames).map(|t| {
        let (now, before) = (&spectrogram[t], &spectrogram[t - lag]);
        let sum: f32 = now
            .iter()
            .zip(before)
            .map(|(a, b)| (a - b).max(0.0))
            .sum();
        sum / now.len() as f32
    });

    let pad = lag + config.n_fft / (2 * config.hop_length);
    let mut envelope: Vec<f32> = std::iter::repeat(0.0).take(pad).chain(flux).collect();
    envelope.resize(n_frames, 0.0);
    debug!("Onset strength: {} frames", envelope.len());
    Ok(envelope)
}

/// Summary figures for an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeStats {
    /// Number of frames
    pub frames: usize,
    /// Mean strength
    pub mean: f32,
    /// Frame with the strongest onset
    pub peak_frame: usize,
    /// Time of the strongest onset, in seconds
    pub peak_secs: f64,
}

/// A normalised onset envelope: maximum exactly 1.0, all values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    values: Vec<f32>,
    hop_length: usize,
}

impl Envelope {
    /// Normalise a raw envelope by its maximum. A silent envelope cannot be
    /// normalised and yields [`PopError::DivisionByZero`].
    pub fn normalized(raw: Vec<f32>, hop_length: usize) -> Result<Self, PopError> {
        if raw.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(PopError::InvalidAudio(
                "onset envelope has negative or non-finite values".into(),
            ));
        }
        let max = raw.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Err(PopError::DivisionByZero);
        }
        Ok(Self {
            values: raw.into_iter().map(|v| v / max).collect(),
            hop_length,
        })
    }

    /// Read one channel of `source`, analyse it and normalise the result.
    /// The source is left rewound.
    pub fn compute<S: AudioSource + ?Sized>(
        source: &mut S,
        channel: Channel,
        config: &OnsetConfig,
    ) -> Result<Self, PopError> {
        let sample_rate = source.spec().sample_rate;
        let waveform = read_waveform(source, channel)?;
        let envelope = Self::normalized(
            onset_strength(&waveform, sample_rate, config)?,
            config.hop_length,
        )?;
        info!(
            "Onset envelope: {} frames of {} samples",
            envelope.len(),
            config.hop_length
        );
        Ok(envelope)
    }

    /// Up to `count` values starting at frame `start`. Near the end of the
    /// track the slice is shorter, or empty.
    pub fn slice(&self, start: usize, count: usize) -> &[f32] {
        let start = start.min(self.values.len());
        let end = start.saturating_add(count).min(self.values.len());
        &self.values[start..end]
    }

    /// All values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of frames.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for an envelope with no frames.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Samples per frame.
    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Frame count, mean strength and peak position.
    pub fn stats(&self, sample_rate: u32) -> EnvelopeStats {
        let (peak_frame, _) = self
            .values
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
                if v > best.1 {
                    (i, v)
                } else {
                    best
                }
            });
        EnvelopeStats {
            frames: self.values.len(),
            mean: self.values.iter().sum::<f32>() / self.values.len().max(1) as f32,
            peak_frame,
            peak_secs: (peak_frame * self.hop_length) as f64 / f64::from(sample_rate.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_source::BufferSource;

    const SR: u32 = 22050;
    const GAP: usize = 5512;

    fn bursts(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = (i % GAP) as f32;
                let tone = (2.0 * PI * 1000.0 * i as f32 / SR as f32).sin();
                0.8 * tone * (-t / 300.0).exp()
            })
            .collect()
    }

    #[test]
    fn normalized_peaks_at_one() {
        let env = Envelope::normalized(vec![0.5, 2.0, 1.0, 0.0], 512).unwrap();
        assert_eq!(env.values(), &[0.25, 1.0, 0.5, 0.0]);
        let max = env.values().iter().copied().fold(0.0f32, f32::max);
        assert_eq!(max, 1.0);
        assert!(env.values().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn silent_envelope_is_division_by_zero() {
        assert!(matches!(
            Envelope::normalized(vec![0.0; 16], 512),
            Err(PopError::DivisionByZero)
        ));
        assert!(matches!(
            Envelope::normalized(vec![], 512),
            Err(PopError::DivisionByZero)
        ));
    }

    #[test]
    fn negative_or_nan_strength_is_invalid() {
        assert!(matches!(
            Envelope::normalized(vec![0.5, -0.1], 512),
            Err(PopError::InvalidAudio(_))
        ));
        assert!(matches!(
            Envelope::normalized(vec![f32::NAN, 1.0], 512),
            Err(PopError::InvalidAudio(_))
        ));
    }

    #[test]
    fn stats_locate_the_peak() {
        let env = Envelope::normalized(vec![0.0, 1.0, 3.0, 2.0], 512).unwrap();
        let stats = env.stats(1024);
        assert_eq!(stats.frames, 4);
        assert_eq!(stats.peak_frame, 2);
        assert_eq!(stats.peak_secs, 1.0);
        assert!((stats.mean - 0.5).abs() < 1e-6);
    }

    #[test]
    fn slices_clamp_at_the_end() {
        let env = Envelope::normalized(vec![0.1, 0.2, 0.3, 0.4], 512).unwrap();
        assert_eq!(env.slice(0, 2).len(), 2);
        assert_eq!(env.slice(3, 2).len(), 1);
        assert!(env.slice(4, 2).is_empty());
        assert!(env.slice(10, 2).is_empty());
    }

    #[test]
    fn one_value_per_hop() {
        let config = OnsetConfig::default();
        let strength = onset_strength(&bursts(10_000), SR, &config).unwrap();
        assert_eq!(strength.len(), 1 + 10_000 / 512);
        assert!(strength.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn zero_hop_is_invalid_rather_than_a_panic() {
        let config = OnsetConfig {
            hop_length: 0,
            ..OnsetConfig::default()
        };
        assert!(matches!(
            onset_strength(&bursts(4096), SR, &config),
            Err(PopError::InvalidAudio(_))
        ));
        let config = OnsetConfig {
            n_fft: 256,
            ..OnsetConfig::default()
        };
        assert!(matches!(
            onset_strength(&bursts(4096), SR, &config),
            Err(PopError::InvalidAudio(_))
        ));
    }

    #[test]
    fn strongest_onset_lines_up_with_a_burst() {
        let config = OnsetConfig::default();
        let waveform = bursts(4 * GAP);
        let env = Envelope::normalized(onset_strength(&waveform, SR, &config).unwrap(), 512).unwrap();
        let peak = env.stats(SR).peak_frame as f64;
        let burst_frames = (0..4).map(|b| (b * GAP) as f64 / 512.0);
        assert!(
            burst_frames.clone().any(|f| (peak - f).abs() <= 4.0),
            "peak at frame {} not near any of {:?}",
            peak,
            burst_frames.collect::<Vec<_>>()
        );
    }

    #[test]
    fn silent_track_cannot_be_normalized() {
        let mut source = BufferSource::new(vec![0.0; 2 * 8192], 2, SR);
        assert!(matches!(
            Envelope::compute(&mut source, Channel::Right, &OnsetConfig::default()),
            Err(PopError::DivisionByZero)
        ));
    }

    #[test]
    fn filterbank_covers_the_spectrum() {
        let bands = mel_filterbank(SR, 2048, 128);
        assert_eq!(bands.len(), 128);
        assert!(bands.iter().all(|b| b.start <= 1024));
        assert!((hz_to_mel(mel_to_hz(20.0)) - 20.0).abs() < 1e-9);
        assert!((mel_to_hz(hz_to_mel(4000.0)) - 4000.0).abs() < 1e-6);
    }
}

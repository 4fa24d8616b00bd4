//! A stand-in for the force sensor, so the whole loop can run on a laptop
//! with nothing plugged in.

use crate::error::PopError;
use crate::sensor::SensorTransport;

use log::{debug, info};
use rand::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Default number of lines per second, about what the real firmware prints.
pub const DEFAULT_RATE_HZ: f64 = 40.0;

/// A background thread that prints sensor-style lines: a noisy baseline
/// with the occasional decaying pop.
pub struct DummySensor {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    lines: mpsc::Receiver<String>,
    timeout: Duration,
}

enum Signal {
    Rate(f64),
    PopChance(f64),
    Stop,
}

/// The waveform the dummy thread follows.
#[derive(Debug, Clone, Copy)]
struct PopShape {
    baseline: f64,
    noise: f64,
    peak: f64,
    decay: f64,
}

impl Default for PopShape {
    fn default() -> Self {
        Self {
            baseline: 40.0,
            noise: 8.0,
            peak: 900.0,
            decay: 0.6,
        }
    }
}

impl PopShape {
    /// The next level, given the current excess above baseline.
    fn next_level<R: Rng>(&self, excess: &mut f64, pop: bool, rng: &mut R) -> u32 {
        if pop {
            *excess = self.peak - self.baseline;
        } else {
            *excess *= self.decay;
        }
        let level = self.baseline + *excess + rng.gen_range(-self.noise..self.noise);
        level.clamp(0.0, 1023.0).round() as u32
    }
}

impl DummySensor {
    /// Start producing lines. `read_line` gives up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<Signal>();
        let (line_tx, lines) = mpsc::channel::<String>();

        let handle = thread::spawn(move || {
            let mut rng = thread_rng();
            let shape = PopShape::default();
            let mut rate = DEFAULT_RATE_HZ;
            let mut pop_chance = 0.05;
            let mut excess = 0.0;
            let mut sequence: u64 = 0;
            loop {
                while let Ok(received) = rx.try_recv() {
                    match received {
                        Signal::Rate(new_rate) => rate = new_rate,
                        Signal::PopChance(new_chance) => pop_chance = new_chance,
                        Signal::Stop => return,
                    }
                }
                let pop = rng.gen_bool(pop_chance);
                let level = shape.next_level(&mut excess, pop, &mut rng);
                if line_tx.send(format!("{} {}", level, sequence)).is_err() {
                    return;
                }
                sequence += 1;
                spin_sleep::sleep(Duration::from_secs_f64(1.0 / rate));
            }
        });

        info!("Started dummy sensor at {} lines/s", DEFAULT_RATE_HZ);
        DummySensor {
            handle: Some(handle),
            tx,
            lines,
            timeout,
        }
    }

    /// Change how many lines are produced per second.
    pub fn set_rate(&self, rate_hz: f64) {
        if rate_hz > 0.0 {
            let _ = self.tx.send(Signal::Rate(rate_hz));
        }
    }

    /// Change the chance, per line, that a pop starts.
    pub fn set_pop_chance(&self, chance: f64) {
        let _ = self.tx.send(Signal::PopChance(chance.clamp(0.0, 1.0)));
    }

    /// Stop the producing thread and wait for it.
    pub fn stop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.handle.take() {
            let _ = thread.join();
        }
    }
}

impl SensorTransport for DummySensor {
    /// Wait for a line, then skip ahead to the newest one queued, so a reader
    /// slower than the producer still sees current readings.
    fn read_line(&mut self) -> Result<String, PopError> {
        let mut line = self.lines.recv_timeout(self.timeout).map_err(|e| {
            PopError::SensorUnavailable(std::io::Error::new(std::io::ErrorKind::TimedOut, e))
        })?;
        let mut skipped = 0;
        while let Ok(newer) = self.lines.try_recv() {
            line = newer;
            skipped += 1;
        }
        if skipped > 0 {
            debug!("Skipped {} stale dummy sensor lines", skipped);
        }
        Ok(line)
    }
}

impl Drop for DummySensor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor_line::ForceReading;

    #[test]
    fn lines_parse_as_readings() {
        let mut sensor = DummySensor::new(Duration::from_secs(2));
        sensor.set_rate(1000.0);
        for _ in 0..5 {
            let line = sensor.read_line().unwrap();
            let ForceReading(force) = line.parse().unwrap();
            assert!(force <= 1023);
        }
        sensor.stop();
    }

    fn sequence(line: &str) -> u64 {
        line.split_whitespace().nth(1).unwrap().parse().unwrap()
    }

    #[test]
    fn slow_reader_gets_the_newest_line() {
        let mut sensor = DummySensor::new(Duration::from_secs(2));
        sensor.set_rate(200.0);
        let first = sequence(&sensor.read_line().unwrap());
        thread::sleep(Duration::from_millis(300));
        let late = sequence(&sensor.read_line().unwrap());
        assert!(late >= first + 30, "read seq {} after seq {}", late, first);
        let next = sequence(&sensor.read_line().unwrap());
        assert!(next > late && next <= late + 3, "read seq {} after seq {}", next, late);
        sensor.stop();
    }

    #[test]
    fn stopped_sensor_is_unavailable() {
        let mut sensor = DummySensor::new(Duration::from_millis(200));
        sensor.stop();
        let outcome = loop {
            match sensor.read_line() {
                Ok(_) => continue,
                Err(e) => break e,
            }
        };
        assert!(matches!(outcome, PopError::SensorUnavailable(_)));
    }

    #[test]
    fn pops_decay_back_to_baseline() {
        let shape = PopShape {
            noise: 0.001,
            ..PopShape::default()
        };
        let mut rng = thread_rng();
        let mut excess = 0.0;
        let peak = shape.next_level(&mut excess, true, &mut rng);
        assert_eq!(peak, 900);
        let mut level = peak;
        for _ in 0..30 {
            level = shape.next_level(&mut excess, false, &mut rng);
        }
        assert_eq!(level, 40);
    }
}

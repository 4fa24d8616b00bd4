//! PopOnBeat plays a song and, while it plays, plots the song's onset
//! envelope next to the readings of a force sensor. Someone "pops" on the
//! sensor in time with the music, and the two plots show how well the pops
//! line up with the beat.
//!
//! The onset envelope is computed once up front ([`envelope`]). Playback is
//! then driven chunk by chunk by the [`sync_loop`], which keeps the audio
//! playhead, the envelope index and the sensor stream advancing together and
//! feeds the two rolling plots in [`gui`]. The sensor is a serial device
//! speaking a one-reading-per-line protocol ([`sensor`], [`sensor_line`]),
//! or a [`dummy_sensor`] when no hardware is attached.

#![warn(missing_docs)]
pub mod args;
pub mod audio_sink;
pub mod audio_source;
pub mod component;
pub mod config;
pub mod dummy_sensor;
pub mod envelope;
pub mod error;
#[allow(missing_docs)]
pub mod gui;
pub mod rolling_buffer;
pub mod sensor;
pub mod sensor_line;
pub mod sync_loop;

pub use error::PopError;

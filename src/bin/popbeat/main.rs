//! Plays a song while plotting its onset envelope against a force sensor.

use clap::Parser;
use popbeat::{
    args::{CommandTask, EnvelopeCommand, PopArgs, RunCommand},
    audio_sink::{AudioSink, CpalSink, NullSink},
    audio_source::{AudioSource, WavSource},
    component::ThreadedSensor,
    config::{ConcurrencyMode, OnsetConfig, SyncConfig},
    dummy_sensor::DummySensor,
    envelope::Envelope,
    gui::{device_selector, TuiPlots},
    sensor::{available_ports, SensorTransport, SerialSensor},
    sync_loop::SyncLoop,
    PopError,
};

use log::{error, info, warn};
use std::{
    fs::File,
    io::{BufWriter, Write},
    process::ExitCode,
};

// Example:
// cargo run --bin popbeat -- run
//                            --file    West_Bubbles.wav
//                            --port    /dev/ttyUSB0
//                            --baud    19200

fn main() -> ExitCode {
    env_logger::init();
    let args = PopArgs::parse();

    let result = match args.command {
        CommandTask::Run(run) => run_session(&run),
        CommandTask::Envelope(cmd) => summarise_envelope(&cmd),
        CommandTask::Ports => list_ports(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("popbeat: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(run: &RunCommand) -> Result<SyncConfig, PopError> {
    let mut config = match &run.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    run.apply(&mut config);
    config.validate()?;
    Ok(config)
}

/// Open whichever sensor was asked for, asking for a port if none is set.
fn open_sensor(
    config: &mut SyncConfig,
    run: &RunCommand,
) -> Result<Box<dyn SensorTransport + Send>, PopError> {
    if run.dummy_sensor {
        let sensor = DummySensor::new(config.serial.timeout());
        if let Some(rate) = run.dummy_rate {
            sensor.set_rate(rate);
        }
        if let Some(chance) = run.dummy_pop_chance {
            sensor.set_pop_chance(chance);
        }
        return Ok(Box::new(sensor));
    }
    if config.serial.port.is_none() {
        let port = device_selector(available_ports()?)?
            .ok_or_else(|| PopError::Config("no serial port selected".into()))?;
        config.serial.port = Some(port.to_string_lossy().into_owned());
    }
    Ok(Box::new(SerialSensor::open(&config.serial)?))
}

fn run_session(run: &RunCommand) -> Result<(), PopError> {
    let mut config = load_config(run)?;
    let path = config
        .audio_path
        .clone()
        .ok_or_else(|| PopError::Config("no audio file given, use --file".into()))?;

    let mut source = WavSource::open(&path)?;
    let spec = source.spec();
    let envelope = Envelope::compute(&mut source, config.channel, &config.onset)?;

    let sink: Box<dyn AudioSink> = if run.mute {
        Box::new(NullSink::new(spec.sample_rate))
    } else {
        Box::new(CpalSink::for_spec(&spec)?)
    };

    let sensor = open_sensor(&mut config, run)?;
    let sensor: Box<dyn SensorTransport> = match config.mode {
        ConcurrencyMode::Lockstep => sensor,
        ConcurrencyMode::Threaded => {
            Box::new(ThreadedSensor::spawn(sensor, config.serial.timeout()))
        }
    };

    let mut sync = SyncLoop::new(&config, source, sink, sensor, envelope)?;
    let mut display = TuiPlots::open(config.sensor_max, true)?;
    let outcome = sync.run(&mut display);

    if let Err(e) = display.close() {
        warn!("Could not restore the terminal: {}", e);
    }
    sync.close()?;

    let cursors = outcome?;
    info!(
        "Played {:.1} s, read {} sensor lines",
        cursors.audio_frame as f64 / f64::from(spec.sample_rate),
        cursors.sensor_samples
    );
    Ok(())
}

fn summarise_envelope(cmd: &EnvelopeCommand) -> Result<(), PopError> {
    let onset = OnsetConfig {
        hop_length: cmd.hop,
        ..OnsetConfig::default()
    };
    let mut source = WavSource::open(&cmd.file)?;
    let spec = source.spec();
    let envelope = Envelope::compute(&mut source, cmd.channel, &onset)?;
    let stats = envelope.stats(spec.sample_rate);

    println!("{}", cmd.file);
    println!("\tduration:   {:.2} s", spec.duration_secs());
    println!("\tframes:     {} (hop {})", stats.frames, cmd.hop);
    println!("\tmean:       {:.4}", stats.mean);
    println!(
        "\tpeak:       frame {} at {:.3} s",
        stats.peak_frame, stats.peak_secs
    );

    if let Some(out) = &cmd.out {
        let mut writer = BufWriter::new(File::create(out)?);
        for value in envelope.values() {
            writeln!(writer, "{}", value)?;
        }
        writer.flush()?;
        info!("Wrote {} envelope values to {}", envelope.len(), out);
    }
    Ok(())
}

fn list_ports() -> Result<(), PopError> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial devices found");
    }
    for port in ports {
        println!("\t{}", port.to_string_lossy());
    }
    Ok(())
}

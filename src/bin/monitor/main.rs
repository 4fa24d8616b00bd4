use clap::Parser;
use popbeat::{
    args::MonitorArgs,
    config::SerialSettings,
    dummy_sensor::DummySensor,
    gui::{device_selector, TuiPlots},
    rolling_buffer::RollingBuffer,
    sensor::{available_ports, SensorTransport, SerialSensor},
    sensor_line::ForceReading,
    sync_loop::{DisplayEvent, PlotSurface},
    PopError,
};

use log::{debug, error, info};
use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();
    let args = MonitorArgs::parse();

    match monitor(&args) {
        Ok(lines) => {
            info!("Read {} sensor lines", lines);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            eprintln!("monitor: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn monitor(args: &MonitorArgs) -> Result<usize, PopError> {
    let settings = SerialSettings {
        port: args.port.clone(),
        baud_rate: args.baud,
        timeout_ms: args.timeout_ms,
    };
    let mut sensor: Box<dyn SensorTransport> = if args.dummy_sensor {
        let dummy = DummySensor::new(settings.timeout());
        if let Some(rate) = args.dummy_rate {
            dummy.set_rate(rate);
        }
        if let Some(chance) = args.dummy_pop_chance {
            dummy.set_pop_chance(chance);
        }
        Box::new(dummy)
    } else {
        let port = match settings.port.clone() {
            Some(port) => port,
            None => device_selector(available_ports()?)?
                .ok_or_else(|| PopError::Config("no serial port selected".into()))?
                .to_string_lossy()
                .into_owned(),
        };
        Box::new(SerialSensor::open(&SerialSettings {
            port: Some(port),
            ..settings
        })?)
    };

    let mut plot = RollingBuffer::new(args.points.max(1));
    let mut display = TuiPlots::open(1023.0, false)?;
    let mut force = 0;
    let mut lines = 0;

    let outcome = loop {
        let line = match sensor.read_line() {
            Ok(line) => line,
            Err(e) => break Err(e),
        };
        lines += 1;
        match line.parse::<ForceReading>() {
            Ok(ForceReading(f)) => force = f,
            Err(_) => debug!("Ignoring sensor line {:?}", line),
        }
        plot.push(f64::from(force));
        display.set_sensor(&plot);
        match display.request_redraw() {
            Ok(DisplayEvent::Continue) => {}
            Ok(DisplayEvent::Quit) => break Ok(lines),
            Err(e) => break Err(e),
        }
    };

    display.close()?;
    outcome
}

//! The force sensor, as seen through a line-oriented serial transport.

use crate::config::SerialSettings;
use crate::error::PopError;
use crate::sensor_line::LineAssembler;

use log::{debug, info};
use serial2::{CharSize, Parity, SerialPort, Settings, StopBits};
use std::{io, path::PathBuf};

/// Anything that hands out sensor lines, one per call.
pub trait SensorTransport {
    /// Block until the next complete line arrives and return it without its
    /// terminator. Disconnects and timeouts come back as
    /// [`PopError::SensorUnavailable`].
    fn read_line(&mut self) -> Result<String, PopError>;
}

impl<T: SensorTransport + ?Sized> SensorTransport for Box<T> {
    fn read_line(&mut self) -> Result<String, PopError> {
        (**self).read_line()
    }
}

/// The real sensor on a serial port: odd parity, two stop bits, seven data
/// bits.
pub struct SerialSensor {
    port: SerialPort,
    assembler: LineAssembler,
    buffer: [u8; 256],
}

impl SerialSensor {
    /// Open and configure the port named in `settings`.
    pub fn open(settings: &SerialSettings) -> Result<Self, PopError> {
        let name = settings
            .port
            .as_deref()
            .ok_or_else(|| PopError::Config("no serial port selected".into()))?;
        let baud_rate = settings.baud_rate;

        let mut port = SerialPort::open(name, move |mut s: Settings| -> io::Result<Settings> {
            s.set_raw();
            s.set_baud_rate(baud_rate)?;
            s.set_char_size(CharSize::Bits7);
            s.set_stop_bits(StopBits::Two);
            s.set_parity(Parity::Odd);
            Ok(s)
        })
        .map_err(PopError::SensorUnavailable)?;
        port.set_read_timeout(settings.timeout())
            .map_err(PopError::SensorUnavailable)?;

        info!("Opened sensor on {} at {} baud", name, baud_rate);
        Ok(Self {
            port,
            assembler: LineAssembler::new(),
            buffer: [0; 256],
        })
    }
}

impl SensorTransport for SerialSensor {
    fn read_line(&mut self) -> Result<String, PopError> {
        loop {
            if let Some(line) = self.assembler.next_line() {
                return Ok(line);
            }
            let read_len = self
                .port
                .read(&mut self.buffer)
                .map_err(PopError::SensorUnavailable)?;
            if read_len == 0 {
                return Err(PopError::SensorUnavailable(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial port closed",
                )));
            }
            debug!("Read {} bytes from the sensor", read_len);
            self.assembler.push(&self.buffer[..read_len]);
        }
    }
}

/// Serial devices the OS knows about.
pub fn available_ports() -> Result<Vec<PathBuf>, PopError> {
    Ok(SerialPort::available_ports()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<&'static str>);

    impl SensorTransport for Scripted {
        fn read_line(&mut self) -> Result<String, PopError> {
            if self.0.is_empty() {
                return Err(PopError::SensorUnavailable(io::ErrorKind::TimedOut.into()));
            }
            Ok(self.0.remove(0).to_owned())
        }
    }

    #[test]
    fn boxed_transports_forward() {
        let mut sensor: Box<dyn SensorTransport> = Box::new(Scripted(vec!["1 2"]));
        assert_eq!(sensor.read_line().unwrap(), "1 2");
        assert!(matches!(
            sensor.read_line(),
            Err(PopError::SensorUnavailable(_))
        ));
    }

    #[test]
    fn missing_port_is_a_config_error() {
        let settings = SerialSettings::default();
        assert!(matches!(
            SerialSensor::open(&settings),
            Err(PopError::Config(_))
        ));
    }
}

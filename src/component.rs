//! Defines the Component trait, a unit of blocking work that runs on its
//! own thread and talks to the rest of the program over channels. The sync
//! loop uses it to move sensor reads off the coordinator thread, so that a
//! serial read can overlap the audio write of the same iteration.

use crate::error::PopError;
use crate::sensor::SensorTransport;

use log::{info, warn};
use std::fmt;
use std::io;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

///
/// A worker that turns each request it receives into one reply. Anything
/// that should run concurrently with the sync loop implements Component
/// and is started with [`run_component`].
///
pub trait Component: fmt::Display {
    /// What a request carries
    type InData;
    /// What a reply carries
    type OutData;

    /// Converts an input of type InData into an output of type OutData
    fn convert(&mut self, input: Self::InData) -> Self::OutData;

    /// Cleans up once the request channel closes
    fn finalize(&mut self) -> Result<(), PopError> {
        Ok(())
    }
}

/// Runs the given Component on its own thread. On receiving data of type
/// InData on the input channel, the Component converts them to data of type
/// OutData and sends it to the output channel. The thread ends when either
/// channel is closed.
pub fn run_component<C>(
    mut component: C,
    input: Receiver<C::InData>,
    output: Sender<C::OutData>,
) -> JoinHandle<()>
where
    C: Component + Send + 'static,
    C::InData: Send + 'static,
    C::OutData: Send + 'static,
{
    thread::spawn(move || {
        while let Ok(data) = input.recv() {
            let out_data = component.convert(data);
            if output.send(out_data).is_err() {
                warn!("{} : reply channel closed.", component);
                break;
            }
        }

        if let Err(error) = component.finalize() {
            warn!("{} : error during terminating : {}.", component, error);
        }
        info!("{} : terminated.", component);
    })
}

/// Reads one line from a sensor per request.
struct SensorReader<T> {
    transport: T,
}

impl<T: SensorTransport> Component for SensorReader<T> {
    type InData = ();
    type OutData = Result<String, PopError>;

    fn convert(&mut self, _: ()) -> Result<String, PopError> {
        self.transport.read_line()
    }
}

impl<T> fmt::Display for SensorReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensorReader")
    }
}

/// A sensor whose reads happen on a worker thread. One read is always in
/// flight: `read_line` waits for it and immediately asks for the next one.
/// The line read ahead when a playback run ends is the first one handed out
/// in the next run, so no line is lost or repeated across a reset.
pub struct ThreadedSensor {
    requests: Option<Sender<()>>,
    replies: Receiver<Result<String, PopError>>,
    handle: Option<JoinHandle<()>>,
    timeout: Duration,
}

impl ThreadedSensor {
    /// Move `transport` onto a worker thread. A reply that takes longer than
    /// `timeout` counts as a lost sensor.
    pub fn spawn<T>(transport: T, timeout: Duration) -> Self
    where
        T: SensorTransport + Send + 'static,
    {
        let (request_tx, request_rx) = channel::<()>();
        let (reply_tx, reply_rx) = channel::<Result<String, PopError>>();
        let handle = run_component(SensorReader { transport }, request_rx, reply_tx);
        let _ = request_tx.send(());
        Self {
            requests: Some(request_tx),
            replies: reply_rx,
            handle: Some(handle),
            timeout,
        }
    }
}

impl SensorTransport for ThreadedSensor {
    fn read_line(&mut self) -> Result<String, PopError> {
        let reply = match self.replies.recv_timeout(self.timeout) {
            Ok(reply) => reply,
            Err(RecvTimeoutError::Timeout) => {
                return Err(PopError::SensorUnavailable(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "sensor worker did not answer in time",
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(PopError::SensorUnavailable(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "sensor worker has stopped",
                )))
            }
        };
        if reply.is_ok() {
            if let Some(requests) = &self.requests {
                let _ = requests.send(());
            }
        }
        reply
    }
}

impl Drop for ThreadedSensor {
    fn drop(&mut self) {
        // Closing the request channel lets the worker finish its current read
        // and exit. A worker stuck on a dead port is left to the OS.
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Null MockComponent for compilation testing
    struct MockComponent {}

    impl Component for MockComponent {
        type InData = i32;
        type OutData = i32;

        fn convert(&mut self, input: i32) -> i32 {
            input + 1
        }
    }

    impl fmt::Display for MockComponent {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "MockComponent")
        }
    }

    struct Counting {
        next: u32,
        fail_after: u32,
    }

    impl SensorTransport for Counting {
        fn read_line(&mut self) -> Result<String, PopError> {
            if self.next >= self.fail_after {
                return Err(PopError::SensorUnavailable(io::ErrorKind::UnexpectedEof.into()));
            }
            self.next += 1;
            Ok(format!("{} 0", self.next * 10))
        }
    }

    struct Silent;

    impl SensorTransport for Silent {
        fn read_line(&mut self) -> Result<String, PopError> {
            thread::sleep(Duration::from_millis(500));
            Ok("0".into())
        }
    }

    #[test]
    fn test_chained_component() {
        let (test_tx, block_a_rx) = channel::<i32>();
        let (block_a_tx, block_b_rx) = channel::<i32>();
        let (block_b_tx, test_rx) = channel::<i32>();

        run_component(MockComponent {}, block_a_rx, block_a_tx);
        run_component(MockComponent {}, block_b_rx, block_b_tx);

        assert_eq!(test_tx.send(0), Ok(()));
        assert_eq!(test_rx.recv(), Ok(2));
    }

    #[test]
    fn threaded_sensor_keeps_line_order() {
        let transport = Counting {
            next: 0,
            fail_after: 3,
        };
        let mut sensor = ThreadedSensor::spawn(transport, Duration::from_secs(2));
        assert_eq!(sensor.read_line().unwrap(), "10 0");
        assert_eq!(sensor.read_line().unwrap(), "20 0");
        assert_eq!(sensor.read_line().unwrap(), "30 0");
        assert!(matches!(
            sensor.read_line(),
            Err(PopError::SensorUnavailable(_))
        ));
    }

    #[test]
    fn slow_sensor_times_out() {
        let mut sensor = ThreadedSensor::spawn(Silent, Duration::from_millis(20));
        assert!(matches!(
            sensor.read_line(),
            Err(PopError::SensorUnavailable(_))
        ));
    }
}

//! Decoding of the force sensor's line protocol.
//!
//! The sensor firmware prints one reading per line, as an integer followed
//! by whatever else it feels like reporting, e.g. `512 3 0`. Only that first
//! token matters to us.

use nom::{
    branch::alt,
    character::complete::{digit1, space0, space1},
    combinator::{eof, map},
    error::Error,
    sequence::{preceded, terminated},
    Finish, IResult,
};

use log::warn;
use std::str::FromStr;

/// Longest run of bytes kept while waiting for a newline.
pub const MAX_PENDING_BYTES: usize = 4096;

/// The leading force value of one sensor line. Values past `u32::MAX`
/// saturate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceReading(pub u32);

fn parse_force(s: &str) -> IResult<&str, ForceReading> {
    preceded(
        space0,
        terminated(
            // digit1 only yields ASCII digits, so overflow is the only failure
            map(digit1, |d: &str| ForceReading(d.parse().unwrap_or(u32::MAX))),
            alt((space1, eof)),
        ),
    )(s)
}

impl FromStr for ForceReading {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_force(s.trim_end()).finish() {
            Ok((_remaining, reading)) => Ok(reading),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

/// Collects raw bytes from a transport and hands them back one line at a
/// time. Bytes after the last newline are kept for the next read.
#[derive(Debug, Default)]
pub struct LineAssembler {
    pending: Vec<u8>,
}

impl LineAssembler {
    /// An assembler with nothing buffered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer freshly read bytes. If more than [`MAX_PENDING_BYTES`] pile up
    /// without a newline they are thrown away.
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        if self.pending.len() > MAX_PENDING_BYTES && !self.pending.contains(&b'\n') {
            warn!(
                "Discarding {} bytes with no line break; check the port's baud rate and framing",
                self.pending.len()
            );
            self.pending.clear();
        }
    }

    /// Take the oldest complete line, without its line terminator. Bytes that
    /// are not valid UTF-8 are replaced rather than rejected; garbage at the
    /// start of a transmission is common.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|&c| c == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let line = String::from_utf8_lossy(&raw);
        Some(line.trim_end_matches(['\r', '\n']).to_owned())
    }

    /// Bytes waiting for a newline.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_token_is_the_force() {
        assert_eq!("42 99".parse(), Ok(ForceReading(42)));
        assert_eq!("1023".parse(), Ok(ForceReading(1023)));
        assert_eq!("  7 1 2\r\n".parse(), Ok(ForceReading(7)));
    }

    #[test]
    fn non_numeric_first_token_is_rejected() {
        assert!("abc 123".parse::<ForceReading>().is_err());
        assert!("12abc 5".parse::<ForceReading>().is_err());
        assert!("-4 2".parse::<ForceReading>().is_err());
        assert!("".parse::<ForceReading>().is_err());
    }

    #[test]
    fn oversized_force_saturates() {
        assert_eq!("99999999999 1".parse(), Ok(ForceReading(u32::MAX)));
        assert_eq!("4294967295".parse(), Ok(ForceReading(u32::MAX)));
    }

    #[test]
    fn endless_garbage_without_newlines_is_dropped() {
        let mut assembler = LineAssembler::new();
        for _ in 0..10 {
            assembler.push(&[b'x'; 1000]);
            assert!(assembler.pending() <= MAX_PENDING_BYTES + 1000);
        }
        assert!(assembler.pending() <= MAX_PENDING_BYTES);
        assembler.push(b"\n12 0\n");
        let mut last = None;
        while let Some(line) = assembler.next_line() {
            last = Some(line);
        }
        assert_eq!(last.as_deref(), Some("12 0"));
    }

    #[test]
    fn lines_split_across_reads_are_joined() {
        let mut assembler = LineAssembler::new();
        assembler.push(b"51");
        assert_eq!(assembler.next_line(), None);
        assembler.push(b"2 0\r\n60");
        assert_eq!(assembler.next_line().as_deref(), Some("512 0"));
        assert_eq!(assembler.next_line(), None);
        assert_eq!(assembler.pending(), 2);
        assembler.push(b"0\n7\n");
        assert_eq!(assembler.next_line().as_deref(), Some("600"));
        assert_eq!(assembler.next_line().as_deref(), Some("7"));
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut assembler = LineAssembler::new();
        assembler.push(&[0xff, b' ', b'9', b'\n']);
        let line = assembler.next_line().unwrap();
        assert!(line.ends_with(" 9"));
        assert!(line.parse::<ForceReading>().is_err());
    }
}

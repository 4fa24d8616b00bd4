use std::{error::Error, fmt::Display};

#[derive(Debug)]
pub enum GuiError {
    IOError(std::io::Error),
    NoPorts,
}

impl Display for GuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
            Self::NoPorts => write!(f, "no serial ports found"),
        }
    }
}

impl Error for GuiError {}

impl From<std::io::Error> for GuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

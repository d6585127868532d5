use alloc::{boxed::Box, string::String};
use core::fmt;

use crate::modem::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The serial transport could not be used at start
    DeviceNotReady,
    /// A matcher deadline elapsed before the target showed up
    Timeout { target: String },
    /// A complete response line did not have the expected shape
    Parse { prefix: String, reason: &'static str },
    /// The failure policy gave up on a phase
    Aborted { phase: Phase, cause: Box<Error> },
}

impl Error {
    /// Timeouts and malformed responses can be handled by the failure policy,
    /// everything else ends the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::Parse { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceNotReady => write!(f, "modem serial device not ready"),
            Error::Timeout { target } => write!(f, "timed out waiting for {target:?}"),
            Error::Parse { prefix, reason } => {
                write!(f, "malformed {prefix:?} response: {reason}")
            }
            Error::Aborted { phase, cause } => write!(f, "aborted in {phase:?}: {cause}"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

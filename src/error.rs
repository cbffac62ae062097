//! Transport and argument range errors.

use std::io;

use thiserror::Error;

/// Failures of a [`DeviceLink`](crate::DeviceLink).
#[derive(Debug, Error)]
pub enum LinkError {
    /// The serial device or the daemon socket could not be opened.
    #[error("failed to open {target}")]
    Connect {
        target: String,
        #[source]
        source: io::Error,
    },

    /// Writing a command failed mid-session.
    #[error("failed to send '{command}'")]
    Write {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The daemon answered a call with an error.
    #[error("daemon rejected '{command}': {message}")]
    Rejected { command: String, message: String },

    /// The daemon hung up before answering.
    #[error("daemon closed the connection")]
    Disconnected,

    /// The daemon answered with something that is not a reply.
    #[error("malformed reply from daemon")]
    MalformedReply(#[source] serde_json::Error),

    /// Waiting for the daemon was cancelled.
    #[error("cancelled while waiting for the daemon")]
    Cancelled,
}

/// A numeric argument outside its declared bounds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("invalid integer '{0}'")]
    NotAnInteger(String),

    #[error("value {value} not in range [{min}, {max}]")]
    OutOfRange { value: i64, min: i64, max: i64 },
}

impl RangeError {
    /// Checks `value` against the inclusive range `[min, max]`.
    pub fn check(value: i64, min: i64, max: i64) -> Result<i64, RangeError> {
        if (min..=max).contains(&value) {
            Ok(value)
        } else {
            Err(RangeError::OutOfRange { value, min, max })
        }
    }
}

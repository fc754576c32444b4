//! Error classes shared across the pipeline.
//!
//! Each crate keeps its own error enum; [`Classify`] maps every variant onto
//! one of these classes so drivers and HTTP edges can decide between
//! "drop", "redeliver" and "stop" without matching on foreign types.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Missing order or credential. Terminal, 4xx.
    NotFound,
    /// Bad timestamp, missing id. 400 or skip + log.
    InvalidInput,
    /// Feed / ERP / auth failure or timeout. Left to redelivery or the next poll.
    TransientNetwork,
    /// Stale-duplicate detection. A recorded mutation rather than a failure.
    DataConsistency,
    /// Decryption failure, malformed stored credential, store corruption.
    Fatal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::NotFound => "NOT_FOUND",
            ErrorClass::InvalidInput => "INVALID_INPUT",
            ErrorClass::TransientNetwork => "TRANSIENT_NETWORK",
            ErrorClass::DataConsistency => "DATA_CONSISTENCY",
            ErrorClass::Fatal => "FATAL",
        }
    }

    /// True when retrying the same input can never succeed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ErrorClass::TransientNetwork)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Classify {
    fn class(&self) -> ErrorClass;
}

//! Common types for Quorum
//!
//! This crate provides the identity and time primitives shared by the
//! membership, proposal and voting components, plus the logging bootstrap.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod clock;
pub mod logging;

pub use clock::{timestamp_secs, Clock, ManualClock, SystemClock, Timestamp};
pub use logging::{init_logging, LoggingError};

/// An authenticated participant identity.
///
/// The engine never verifies credentials; callers hand it identities that the
/// surrounding application has already authenticated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

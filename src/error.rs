//! Error types for the X-Road message engine.

use thiserror::Error;

/// Errors raised while building or reading X-Road messages.
#[derive(Error, Debug)]
pub enum XRoadError {
    /// A required field was null or empty at construction.
    #[error("{field} can't be null or empty")]
    Validation { field: &'static str },

    /// Consumer or producer could not be rebuilt from the SOAP header.
    #[error("Missing member: {0}")]
    MissingMember(String),

    /// Malformed X-Road framing.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("XML writing error: {0}")]
    XmlWrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl XRoadError {
    pub fn is_missing_member(&self) -> bool {
        matches!(self, Self::MissingMember(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Fail with a validation error when `value` is empty.
pub(crate) fn require_non_empty(value: &str, field: &'static str) -> Result<(), XRoadError> {
    if value.is_empty() {
        return Err(XRoadError::Validation { field });
    }
    Ok(())
}

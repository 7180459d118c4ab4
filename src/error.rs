//! Error types shared across the crate

use thiserror::Error;

/// Reasons a received packet could not be decoded.
///
/// A decode failure only ever discards that one sender's packet for the
/// current tick; it never aborts the tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes remain than the next field declares
    #[error("packet truncated: {field} needs {needed} bytes, {remaining} remain")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// The 255 terminator is missing or misplaced
    #[error("packet terminator missing or misplaced at offset {offset}")]
    BadSentinel { offset: usize },

    /// A field holds a value no well-formed packet contains
    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u8 },
}

/// Configuration problems. Always fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required value was not supplied by any layer
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    /// A value was supplied but is out of range or inconsistent
    #[error("invalid configuration value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// A configuration file could not be parsed
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// A configuration file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Problems with a supervisor table handed to the acceptor interpreter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("unknown event name '{name}' in supervisor '{supervisor}'")]
    UnknownEvent { supervisor: String, name: String },

    #[error("supervisor '{supervisor}' has no state named '{state}'")]
    UnknownState { supervisor: String, state: String },

    #[error("supervisor '{supervisor}' has two transitions from '{state}' on '{event}'")]
    DuplicateTransition {
        supervisor: String,
        state: String,
        event: String,
    },

    #[error("supervisor table is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_messages() {
        let err = DecodeError::Truncated {
            field: "header",
            needed: 3,
            remaining: 1,
        };
        assert_eq!(
            err.to_string(),
            "packet truncated: header needs 3 bytes, 1 remain"
        );
        let err = DecodeError::InvalidField {
            field: "role",
            value: 9,
        };
        assert_eq!(err.to_string(), "invalid role value 9");
    }

    #[test]
    fn test_config_error_invalid_helper() {
        let err = ConfigError::invalid("maxSpeed", "must be positive");
        assert_eq!(
            err.to_string(),
            "invalid configuration value maxSpeed: must be positive"
        );
    }
}

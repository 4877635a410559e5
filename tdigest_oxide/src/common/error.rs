//! Error types for sketch operations

use std::fmt;

/// Errors that can occur during sketch operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SketchError {
    /// Invalid parameter or observation provided to a sketch operation
    InvalidInput {
        /// Parameter name
        param: String,
        /// Invalid value provided
        value: String,
        /// Constraint that was violated
        constraint: String,
    },

    /// A count too large for its encoding, or a corrupt varint stream
    Overflow(String),

    /// Serialization tag not recognized by any known wire format
    UnknownFormat(i32),

    /// Byte buffer exhausted before the declared contents were consumed
    Truncated {
        /// Bytes required to continue decoding
        needed: usize,
        /// Bytes remaining in the buffer
        available: usize,
    },
}

impl fmt::Display for SketchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SketchError::InvalidInput {
                param,
                value,
                constraint,
            } => {
                write!(
                    f,
                    "Invalid input '{}': value '{}' {}",
                    param, value, constraint
                )
            }
            SketchError::Overflow(msg) => write!(f, "Overflow: {}", msg),
            SketchError::UnknownFormat(tag) => {
                write!(f, "Unknown serialization format tag: {}", tag)
            }
            SketchError::Truncated { needed, available } => {
                write!(
                    f,
                    "Truncated buffer: need {} bytes, only {} available",
                    needed, available
                )
            }
        }
    }
}

impl std::error::Error for SketchError {}

/// Result type alias for sketch operations
pub type Result<T> = std::result::Result<T, SketchError>;

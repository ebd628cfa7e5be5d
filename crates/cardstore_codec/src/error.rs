//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding stored values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The compressed payload is not valid base64.
    #[error("invalid compressed payload: {message}")]
    InvalidPayload {
        /// Description of the problem.
        message: String,
    },

    /// The code stream ended before the end marker.
    #[error("unexpected end of compressed stream")]
    UnexpectedEof,

    /// The code stream referenced a dictionary entry that does not exist.
    #[error("invalid dictionary code {code} (dictionary has {size} entries)")]
    InvalidCode {
        /// The code that was read.
        code: u32,
        /// The dictionary size at that point.
        size: u32,
    },

    /// A literal was not a valid Unicode scalar value.
    #[error("invalid literal character {0:#x}")]
    InvalidLiteral(u32),

    /// JSON could not be parsed or produced.
    #[error("JSON error: {message}")]
    Json {
        /// Description of the JSON error.
        message: String,
    },

    /// A collection's segment metadata is malformed.
    #[error("invalid segment metadata: {message}")]
    InvalidSegmentMeta {
        /// Description of the problem.
        message: String,
    },
}

impl CodecError {
    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Creates an invalid segment metadata error.
    pub fn invalid_segment_meta(message: impl Into<String>) -> Self {
        Self::InvalidSegmentMeta {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::InvalidCode { code: 9, size: 4 };
        assert_eq!(
            err.to_string(),
            "invalid dictionary code 9 (dictionary has 4 entries)"
        );
        assert_eq!(
            CodecError::UnexpectedEof.to_string(),
            "unexpected end of compressed stream"
        );
    }

    #[test]
    fn json_errors_convert() {
        let err: CodecError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CodecError::Json { .. }));
    }
}

//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while framing, reassembling or parsing traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Declared payload length exceeds the accepted maximum.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u64, max: u64 },

    /// Buffer ends before the frame it declares.
    #[error("incomplete frame: expected {expected} bytes, got {received}")]
    IncompleteFrame { expected: usize, received: usize },

    /// Text payload is not valid UTF-8.
    #[error("invalid UTF-8 in text payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Continuation frame arrived with no fragmented message in progress.
    #[error("continuation frame without a preceding data frame")]
    UnexpectedContinuation,

    /// New data frame arrived before the previous fragmented message finished.
    #[error("data frame interleaved with an unfinished fragmented message")]
    UnfinishedMessage,

    /// Control frame with FIN cleared or a payload over 125 bytes.
    #[error("invalid control frame (opcode {opcode:#x})")]
    InvalidControlFrame { opcode: u8 },

    /// Opcode reserved by the protocol.
    #[error("reserved opcode {0:#x}")]
    ReservedOpcode(u8),

    /// RSV1-3 set without a negotiated extension.
    #[error("reserved header bits set ({0:#05b})")]
    ReservedBits(u8),

    /// Client frame sent without a masking key.
    #[error("client frame is not masked")]
    UnmaskedFrame,

    /// Close payload of a single byte.
    #[error("close payload too short for a status code")]
    TruncatedCloseCode,

    /// Close status code that may not be sent on the wire.
    #[error("invalid close code {0}")]
    InvalidCloseCode(u16),

    /// The HTTP upgrade request is malformed or unsupported.
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),

    /// JSON payload could not be parsed or produced.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("timeout during {operation}")]
    Timeout { operation: String },
}

impl ProtocolError {
    pub fn invalid_handshake(reason: impl Into<String>) -> Self {
        Self::InvalidHandshake(reason.into())
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// WebSocket close code matching this error, for errors that end a
    /// session after the handshake.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::FrameTooLarge { .. } => crate::framing::close_code::MESSAGE_TOO_BIG,
            Self::InvalidUtf8(_) => crate::framing::close_code::INVALID_PAYLOAD,
            Self::Io(_) | Self::Timeout { .. } => crate::framing::close_code::GOING_AWAY,
            _ => crate::framing::close_code::PROTOCOL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::close_code;

    #[test]
    fn close_codes_for_session_errors() {
        let bad_utf8 = String::from_utf8(vec![0xc3]).unwrap_err();
        let cases = [
            (ProtocolError::FrameTooLarge { size: 2, max: 1 }, close_code::MESSAGE_TOO_BIG),
            (ProtocolError::InvalidUtf8(bad_utf8), close_code::INVALID_PAYLOAD),
            (ProtocolError::ReservedBits(0b100), close_code::PROTOCOL_ERROR),
            (ProtocolError::UnmaskedFrame, close_code::PROTOCOL_ERROR),
            (ProtocolError::TruncatedCloseCode, close_code::PROTOCOL_ERROR),
            (ProtocolError::InvalidCloseCode(1005), close_code::PROTOCOL_ERROR),
            (ProtocolError::timeout("write"), close_code::GOING_AWAY),
        ];
        for (error, code) in cases {
            assert_eq!(error.close_code(), code, "{error}");
        }
    }
}

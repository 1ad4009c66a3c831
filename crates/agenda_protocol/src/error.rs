//! Error types for the protocol crate.

use std::io;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or framing messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame length exceeds the configured ceiling.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge {
        /// Announced or actual payload length.
        len: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Frame header announced a zero-length payload.
    #[error("empty frame")]
    EmptyFrame,

    /// Failed to encode a value to CBOR.
    #[error("encoding failed: {message}")]
    Encode {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode CBOR bytes.
    #[error("decoding failed: {message}")]
    Decode {
        /// Description of the decoding error.
        message: String,
    },

    /// A request is missing a field its action requires.
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },

    /// The action is not valid where it was received.
    #[error("unexpected action: {action}")]
    UnexpectedAction {
        /// Wire name of the action.
        action: &'static str,
    },

    /// The message was produced by an incompatible protocol version.
    #[error("unsupported protocol version: {version}")]
    UnsupportedVersion {
        /// Version carried by the message.
        version: u16,
    },

    /// The remote side closed the connection inside a frame.
    #[error("connection closed mid-frame")]
    TransportClosed,

    /// The remote side reset the connection.
    #[error("connection reset by peer")]
    TransportReset,

    /// Other I/O error.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl ProtocolError {
    /// Create an encoding error.
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Create a decoding error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns true if the error means the connection is gone.
    ///
    /// Disconnects are a normal end of a connection's life and are
    /// logged rather than treated as failures.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ProtocolError::TransportClosed | ProtocolError::TransportReset
        )
    }

    /// Returns true if the stream can keep being read after this error.
    ///
    /// Only payload-level errors qualify: the frame was consumed whole.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Decode { .. }
                | ProtocolError::MissingField { .. }
                | ProtocolError::UnexpectedAction { .. }
                | ProtocolError::UnsupportedVersion { .. }
        )
    }
}

impl From<io::Error> for ProtocolError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => ProtocolError::TransportClosed,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => ProtocolError::TransportReset,
            _ => ProtocolError::Io(err),
        }
    }
}

//! Error types for the filter protocol.

use thiserror::Error;

/// Errors raised by the packet codec, the session and the filters.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Length header is not hex or is outside the valid range.
    #[error("malformed packet header: {0}")]
    MalformedHeader(String),

    /// Stream ended inside a packet.
    #[error("stream truncated: expected {expected} bytes, got {got}")]
    TruncatedStream { expected: usize, got: usize },

    /// Stream ended cleanly on a packet boundary.
    #[error("stream closed by host")]
    StreamClosed,

    /// Payload does not fit into a single packet.
    #[error("packet payload of {0} bytes exceeds maximum of {max}", max = crate::protocol::MAX_PACKET_LENGTH)]
    PacketTooLarge(usize),

    /// A text packet was expected but a flush packet arrived.
    #[error("unexpected flush packet")]
    UnexpectedFlush,

    /// A text packet is not valid UTF-8.
    #[error("text packet is not valid UTF-8")]
    InvalidText,

    /// Unexpected welcome string or unsupported protocol version.
    #[error("protocol mismatch: expected '{expected}', got {received}")]
    ProtocolMismatch { expected: String, received: String },

    /// A required capability is missing from the host's offer.
    #[error("filter '{missing}' not supported (host supports: {offered:?})")]
    CapabilityUnsupported {
        missing: String,
        offered: Vec<String>,
    },

    /// Request metadata entry without a `=`.
    #[error("malformed request entry: '{0}'")]
    MalformedRequestEntry(String),

    /// Operation called in a state that does not allow it.
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: crate::protocol::SessionState,
    },

    /// Request carries no `command` key.
    #[error("request has no command")]
    MissingCommand,

    /// Request names a command this server does not implement.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The content transformation failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Underlying stream error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FilterError {
    /// Whether the host simply closed the stream between packets.
    pub fn is_closed(&self) -> bool {
        matches!(self, FilterError::StreamClosed)
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

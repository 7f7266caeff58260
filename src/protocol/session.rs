//! Filter session state machine.
//!
//! A session owns one reader and one writer and walks through the
//! handshake, capability negotiation and any number of request/response
//! cycles, strictly in that order. Every operation checks the current
//! state first and refuses to touch the streams when called out of order.

use bytes::{Bytes, BytesMut};
use std::io::{Read, Write};
use tracing::{debug, trace, warn};

use super::pktline::{Packet, PacketCodec};
use super::request::{Request, RequestHeaders};
use super::{
    CAPABILITIES, CLIENT_WELCOME, HEADER_LEN, MAX_PACKET_LENGTH, PROTOCOL_VERSION, SERVER_WELCOME,
};
use crate::error::{FilterError, Result};

/// Where a session is in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing exchanged yet.
    Uninitialized,
    /// Welcome and version exchanged.
    Handshaken,
    /// Capabilities agreed, waiting for the next request.
    Ready,
    /// A request was read; a response is owed.
    Responding,
    /// Host closed the stream between requests.
    Closed,
    /// Handshake, negotiation or framing failed; the session is unusable.
    Failed,
}

/// Outcome reported to the host at the end of every cycle.
#[derive(Debug, Clone, Copy)]
enum Status {
    Success,
    Error,
}

impl Status {
    fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "status=success",
            Status::Error => "status=error",
        }
    }
}

/// Server side of one filter process conversation.
pub struct Session<R, W> {
    codec: PacketCodec<R, W>,
    state: SessionState,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            codec: PacketCodec::new(reader, writer),
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Give back the underlying streams.
    pub fn into_parts(self) -> (R, W) {
        self.codec.into_parts()
    }

    fn expect_state(&self, expected: SessionState, operation: &'static str) -> Result<()> {
        if self.state != expected {
            return Err(FilterError::InvalidState {
                operation,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Exchange welcome messages and agree on the protocol version.
    ///
    /// Nothing is written unless the host's welcome and version list are
    /// acceptable.
    pub fn init(&mut self) -> Result<()> {
        self.expect_state(SessionState::Uninitialized, "initialize")?;
        debug!("initialize filter");

        let result = self.handshake();
        self.state = match result {
            Ok(()) => SessionState::Handshaken,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn handshake(&mut self) -> Result<()> {
        let welcome = self.codec.read_packet_text()?;
        if welcome != CLIENT_WELCOME {
            return Err(FilterError::ProtocolMismatch {
                expected: CLIENT_WELCOME.to_string(),
                received: welcome,
            });
        }

        let versions = self.codec.read_packet_list()?;
        if !versions.iter().any(|v| v == PROTOCOL_VERSION) {
            return Err(FilterError::ProtocolMismatch {
                expected: PROTOCOL_VERSION.to_string(),
                received: format!("{versions:?}"),
            });
        }

        self.codec.write_packet_list([SERVER_WELCOME, PROTOCOL_VERSION])
    }

    /// Check the host offers every capability we need and announce ours.
    pub fn negotiate_capabilities(&mut self) -> Result<()> {
        self.expect_state(SessionState::Handshaken, "negotiate capabilities")?;

        let result = self.negotiate();
        self.state = match result {
            Ok(()) => SessionState::Ready,
            Err(_) => SessionState::Failed,
        };
        result
    }

    fn negotiate(&mut self) -> Result<()> {
        let offered = self.codec.read_packet_list()?;
        for required in CAPABILITIES {
            if !offered.iter().any(|c| c == required) {
                return Err(FilterError::CapabilityUnsupported {
                    missing: required.to_string(),
                    offered,
                });
            }
        }

        debug!(?offered, "capabilities negotiated");
        self.codec.write_packet_list(CAPABILITIES)
    }

    /// Read the next request's metadata and payload.
    ///
    /// A successfully read payload is acknowledged with `status=success`.
    /// A failure while reading the payload is answered with `status=error`
    /// before the error is returned. Failures in the metadata list write
    /// nothing.
    pub fn read_request(&mut self) -> Result<Request> {
        self.expect_state(SessionState::Ready, "read a request")?;
        trace!("process filter command");

        let headers = match self
            .codec
            .read_packet_list()
            .and_then(RequestHeaders::parse)
        {
            Ok(headers) => headers,
            Err(e) => {
                self.state = if e.is_closed() {
                    SessionState::Closed
                } else {
                    SessionState::Failed
                };
                return Err(e);
            }
        };

        let payload = match self.read_payload() {
            Ok(payload) => payload,
            Err(e) => {
                self.report_error();
                return Err(e);
            }
        };

        if let Err(e) = self.write_status(Status::Success) {
            self.state = SessionState::Failed;
            return Err(e);
        }

        self.state = SessionState::Responding;
        Ok(Request::new(headers, payload))
    }

    /// Concatenate data packets until a flush packet.
    fn read_payload(&mut self) -> Result<Bytes> {
        let mut payload = BytesMut::new();
        loop {
            match self.codec.read_packet() {
                Ok(Packet::Data(chunk)) => payload.extend_from_slice(&chunk),
                Ok(Packet::Flush) => return Ok(payload.freeze()),
                Err(FilterError::StreamClosed) => {
                    return Err(FilterError::TruncatedStream {
                        expected: HEADER_LEN,
                        got: 0,
                    })
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send `payload` as the response to the request just read.
    pub fn write_response(&mut self, payload: &[u8]) -> Result<()> {
        self.expect_state(SessionState::Responding, "write a response")?;
        self.state = SessionState::Ready;

        let result = payload
            .chunks(MAX_PACKET_LENGTH)
            .try_for_each(|chunk| self.codec.write_packet(chunk))
            .and_then(|()| self.codec.write_flush());

        match result {
            Ok(()) => self.write_status(Status::Success),
            Err(e) => {
                self.report_error();
                Err(e)
            }
        }
    }

    /// Answer the request just read with empty content and `status=error`.
    pub fn abort_response(&mut self) -> Result<()> {
        self.expect_state(SessionState::Responding, "abort a response")?;
        self.state = SessionState::Ready;

        if let Err(e) = self.codec.write_flush() {
            self.report_error();
            return Err(e);
        }
        self.write_status(Status::Error)
    }

    fn write_status(&mut self, status: Status) -> Result<()> {
        self.codec.write_packet_list([status.as_str()])
    }

    /// Best-effort `status=error`; the caller is already returning an error.
    fn report_error(&mut self) {
        if let Err(e) = self.write_status(Status::Error) {
            warn!(error = %e, "failed to report error status");
        }
    }
}

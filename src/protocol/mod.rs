//! Git long-running filter process protocol.
//!
//! Two layers:
//! - `pktline`: length-prefixed packet framing (flush packets, text
//!   packets, flush-terminated packet lists)
//! - `session`: handshake, capability negotiation and the repeated
//!   request/response cycle built on top of the framing
//!
//! ## Wire Format
//!
//! ```text
//! <4 hex digits: header + payload length><payload>
//!
//! 0000                   flush packet
//! 000ahello\n            (4 + 6 bytes)
//! ```
//!
//! ## Conversation
//!
//! ```text
//! host:   git-filter-client, [version=2], flush
//! server: [git-filter-server, version=2], flush
//! host:   [capability=clean, capability=smudge, ...], flush
//! server: [capability=clean, capability=smudge], flush
//! repeat:
//!   host:   [command=smudge, pathname=foo.bin], flush, <payload>, flush
//!   server: [status=success], flush
//!   server: <response>, flush, [status=success], flush
//! ```

pub mod pktline;
pub mod request;
pub mod session;

pub use pktline::{Packet, PacketCodec};
pub use request::{Command, Request, RequestHeaders};
pub use session::{Session, SessionState};

/// Size of the hex length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Maximum payload bytes in a single non-flush packet.
pub const MAX_PACKET_LENGTH: usize = 65516;

/// Maximum on-wire packet size (header + payload).
pub const MAX_PACKET_SIZE: usize = MAX_PACKET_LENGTH + HEADER_LEN;

/// Welcome string sent by the host.
pub const CLIENT_WELCOME: &str = "git-filter-client";

/// Identity announced by the server.
pub const SERVER_WELCOME: &str = "git-filter-server";

/// The only protocol version this server speaks.
pub const PROTOCOL_VERSION: &str = "version=2";

/// Capabilities the server requires and commits to.
pub const CAPABILITIES: [&str; 2] = ["capability=clean", "capability=smudge"];

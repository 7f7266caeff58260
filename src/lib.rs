//! git-filter-server: the server side of git's long-running filter process
//! protocol.
//!
//! - `protocol`: pkt-line framing and the handshake/negotiation/request
//!   state machine
//! - `filter`: the content transformation applied to each request
//! - `server`: drives one session over a pair of byte streams
//! - `config`: CLI and TOML configuration

pub mod config;
pub mod error;
pub mod filter;
pub mod protocol;
pub mod server;

pub use error::{FilterError, Result};
pub use filter::{Filter, Passthrough};
pub use protocol::{Command, Packet, PacketCodec, Request, RequestHeaders, Session, SessionState};
pub use server::{Server, SessionStats};

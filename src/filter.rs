//! Content filters applied to request payloads.
//!
//! The session only moves bytes; what happens to them is decided here.

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{Command, Request};

/// Transforms request payloads for the `clean` and `smudge` commands.
pub trait Filter {
    /// Working tree content to repository content.
    fn clean(&mut self, request: &Request) -> Result<Bytes>;

    /// Repository content to working tree content.
    fn smudge(&mut self, request: &Request) -> Result<Bytes>;

    /// Dispatch on the request's `command` header.
    fn apply(&mut self, request: &Request) -> Result<Bytes> {
        match request.command()? {
            Command::Clean => self.clean(request),
            Command::Smudge => self.smudge(request),
        }
    }
}

/// Returns every payload unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Filter for Passthrough {
    fn clean(&mut self, request: &Request) -> Result<Bytes> {
        Ok(request.payload.clone())
    }

    fn smudge(&mut self, request: &Request) -> Result<Bytes> {
        Ok(request.payload.clone())
    }
}

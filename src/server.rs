//! Filter process driver.
//!
//! Runs one session over a reader/writer pair: handshake, negotiation,
//! then requests until the host closes the stream.

use std::io::{Read, Write};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::filter::Filter;
use crate::protocol::Session;

/// Counters reported when a session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Requests read from the host.
    pub requests: u64,
    /// Requests answered with `status=error`.
    pub failed: u64,
}

/// Server instance
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Server { config }
    }

    /// Serve one host until it closes the stream.
    ///
    /// Handshake, negotiation, framing and I/O failures end the session
    /// with an error. A filter failure only fails its own request unless
    /// `stop_on_error` is set.
    pub fn run<F, R, W>(&self, filter: &mut F, reader: R, writer: W) -> Result<SessionStats>
    where
        F: Filter,
        R: Read,
        W: Write,
    {
        let mut session = Session::new(reader, writer);

        if let Err(e) = session.init() {
            error!(error = %e, "filter initialization failed");
            return Err(e);
        }
        if let Err(e) = session.negotiate_capabilities() {
            error!(error = %e, "filter capability negotiation failed");
            return Err(e);
        }
        info!("Filter session ready");

        let mut stats = SessionStats::default();
        loop {
            let request = match session.read_request() {
                Ok(request) => request,
                Err(e) if e.is_closed() => {
                    debug!("Host closed the stream");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "failed to read request");
                    return Err(e);
                }
            };
            stats.requests += 1;

            debug!(
                command = request.headers.get("command").unwrap_or("-"),
                pathname = request.pathname().unwrap_or("-"),
                size = request.payload.len(),
                "Filtering"
            );

            match filter.apply(&request) {
                Ok(output) => {
                    if let Err(e) = session.write_response(&output) {
                        error!(error = %e, "failed to write response");
                        return Err(e);
                    }
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(
                        error = %e,
                        pathname = request.pathname().unwrap_or("-"),
                        "Filter failed"
                    );
                    if let Err(e) = session.abort_response() {
                        error!(error = %e, "failed to report filter failure");
                        return Err(e);
                    }

                    if self.config.stop_on_error {
                        info!("Stopping after failed request");
                        break;
                    }
                }
            }
        }

        info!(
            requests = stats.requests,
            failed = stats.failed,
            "Filter session finished"
        );
        Ok(stats)
    }
}

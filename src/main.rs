//! git-filter-server: a long-running git filter process
//!
//! Git spawns this binary once per repository operation and talks to it
//! over stdin/stdout using the pkt-line filter protocol:
//! - Handshake and `version=2` negotiation
//! - `clean` and `smudge` capabilities
//! - Any number of filter requests until git closes the pipe
//!
//! stdout carries the protocol, so all logging goes to stderr.

use std::io::{self, BufWriter};

use git_filter_server::config::Config;
use git_filter_server::{Passthrough, Server};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    info!(
        stop_on_error = config.stop_on_error,
        "Starting git filter process"
    );

    let reader = io::stdin().lock();
    let writer = BufWriter::new(io::stdout().lock());

    let server = Server::new(config);
    server.run(&mut Passthrough, reader, writer)?;
    Ok(())
}

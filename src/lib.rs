//! gatewayctl - gateway port mapping control
//!
//! This library discovers a gateway router on the local network and lists,
//! creates or removes its port-forwarding rules over UPnP IGD or NAT-PMP,
//! reporting both protocols through one [`connectivity::OperationResult`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connectivity;

/// Result type alias for gatewayctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for gatewayctl setup
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Install the stderr log subscriber
///
/// `verbosity` 0 logs warnings only; each step adds info, debug, trace.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    // A subscriber may already be installed (tests, embedding apps).
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests;

//! Demo error types.

use slipstream_net::{ConfigError, TransportError};
use thiserror::Error;

/// Why the demo could not start or keep running.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DemoError {
    /// Bad demo, server or blueprint configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A driver could not reach the server.
    #[error("driver {driver} could not connect: {source}")]
    Connect {
        /// Index of the driver.
        driver: usize,
        /// Transport failure.
        source: TransportError,
    },
}

/// Result type for the demo.
pub type DemoResult<T> = Result<T, DemoError>;

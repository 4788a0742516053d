//! Error types for the DISA node binary.
//!
//! [`NodeError`] wraps every failure that can stop a node before or
//! during startup so `main` can propagate with `?`.

/// Top-level error for the node binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// Connecting to the bus failed.
    #[error("bus error: {source}")]
    Bus {
        /// The underlying bus error.
        #[from]
        source: disa_bus::BusError,
    },

    /// Declaring queues or building services failed.
    #[error("platform error: {source}")]
    Platform {
        /// The underlying platform error.
        #[from]
        source: disa_services::PlatformError,
    },

    /// Installing the OS signal handlers failed.
    #[error("signal error: {message}")]
    Signal {
        /// Description of the signal failure.
        message: String,
    },
}

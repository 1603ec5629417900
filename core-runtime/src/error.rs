//! Errors raised while assembling a session's runtime: configuration,
//! capability injection and logging setup.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A setting is out of range, or a log filter string does not parse.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A required host capability was not injected.
    #[error("Missing required capability `{capability}`: {message}")]
    CapabilityMissing { capability: String, message: String },

    /// The global tracing subscriber could not be installed, usually because
    /// one already is.
    #[error("Logging initialization failed: {0}")]
    LoggingInit(String),
}

pub type Result<T> = std::result::Result<T, Error>;

//! # Host Bridge Traits
//!
//! Capabilities the playback core requires from its host but cannot provide
//! itself.
//!
//! ## Traits
//!
//! - [`MediaBackend`](playback::MediaBackend) - the platform media player:
//!   item creation, attach/detach, observers, transport and seeking
//! - [`EventSink`](playback::EventSink) - receives duration, seek-complete and
//!   completion events from a session
//! - [`SessionControl`](session::SessionControl) - process-wide audio-session
//!   coordinator shared by all players
//! - [`LoggerSink`](logging::LoggerSink) - forwards structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails with a descriptive error when a required capability is
//! missing rather than substituting silent defaults:
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//!
//! let config = SessionConfig::builder()
//!     .event_sink(sink)
//!     .build()?; // Error::CapabilityMissing { capability: "MediaBackend", .. }
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`. Backend callbacks may fire on a
//! thread other than the one that issued the command.

pub mod error;
pub mod logging;
pub mod playback;
pub mod session;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use playback::{
    EndOfStreamCallback, EventSink, ItemHandle, MediaBackend, ObserverHandle, PlaybackSessionId,
    ReadinessCallback, ReadyState, SeekCallback,
};
pub use session::{NoopSessionControl, SessionControl};

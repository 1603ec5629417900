//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the playback crates:
//! - Logging and tracing setup
//! - Session configuration with fail-fast capability checks
//! - Event bus for fanning session events out to multiple listeners
//!
//! ## Overview
//!
//! Nothing here knows how a session sequences its commands; this crate only
//! establishes the logging conventions, the configuration contract, and the
//! broadcast mechanism the session's [`EventSink`](bridge_traits::EventSink)
//! can be bridged onto.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};

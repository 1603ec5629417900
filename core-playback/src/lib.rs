//! # Playback Session Module
//!
//! State machine for a single-stream audio player wrapping a platform media
//! backend.
//!
//! ## Overview
//!
//! This module handles:
//! - Source loading with stale-callback discard across source changes
//! - Transport commands (resume, pause, seek, stop) and volume/rate/looping
//! - End-of-stream handling (rewind, loop or settle, completion event)
//! - Idempotent release and disposal
//! - Parsing of the host audio-session configuration ([`audio_context`])

pub mod audio_context;
pub mod error;
pub mod session;
pub mod state;

pub use audio_context::{
    AudioCategory, AudioContext, AudioContextArgs, CategoryOptions, PlatformOs, PlatformVersion,
};
pub use error::{PlaybackError, Result};
pub use session::PlaybackSession;
pub use state::{Generation, PlaybackState};

//! Audio-session coordination shared by every player in the process.
//!
//! Platforms such as iOS keep one process-wide audio session whose category
//! and activation must be balanced across all concurrent players. The core
//! never touches that session directly; it asks the host's coordinator through
//! [`SessionControl`], injected per player so tests can substitute a fake.

use crate::error::Result;

/// Host coordinator for platform audio-session activation.
pub trait SessionControl: Send + Sync {
    /// Rebalance audio-session activation after a player finished its item.
    fn control_audio_session(&self);

    /// Activate the audio session before a new source is loaded.
    ///
    /// Failures are reported to the caller, which logs them and continues
    /// loading.
    fn activate_audio_session(&self) -> Result<()> {
        Ok(())
    }
}

/// Coordinator for hosts without a shared audio session (desktop, tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSessionControl;

impl SessionControl for NoopSessionControl {
    fn control_audio_session(&self) {}
}

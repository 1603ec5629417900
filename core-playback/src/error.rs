//! # Playback Error Types

use thiserror::Error;

/// Errors surfaced by a playback session and the audio-context parser.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    // ========================================================================
    // Source Errors
    // ========================================================================
    /// Malformed local path or remote URL, rejected before any load started.
    #[error("Invalid source: {0}")]
    InvalidSource(String),

    /// The backend reported the item as failed. Carries the backend's cause
    /// when it supplied one.
    #[error("Failed to load source{}", .0.as_ref().map(|cause| format!(": {cause}")).unwrap_or_default())]
    LoadFailed(Option<String>),

    /// A newer `set_source` or a `release` replaced the operation before it
    /// completed.
    #[error("Operation superseded by a newer source")]
    Superseded,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The backend finished the seek without reaching the target because a
    /// later seek took over.
    #[error("Seek interrupted by a later seek")]
    SeekInterrupted,

    /// The backend dropped a one-shot callback without invoking it.
    #[error("Backend dropped the completion callback")]
    CallbackDropped,

    #[error("Invalid volume: {0} (must be a finite number)")]
    InvalidVolume(f64),

    #[error("Invalid playback rate: {0} (must be greater than zero)")]
    InvalidPlaybackRate(f64),

    // ========================================================================
    // Lifecycle / Configuration Errors
    // ========================================================================
    /// Command issued after `dispose`.
    #[error("Session already disposed")]
    AlreadyDisposed,

    /// Unknown or unavailable audio-context category or option.
    #[error("Invalid audio context: {0}")]
    InvalidConfig(String),
}

impl PlaybackError {
    /// Returns `true` if the error concerns the media source itself.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::InvalidSource(_) | PlaybackError::LoadFailed(_)
        )
    }

    /// Returns `true` if retrying the same command on this session cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaybackError::AlreadyDisposed)
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

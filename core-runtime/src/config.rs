//! # Session Configuration
//!
//! Builder for the collaborators and initial transport settings a playback
//! session needs.
//!
//! ## Required Dependencies
//!
//! - `MediaBackend` - the platform media player the session drives
//! - `EventSink` - receives duration, seek-complete and completion events
//!
//! ## Optional Dependencies
//!
//! - `SessionControl` - process-wide audio-session coordinator (defaults to
//!   [`NoopSessionControl`])
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//! use std::sync::Arc;
//!
//! let config = SessionConfig::builder()
//!     .media_backend(Arc::new(MyBackend::new()))
//!     .event_sink(Arc::new(MyEventSink))
//!     .initial_volume(0.8)
//!     .looping(true)
//!     .build()?;
//! ```
//!
//! The builder fails fast with [`Error::CapabilityMissing`] when a required
//! collaborator is absent and with [`Error::Config`] for out-of-range values.

use crate::error::{Error, Result};
use bridge_traits::{EventSink, MediaBackend, NoopSessionControl, SessionControl};
use std::sync::Arc;

pub const DEFAULT_VOLUME: f64 = 1.0;
pub const DEFAULT_PLAYBACK_RATE: f64 = 1.0;
pub const DEFAULT_LOOPING: bool = false;

/// Collaborators and initial settings for one playback session.
#[derive(Clone)]
pub struct SessionConfig {
    pub media_backend: Arc<dyn MediaBackend>,
    pub event_sink: Arc<dyn EventSink>,
    pub session_control: Arc<dyn SessionControl>,
    /// Initial volume in `0.0..=1.0`
    pub initial_volume: f64,
    /// Initial playback rate, strictly positive
    pub playback_rate: f64,
    pub looping: bool,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("media_backend", &"MediaBackend { ... }")
            .field("event_sink", &"EventSink { ... }")
            .field("session_control", &"SessionControl { ... }")
            .field("initial_volume", &self.initial_volume)
            .field("playback_rate", &self.playback_rate)
            .field("looping", &self.looping)
            .finish()
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validate the numeric settings.
    pub fn validate(&self) -> Result<()> {
        if !self.initial_volume.is_finite() || !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(Error::Config(format!(
                "initial_volume must be within 0.0..=1.0, got {}",
                self.initial_volume
            )));
        }

        if !self.playback_rate.is_finite() || self.playback_rate <= 0.0 {
            return Err(Error::Config(format!(
                "playback_rate must be greater than zero, got {}",
                self.playback_rate
            )));
        }

        Ok(())
    }
}

/// Builder for [`SessionConfig`].
#[derive(Default)]
pub struct SessionConfigBuilder {
    media_backend: Option<Arc<dyn MediaBackend>>,
    event_sink: Option<Arc<dyn EventSink>>,
    session_control: Option<Arc<dyn SessionControl>>,
    initial_volume: Option<f64>,
    playback_rate: Option<f64>,
    looping: Option<bool>,
}

impl SessionConfigBuilder {
    /// Set the platform media player (required).
    pub fn media_backend(mut self, backend: Arc<dyn MediaBackend>) -> Self {
        self.media_backend = Some(backend);
        self
    }

    /// Set the receiver for session events (required).
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    pub fn session_control(mut self, control: Arc<dyn SessionControl>) -> Self {
        self.session_control = Some(control);
        self
    }

    pub fn initial_volume(mut self, volume: f64) -> Self {
        self.initial_volume = Some(volume);
        self
    }

    pub fn playback_rate(mut self, rate: f64) -> Self {
        self.playback_rate = Some(rate);
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] if the media backend or event sink is missing
    /// - [`Error::Config`] if volume or playback rate is out of range
    pub fn build(self) -> Result<SessionConfig> {
        let media_backend = self
            .media_backend
            .ok_or_else(|| Error::CapabilityMissing {
                capability: "MediaBackend".to_string(),
                message: "No media backend provided. Inject the platform media player \
                          adapter with SessionConfigBuilder::media_backend()."
                    .to_string(),
            })?;

        let event_sink = self.event_sink.ok_or_else(|| Error::CapabilityMissing {
            capability: "EventSink".to_string(),
            message: "No event sink provided. Use SessionConfigBuilder::event_sink(), \
                      or bridge to an EventBus with BusEventSink."
                .to_string(),
        })?;

        let session_control = self
            .session_control
            .unwrap_or_else(|| Arc::new(NoopSessionControl));

        let config = SessionConfig {
            media_backend,
            event_sink,
            session_control,
            initial_volume: self.initial_volume.unwrap_or(DEFAULT_VOLUME),
            playback_rate: self.playback_rate.unwrap_or(DEFAULT_PLAYBACK_RATE),
            looping: self.looping.unwrap_or(DEFAULT_LOOPING),
        };

        config.validate()?;
        Ok(config)
    }
}

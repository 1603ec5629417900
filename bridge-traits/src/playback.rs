//! Playback bridge traits and supporting handle types.
//!
//! A [`MediaBackend`] wraps one platform media player (an `AVPlayer`, an
//! `ExoPlayer`, a desktop engine). Unlike the other bridge traits it is not
//! async: the platform engines it models report progress through callbacks
//! that fire later, on whatever thread or queue the engine owns. Callbacks
//! handed to the backend must therefore be `Send` and must not assume they run
//! on the thread that registered them.
//!
//! Backends may invoke a callback synchronously from inside the call that
//! registered it (for example a readiness observer firing during
//! [`MediaBackend::attach`]), so implementors of the session side must never
//! hold a lock across a backend call.

use crate::error::Result;
use std::time::Duration;
use uuid::Uuid;

/// Opaque backend handle for one loaded media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemHandle(u64);

impl ItemHandle {
    /// Wrap a backend-assigned item identifier.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Backend-assigned identifier.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Opaque backend handle for one observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    /// Wrap a backend-assigned observer identifier.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Backend-assigned identifier.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Load status of a media item as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyState {
    /// The backend has not finished inspecting the item.
    Unknown,
    /// The item can be played.
    Ready,
    /// The item could not be loaded. Carries the backend's error description
    /// when one was supplied.
    Failed(Option<String>),
}

impl ReadyState {
    pub fn is_ready(&self) -> bool {
        matches!(self, ReadyState::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ReadyState::Failed(_))
    }
}

/// Readiness observer. Backends may call it more than once, including with
/// repeated `Ready` values on unrelated property changes.
pub type ReadinessCallback = Box<dyn Fn(ReadyState) + Send + Sync>;

/// End-of-stream observer, fired each time playback reaches the end of the item.
pub type EndOfStreamCallback = Box<dyn Fn() + Send + Sync>;

/// Seek completion. The flag is `false` when the seek was superseded by a
/// later seek before it finished.
pub type SeekCallback = Box<dyn FnOnce(bool) + Send>;

/// Platform media engine driving a single output.
pub trait MediaBackend: Send + Sync {
    /// Create (but do not attach) an item for `url`.
    ///
    /// `is_local` selects file-path interpretation over URL parsing.
    /// Returns [`BridgeError::InvalidSource`](crate::BridgeError::InvalidSource)
    /// when the path or URL is malformed.
    fn create_item(&self, url: &str, is_local: bool, mime_type: Option<&str>)
        -> Result<ItemHandle>;

    /// Current load status of `item`.
    fn item_state(&self, item: ItemHandle) -> ReadyState;

    /// Make `item` the player's current item.
    fn attach(&self, item: ItemHandle);

    /// Remove the current item from the player.
    fn detach(&self);

    /// Register a readiness observer for `item`.
    fn observe_readiness(&self, item: ItemHandle, callback: ReadinessCallback) -> ObserverHandle;

    /// Register an end-of-stream observer for `item`.
    fn observe_end_of_stream(
        &self,
        item: ItemHandle,
        callback: EndOfStreamCallback,
    ) -> ObserverHandle;

    /// Unregister an observer. Unknown handles are ignored.
    fn remove_observer(&self, observer: ObserverHandle);

    /// Start playback immediately at `rate`.
    fn play(&self, rate: f64);

    fn pause(&self);

    fn set_volume(&self, volume: f64);

    /// Change the playback rate. On several engines this also resumes
    /// playback as a side effect.
    fn set_rate(&self, rate: f64);

    /// Seek the current item to `position` and report completion through `callback`.
    fn seek(&self, position: Duration, callback: SeekCallback);

    /// Duration of the current item, when the engine has determined it.
    fn duration(&self) -> Option<Duration>;

    /// Playback position of the current item.
    fn current_position(&self) -> Option<Duration>;
}

/// Receiver for the three events a playback session surfaces to its host.
///
/// Implementations should return quickly; calls may arrive on a backend thread.
pub trait EventSink: Send + Sync {
    /// Item duration became known, in milliseconds.
    fn on_duration(&self, millis: i64);

    /// A seek finished (whether or not it was superseded).
    fn on_seek_complete(&self);

    /// Playback reached the end of the item.
    fn on_complete(&self);
}

/// Unique identifier for a playback session, used to tag events that leave
/// the session (for example on a shared event bus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackSessionId(Uuid);

impl PlaybackSessionId {
    /// Generate a new session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Construct an identifier from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PlaybackSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlaybackSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

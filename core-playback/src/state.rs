//! Mutable session state and the generation counter that guards it.

use crate::error::Result;
use bridge_traits::{ItemHandle, ObserverHandle};
use std::fmt;
use tokio::sync::oneshot;

/// Monotonic stamp identifying which loaded item a callback belongs to.
///
/// Every callback handed to the backend captures the generation current at
/// registration time and is discarded on arrival if the session has since
/// moved on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Externally visible phase of a [`PlaybackSession`](crate::PlaybackSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    /// No source loaded.
    Idle,
    /// A source was set and the backend has not reported readiness yet.
    Loading,
    /// Loaded and not yet started.
    Ready,
    Playing,
    Paused,
    /// The backend reported the current item as unplayable.
    Failed,
}

impl PlaybackState {
    pub fn has_source(&self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }
}

/// Backend item owned by the session together with the observers registered on it.
#[derive(Debug)]
pub(crate) struct LoadedItem {
    pub handle: ItemHandle,
    pub observers: Vec<ObserverHandle>,
}

pub(crate) type LoadWaiter = oneshot::Sender<Result<()>>;

#[derive(Debug)]
pub(crate) struct SessionState {
    pub source_url: Option<String>,
    pub is_playing: bool,
    pub looping: bool,
    pub volume: f64,
    pub playback_rate: f64,
    pub generation: Generation,
    pub active_item: Option<LoadedItem>,
    /// Callers awaiting the in-flight load, drained on the first definitive
    /// readiness report.
    pub load_waiters: Vec<LoadWaiter>,
    pub phase: PlaybackState,
    pub disposed: bool,
}

impl SessionState {
    pub fn new(volume: f64, playback_rate: f64, looping: bool) -> Self {
        Self {
            source_url: None,
            is_playing: false,
            looping,
            volume,
            playback_rate,
            generation: Generation::default(),
            active_item: None,
            load_waiters: Vec::new(),
            phase: PlaybackState::Idle,
            disposed: false,
        }
    }

    /// Advance the generation and detach the current item from the state.
    ///
    /// Dropping the pending waiters resolves their futures with `Superseded`.
    /// The caller releases the returned item on the backend after unlocking.
    pub fn retire_item(&mut self) -> Option<LoadedItem> {
        self.generation = self.generation.next();
        self.load_waiters.clear();
        self.active_item.take()
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    pub fn pending_observer_count(&self) -> usize {
        self.active_item
            .as_ref()
            .map_or(0, |item| item.observers.len())
    }
}

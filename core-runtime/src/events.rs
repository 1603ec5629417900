//! # Event Bus
//!
//! Fans playback session events out to any number of listeners using
//! `tokio::sync::broadcast`.
//!
//! A session reports to exactly one [`EventSink`]. Hosts that want several
//! independent listeners (UI, media notification, analytics) install a
//! [`BusEventSink`] and subscribe to the shared [`EventBus`] instead.
//!
//! ```text
//! ┌─────────────────┐  EventSink   ┌──────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ PlaybackSession ├─────────────>│ BusEventSink ├────────>│ EventBus ├────────────>│ Subscriber │
//! └─────────────────┘              └──────────────┘         └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{BusEventSink, EventBus, PlaybackEvent};
//! use bridge_traits::{EventSink, PlaybackSessionId};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(16);
//! let mut subscriber = bus.subscribe();
//!
//! let session_id = PlaybackSessionId::new();
//! let sink = BusEventSink::new(bus.clone(), session_id);
//! sink.on_complete();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event, PlaybackEvent::Completed { session_id: session_id.to_string() });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell `n` events behind; it can
//!   keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped; treat as shutdown.

use bridge_traits::{EventSink, PlaybackSessionId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Events published by playback sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The current item's duration became known.
    DurationKnown {
        session_id: String,
        duration_ms: i64,
    },
    /// A seek finished.
    SeekCompleted { session_id: String },
    /// Playback reached the end of the item.
    Completed { session_id: String },
}

impl PlaybackEvent {
    /// Human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            PlaybackEvent::DurationKnown { .. } => "Duration known",
            PlaybackEvent::SeekCompleted { .. } => "Seek completed",
            PlaybackEvent::Completed { .. } => "Playback completed",
        }
    }

    /// Session that emitted the event.
    pub fn session_id(&self) -> &str {
        match self {
            PlaybackEvent::DurationKnown { session_id, .. }
            | PlaybackEvent::SeekCompleted { session_id }
            | PlaybackEvent::Completed { session_id } => session_id,
        }
    }
}

/// Central broadcast channel for playback events.
///
/// Cloning the bus yields another sender onto the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlaybackEvent>,
}

impl EventBus {
    /// Creates a new event bus. Subscribers that fall more than `capacity`
    /// events behind receive `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: PlaybackEvent) -> Result<usize, SendError<PlaybackEvent>> {
        self.sender.send(event)
    }

    /// Creates an independent receiver for all future events.
    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

type EventFilter = Box<dyn Fn(&PlaybackEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
pub struct EventStream {
    receiver: Receiver<PlaybackEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<PlaybackEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&PlaybackEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Restrict the stream to events from one session.
    pub fn for_session(self, session_id: PlaybackSessionId) -> Self {
        let id = session_id.to_string();
        self.filter(move |event| event.session_id() == id)
    }

    fn accepts(&self, event: &PlaybackEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once all senders are dropped.
    pub async fn recv(&mut self) -> Result<PlaybackEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<PlaybackEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

/// [`EventSink`] that republishes a session's events on an [`EventBus`].
///
/// Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BusEventSink {
    bus: EventBus,
    session_id: PlaybackSessionId,
}

impl BusEventSink {
    pub fn new(bus: EventBus, session_id: PlaybackSessionId) -> Self {
        Self { bus, session_id }
    }

    pub fn session_id(&self) -> PlaybackSessionId {
        self.session_id
    }

    fn publish(&self, event: PlaybackEvent) {
        if self.bus.emit(event).is_err() {
            tracing::trace!(session_id = %self.session_id, "No subscribers for playback event");
        }
    }
}

impl EventSink for BusEventSink {
    fn on_duration(&self, millis: i64) {
        self.publish(PlaybackEvent::DurationKnown {
            session_id: self.session_id.to_string(),
            duration_ms: millis,
        });
    }

    fn on_seek_complete(&self) {
        self.publish(PlaybackEvent::SeekCompleted {
            session_id: self.session_id.to_string(),
        });
    }

    fn on_complete(&self) {
        self.publish(PlaybackEvent::Completed {
            session_id: self.session_id.to_string(),
        });
    }
}

//! # Playback Session
//!
//! [`PlaybackSession`] drives one [`MediaBackend`] through source loading,
//! transport commands and teardown, and reconciles the backend's three
//! asynchronous signals (readiness, seek completion, end of stream) with the
//! session's own state.
//!
//! ## Callback Discipline
//!
//! - Every callback handed to the backend holds a `Weak` reference to the
//!   session internals plus the [`Generation`] that was current when it was
//!   registered. A callback whose generation no longer matches is dropped
//!   without touching state.
//! - All mutable state lives behind a single `parking_lot::Mutex`. The lock is
//!   never held across a backend or `EventSink` call, since backends may
//!   invoke callbacks synchronously from inside the registering call.
//!
//! ## Commands
//!
//! Commands that wait on the backend (`set_source`, `seek`, `stop`, `release`,
//! `dispose`) are issued as soon as the method is called. The returned future
//! only waits for completion, so a command whose result is already known (a
//! same-source reload of a ready item, a seek with nothing loaded) resolves on
//! its first poll.
//!
//! ```ignore
//! let session = PlaybackSession::new(config);
//! session.set_source("https://example.com/a.mp3", false, None).await?;
//! session.resume()?;
//! session.seek(Duration::from_secs(30)).await?;
//! session.dispose().await?;
//! ```

use crate::error::{PlaybackError, Result};
use crate::state::{Generation, LoadedItem, PlaybackState, SessionState};
use bridge_traits::{
    BridgeError, EventSink, ItemHandle, MediaBackend, ObserverHandle, PlaybackSessionId,
    ReadyState, SessionControl,
};
use core_runtime::config::SessionConfig;
use core_runtime::logging::display_source;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, trace, warn};

type LoadReceiver = oneshot::Receiver<Result<()>>;

/// How a backend seek ended, from the session's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekOutcome {
    Completed,
    /// The backend reported the seek as superseded by a later one.
    Interrupted,
    /// The item the seek was issued against has since been replaced.
    Stale,
}

impl SeekOutcome {
    fn into_result(self) -> Result<()> {
        match self {
            SeekOutcome::Completed => Ok(()),
            SeekOutcome::Interrupted => Err(PlaybackError::SeekInterrupted),
            SeekOutcome::Stale => Err(PlaybackError::Superseded),
        }
    }
}

/// One logical player wrapping a platform media backend.
///
/// Dropping the session removes any remaining observers and detaches the
/// current item. Callbacks still queued on the backend become no-ops.
pub struct PlaybackSession {
    shared: Arc<Shared>,
}

struct Shared {
    id: PlaybackSessionId,
    backend: Arc<dyn MediaBackend>,
    events: Arc<dyn EventSink>,
    control: Arc<dyn SessionControl>,
    state: Mutex<SessionState>,
}

impl PlaybackSession {
    /// Create an empty session (no source loaded).
    pub fn new(config: SessionConfig) -> Self {
        Self::with_id(PlaybackSessionId::new(), config)
    }

    /// Create an empty session with a caller-chosen identifier.
    pub fn with_id(id: PlaybackSessionId, config: SessionConfig) -> Self {
        let state = SessionState::new(
            config.initial_volume.clamp(0.0, 1.0),
            config.playback_rate,
            config.looping,
        );

        debug!(session_id = %id, "Created playback session");

        Self {
            shared: Arc::new(Shared {
                id,
                backend: config.media_backend,
                events: config.event_sink,
                control: config.session_control,
                state: Mutex::new(state),
            }),
        }
    }

    pub fn id(&self) -> PlaybackSessionId {
        self.shared.id
    }

    // ========================================================================
    // Source Loading
    // ========================================================================

    /// Load `url` and resolve once the backend reports it playable.
    ///
    /// Setting the source that is already loaded and ready resolves
    /// immediately without touching the backend. Setting it again while it
    /// is still loading joins the in-flight load.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::InvalidSource`] if the backend rejects the path or
    ///   URL; the current source is left untouched
    /// - [`PlaybackError::LoadFailed`] if the backend reports the item failed
    /// - [`PlaybackError::Superseded`] if another `set_source` or a `release`
    ///   replaced this load before it finished
    /// - [`PlaybackError::AlreadyDisposed`] after [`dispose`](Self::dispose)
    pub fn set_source(
        &self,
        url: &str,
        is_local: bool,
        mime_type: Option<&str>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let pending = self.shared.begin_load(url, is_local, mime_type);

        async move {
            match pending? {
                None => Ok(()),
                Some(ready) => ready.await.unwrap_or(Err(PlaybackError::Superseded)),
            }
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start (or continue) playback at the stored rate and volume.
    ///
    /// Reports the item duration to the event sink when it is already known.
    pub fn resume(&self) -> Result<()> {
        self.shared.resume()
    }

    /// Pause playback. The loaded item is kept.
    pub fn pause(&self) -> Result<()> {
        self.shared.pause()
    }

    /// Set the output volume, clamped to `0.0..=1.0`, and apply it immediately.
    pub fn set_volume(&self, volume: f64) -> Result<()> {
        if !volume.is_finite() {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        let volume = volume.clamp(0.0, 1.0);

        self.shared.lock_live()?.volume = volume;
        self.shared.backend.set_volume(volume);
        Ok(())
    }

    /// Store a new playback rate.
    ///
    /// The rate is pushed to the backend only while playing. While paused it
    /// is held back and applied by the next [`resume`](Self::resume), since
    /// changing the rate resumes playback on several engines.
    pub fn set_playback_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(PlaybackError::InvalidPlaybackRate(rate));
        }

        let push = {
            let mut state = self.shared.lock_live()?;
            state.playback_rate = rate;
            state.is_playing
        };

        if push {
            self.shared.backend.set_rate(rate);
        } else {
            trace!(session_id = %self.shared.id, rate, "Deferring playback rate until resume");
        }
        Ok(())
    }

    pub fn set_looping(&self, looping: bool) -> Result<()> {
        self.shared.lock_live()?.looping = looping;
        Ok(())
    }

    /// Seek the current item to `position`.
    ///
    /// Resolves immediately when nothing is loaded. A seek issued while
    /// paused leaves the backend paused.
    ///
    /// # Errors
    ///
    /// - [`PlaybackError::SeekInterrupted`] if a later seek took over
    /// - [`PlaybackError::Superseded`] if the item was replaced meanwhile
    /// - [`PlaybackError::CallbackDropped`] if the backend never reports back
    ///   and drops the callback
    pub fn seek(&self, position: Duration) -> impl Future<Output = Result<()>> + Send + 'static {
        let (done_tx, done_rx) = oneshot::channel();
        let issued = self.shared.ensure_live().map(|()| {
            self.shared.seek_then(None, position, move |outcome| {
                let _ = done_tx.send(outcome);
            })
        });

        async move {
            issued?;
            match done_rx.await {
                Ok(outcome) => outcome.into_result(),
                Err(_) => Err(PlaybackError::CallbackDropped),
            }
        }
    }

    /// Pause, then rewind to the start.
    pub fn stop(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let paused = self.pause();
        let rewound = self.seek(Duration::ZERO);

        async move {
            paused?;
            rewound.await
        }
    }

    /// Stop, then tear down the loaded item.
    ///
    /// Teardown runs once the stop has settled, whether or not it succeeded.
    /// The session always ends up with no source, no item and no observers,
    /// and any load still in flight resolves with `Superseded`.
    ///
    /// # Errors
    ///
    /// An error here never means the release itself failed. It is the
    /// stop's error, reported after teardown has already completed:
    ///
    /// - [`PlaybackError::SeekInterrupted`] if the rewind was cut short
    /// - [`PlaybackError::Superseded`] if the rewind raced a new source
    /// - [`PlaybackError::CallbackDropped`] if the backend dropped the rewind
    /// - [`PlaybackError::AlreadyDisposed`] after [`dispose`](Self::dispose)
    pub fn release(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let stopped = self.stop();
        let shared = Arc::clone(&self.shared);

        async move {
            let result = stopped.await;
            shared.teardown();
            result
        }
    }

    /// Release the session for good. Later commands fail with
    /// [`PlaybackError::AlreadyDisposed`].
    pub fn dispose(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        let released = self.release();
        self.shared.state.lock().disposed = true;
        info!(session_id = %self.shared.id, "Disposing playback session");
        released
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn state(&self) -> PlaybackState {
        self.shared.state.lock().phase
    }

    /// Whether the session intends to be playing. This reflects commands, not
    /// what the backend is currently doing.
    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().is_playing
    }

    pub fn looping(&self) -> bool {
        self.shared.state.lock().looping
    }

    pub fn volume(&self) -> f64 {
        self.shared.state.lock().volume
    }

    pub fn playback_rate(&self) -> f64 {
        self.shared.state.lock().playback_rate
    }

    pub fn source_url(&self) -> Option<String> {
        self.shared.state.lock().source_url.clone()
    }

    pub fn generation(&self) -> Generation {
        self.shared.state.lock().generation
    }

    /// Number of backend observers registered for the current item.
    pub fn pending_observer_count(&self) -> usize {
        self.shared.state.lock().pending_observer_count()
    }

    pub fn has_active_item(&self) -> bool {
        self.shared.state.lock().active_item.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.state.lock().disposed
    }

    /// Duration of the loaded item, if the backend knows it.
    pub fn duration(&self) -> Option<Duration> {
        if !self.has_active_item() {
            return None;
        }
        self.shared.backend.duration()
    }

    pub fn current_position(&self) -> Option<Duration> {
        if !self.has_active_item() {
            return None;
        }
        self.shared.backend.current_position()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.duration().map(millis)
    }

    pub fn position_ms(&self) -> Option<i64> {
        self.current_position().map(millis)
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("PlaybackSession")
            .field("id", &self.shared.id)
            .field("phase", &state.phase)
            .field("generation", &state.generation)
            .field("is_playing", &state.is_playing)
            .field("looping", &state.looping)
            .field("disposed", &state.disposed)
            .finish()
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

impl Shared {
    fn lock_live(&self) -> Result<MutexGuard<'_, SessionState>> {
        let state = self.state.lock();
        if state.disposed {
            return Err(PlaybackError::AlreadyDisposed);
        }
        Ok(state)
    }

    fn ensure_live(&self) -> Result<()> {
        self.lock_live().map(drop)
    }

    // ------------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------------

    /// Issue a load. `Ok(None)` means the source is already loaded and ready.
    #[instrument(
        skip_all,
        fields(session_id = %self.id, source = %display_source(url, is_local))
    )]
    fn begin_load(
        self: &Arc<Self>,
        url: &str,
        is_local: bool,
        mime_type: Option<&str>,
    ) -> Result<Option<LoadReceiver>> {
        self.ensure_live()?;

        if let Err(error) = self.control.activate_audio_session() {
            warn!(error = %error, "Failed to activate audio session, loading anyway");
        }

        if let Some(reused) = self.reuse_current(url) {
            return Ok(reused);
        }

        let item = self
            .backend
            .create_item(url, is_local, mime_type)
            .map_err(|error| match error {
                BridgeError::InvalidSource(message) => PlaybackError::InvalidSource(message),
                other => PlaybackError::InvalidSource(other.to_string()),
            })?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (generation, retired) = {
            let mut state = self.state.lock();
            let retired = state.retire_item();
            state.source_url = Some(url.to_string());
            state.phase = PlaybackState::Loading;
            state.load_waiters.push(ready_tx);
            (state.generation, retired)
        };

        if let Some(retired) = retired {
            self.release_item(retired);
        }

        // Observers go in before the item is attached; attaching may report
        // readiness straight away.
        let observers = vec![
            self.observe_readiness(item, generation),
            self.observe_end_of_stream(item, generation),
        ];

        let installed = {
            let mut state = self.state.lock();
            if state.is_current(generation) {
                state.active_item = Some(LoadedItem {
                    handle: item,
                    observers: observers.clone(),
                });
                true
            } else {
                false
            }
        };

        if !installed {
            debug!(%generation, "Load replaced before the item was installed");
            for observer in observers {
                self.backend.remove_observer(observer);
            }
            return Err(PlaybackError::Superseded);
        }

        self.backend.attach(item);
        debug!(%generation, item = item.raw(), "Attached new item");
        Ok(Some(ready_rx))
    }

    /// Decide whether `url` can be served by the current item.
    ///
    /// `Some(None)`: already ready. `Some(Some(rx))`: joined the load in
    /// flight. `None`: a fresh item is needed.
    fn reuse_current(&self, url: &str) -> Option<Option<LoadReceiver>> {
        let (handle, generation) = {
            let state = self.state.lock();
            match (&state.source_url, &state.active_item) {
                (Some(current), Some(item)) if current == url => (item.handle, state.generation),
                _ => return None,
            }
        };

        match self.backend.item_state(handle) {
            ReadyState::Ready => {
                debug!("Source already loaded and ready");
                Some(None)
            }
            ReadyState::Unknown => {
                let (ready_tx, ready_rx) = oneshot::channel();
                let mut state = self.state.lock();
                if state.is_current(generation) && state.phase == PlaybackState::Loading {
                    debug!("Joining load already in flight for this source");
                    state.load_waiters.push(ready_tx);
                    Some(Some(ready_rx))
                } else {
                    None
                }
            }
            ReadyState::Failed(_) => {
                debug!("Reloading source whose previous load failed");
                None
            }
        }
    }

    fn observe_readiness(self: &Arc<Self>, item: ItemHandle, generation: Generation) -> ObserverHandle {
        let session = Arc::downgrade(self);
        self.backend.observe_readiness(
            item,
            Box::new(move |ready| {
                if let Some(shared) = session.upgrade() {
                    shared.on_readiness(generation, ready);
                }
            }),
        )
    }

    fn observe_end_of_stream(
        self: &Arc<Self>,
        item: ItemHandle,
        generation: Generation,
    ) -> ObserverHandle {
        let session: Weak<Shared> = Arc::downgrade(self);
        self.backend.observe_end_of_stream(
            item,
            Box::new(move || {
                if let Some(shared) = session.upgrade() {
                    shared.on_end_of_stream(generation);
                }
            }),
        )
    }

    fn on_readiness(&self, generation: Generation, ready: ReadyState) {
        let waiters = {
            let mut state = self.state.lock();
            if !state.is_current(generation) {
                trace!(session_id = %self.id, %generation, "Discarding stale readiness callback");
                return;
            }

            match &ready {
                ReadyState::Unknown => return,
                ReadyState::Ready => {
                    if state.phase == PlaybackState::Loading {
                        state.phase = if state.is_playing {
                            PlaybackState::Playing
                        } else {
                            PlaybackState::Ready
                        };
                    }
                }
                ReadyState::Failed(_) => state.phase = PlaybackState::Failed,
            }

            std::mem::take(&mut state.load_waiters)
        };

        match ready {
            ReadyState::Ready => {
                if !waiters.is_empty() {
                    debug!(session_id = %self.id, %generation, "Source ready");
                }
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
            }
            ReadyState::Failed(cause) => {
                let error = PlaybackError::LoadFailed(cause);
                let mut delivered = false;
                for waiter in waiters {
                    delivered |= waiter.send(Err(error.clone())).is_ok();
                }
                if !delivered {
                    warn!(
                        session_id = %self.id,
                        %generation,
                        error = %error,
                        "Source failed to load with no caller awaiting the result"
                    );
                }
            }
            ReadyState::Unknown => {}
        }
    }

    // ------------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------------

    fn resume(&self) -> Result<()> {
        let (volume, rate) = {
            let mut state = self.lock_live()?;
            state.is_playing = true;
            if matches!(state.phase, PlaybackState::Ready | PlaybackState::Paused) {
                state.phase = PlaybackState::Playing;
            }
            (state.volume, state.playback_rate)
        };

        self.backend.set_volume(volume);
        self.backend.play(rate);
        self.report_duration();
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        {
            let mut state = self.lock_live()?;
            state.is_playing = false;
            if state.phase == PlaybackState::Playing {
                state.phase = PlaybackState::Paused;
            }
        }

        self.backend.pause();
        Ok(())
    }

    /// Emit `on_duration` when the loaded item has a positive duration.
    fn report_duration(&self) {
        if self.state.lock().active_item.is_none() {
            return;
        }

        match self.backend.duration().map(millis) {
            Some(ms) if ms > 0 => self.events.on_duration(ms),
            _ => trace!(session_id = %self.id, "Duration not yet known"),
        }
    }

    /// Seek the current item and hand the outcome to `on_done`, on whichever
    /// thread the backend completes on.
    ///
    /// With `expected` set, the seek is only issued if that generation is
    /// still current. Otherwise `on_done` gets [`SeekOutcome::Stale`] and the
    /// backend is not touched.
    fn seek_then<F>(
        self: &Arc<Self>,
        expected: Option<Generation>,
        position: Duration,
        on_done: F,
    ) where
        F: FnOnce(SeekOutcome) + Send + 'static,
    {
        let target = {
            let state = self.state.lock();
            match expected {
                Some(expected) if !state.is_current(expected) => Err(expected),
                _ => Ok(state.active_item.as_ref().map(|_| state.generation)),
            }
        };

        let generation = match target {
            Ok(Some(generation)) => generation,
            Ok(None) => {
                on_done(SeekOutcome::Completed);
                return;
            }
            Err(stale) => {
                trace!(session_id = %self.id, generation = %stale, "Not seeking a replaced item");
                on_done(SeekOutcome::Stale);
                return;
            }
        };

        trace!(session_id = %self.id, position_ms = millis(position), "Seeking");
        let session = Arc::downgrade(self);
        self.backend.seek(
            position,
            Box::new(move |finished| {
                let outcome = match session.upgrade() {
                    Some(shared) => shared.on_seek_finished(generation, finished),
                    None => SeekOutcome::Stale,
                };
                on_done(outcome);
            }),
        );
    }

    fn on_seek_finished(&self, generation: Generation, finished: bool) -> SeekOutcome {
        let paused = {
            let state = self.state.lock();
            if !state.is_current(generation) {
                trace!(session_id = %self.id, %generation, "Discarding stale seek completion");
                return SeekOutcome::Stale;
            }
            !state.is_playing
        };

        // Seeking can leave some engines playing.
        if paused {
            self.backend.pause();
        }
        self.events.on_seek_complete();

        if finished {
            SeekOutcome::Completed
        } else {
            SeekOutcome::Interrupted
        }
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    fn on_end_of_stream(self: &Arc<Self>, generation: Generation) {
        {
            let state = self.state.lock();
            if !state.is_current(generation) {
                trace!(session_id = %self.id, %generation, "Discarding stale end-of-stream");
                return;
            }
            if !state.is_playing {
                debug!(session_id = %self.id, "Ignoring end-of-stream while not playing");
                return;
            }
        }

        let session = Arc::downgrade(self);
        self.seek_then(Some(generation), Duration::ZERO, move |outcome| {
            if outcome != SeekOutcome::Completed {
                return;
            }
            if let Some(shared) = session.upgrade() {
                shared.finish_rewind(generation);
            }
        });

        self.control.control_audio_session();
        self.events.on_complete();
    }

    /// Loop or settle after the end-of-stream rewind.
    fn finish_rewind(&self, generation: Generation) {
        let looping = {
            let mut state = self.state.lock();
            if !state.is_current(generation) || state.disposed {
                return;
            }
            if !state.looping {
                state.is_playing = false;
                if state.phase == PlaybackState::Playing {
                    state.phase = PlaybackState::Paused;
                }
            }
            state.looping
        };

        if looping {
            debug!(session_id = %self.id, "Looping back to start");
            if let Err(error) = self.resume() {
                debug!(session_id = %self.id, error = %error, "Could not restart looping item");
            }
        } else {
            self.backend.pause();
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    fn teardown(&self) {
        let retired = {
            let mut state = self.state.lock();
            let retired = state.retire_item();
            state.source_url = None;
            state.is_playing = false;
            state.phase = PlaybackState::Idle;
            retired
        };

        if let Some(retired) = retired {
            self.release_item(retired);
        }
        debug!(session_id = %self.id, "Released playback item");
    }

    fn release_item(&self, item: LoadedItem) {
        for observer in item.observers {
            self.backend.remove_observer(observer);
        }
        self.backend.detach();
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(item) = self.state.get_mut().active_item.take() {
            self.release_item(item);
        }
    }
}

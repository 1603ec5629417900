//! Integration tests for `PlaybackSession`
//!
//! This test suite verifies:
//! - Source loading, same-source shortcuts and stale-callback discard
//! - Transport commands and deferred playback rate
//! - Seek completion handling
//! - End-of-stream reconciliation with and without looping
//! - Release, dispose and drop teardown

use bridge_traits::{
    BridgeError, EndOfStreamCallback, EventSink, ItemHandle, MediaBackend, ObserverHandle,
    ReadinessCallback, ReadyState, SeekCallback, SessionControl,
};
use core_playback::{PlaybackError, PlaybackSession, PlaybackState};
use core_runtime::config::{SessionConfig, SessionConfigBuilder};
use core_runtime::events::{BusEventSink, EventBus, PlaybackEvent};
use futures::FutureExt;
use mockall::mock;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Fake MediaBackend
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    CreateItem(String),
    Attach(u64),
    Detach,
    ObserveReadiness(u64),
    ObserveEndOfStream(u64),
    RemoveObserver(u64),
    Play(f64),
    Pause,
    SetVolume(f64),
    SetRate(f64),
    Seek(Duration),
}

enum Observer {
    Readiness(Arc<ReadinessCallback>),
    EndOfStream(Arc<EndOfStreamCallback>),
}

struct Registration {
    id: u64,
    item: ItemHandle,
    observer: Observer,
    removed: bool,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    next_id: u64,
    last_item: Option<ItemHandle>,
    item_states: HashMap<u64, ReadyState>,
    registrations: Vec<Registration>,
    pending_seeks: VecDeque<SeekCallback>,
    rejected_sources: HashSet<String>,
    duration: Option<Duration>,
    auto_complete_seeks: bool,
    ready_on_attach: bool,
}

/// Records every call and holds on to callbacks so tests decide when and in
/// which order they fire. Callbacks are always invoked with the lock released.
#[derive(Default)]
struct FakeBackend {
    inner: Mutex<Inner>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn auto_complete_seeks(&self) {
        self.inner.lock().auto_complete_seeks = true;
    }

    fn ready_on_attach(&self) {
        self.inner.lock().ready_on_attach = true;
    }

    fn reject_source(&self, url: &str) {
        self.inner.lock().rejected_sources.insert(url.to_string());
    }

    fn set_duration(&self, duration: Option<Duration>) {
        self.inner.lock().duration = duration;
    }

    fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    fn clear_calls(&self) {
        self.inner.lock().calls.clear();
    }

    fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    fn last_item(&self) -> ItemHandle {
        self.inner.lock().last_item.expect("no item created")
    }

    fn live_observer_count(&self) -> usize {
        self.inner
            .lock()
            .registrations
            .iter()
            .filter(|r| !r.removed)
            .count()
    }

    /// Deliver a readiness change to every observer ever registered on `item`,
    /// removed or not, the way a racing engine can.
    fn deliver_readiness(&self, item: ItemHandle, state: ReadyState) {
        let callbacks: Vec<_> = {
            let mut inner = self.inner.lock();
            inner.item_states.insert(item.raw(), state.clone());
            inner
                .registrations
                .iter()
                .filter(|r| r.item == item)
                .filter_map(|r| match &r.observer {
                    Observer::Readiness(cb) => Some(Arc::clone(cb)),
                    Observer::EndOfStream(_) => None,
                })
                .collect()
        };
        for callback in callbacks {
            callback(state.clone());
        }
    }

    fn fire_ready(&self, item: ItemHandle) {
        self.deliver_readiness(item, ReadyState::Ready);
    }

    fn fire_failed(&self, item: ItemHandle, cause: Option<&str>) {
        self.deliver_readiness(item, ReadyState::Failed(cause.map(str::to_string)));
    }

    fn fire_end_of_stream(&self, item: ItemHandle) {
        let callbacks: Vec<_> = {
            let inner = self.inner.lock();
            inner
                .registrations
                .iter()
                .filter(|r| r.item == item)
                .filter_map(|r| match &r.observer {
                    Observer::EndOfStream(cb) => Some(Arc::clone(cb)),
                    Observer::Readiness(_) => None,
                })
                .collect()
        };
        for callback in callbacks {
            callback();
        }
    }

    fn complete_seek(&self, finished: bool) {
        let callback = self
            .inner
            .lock()
            .pending_seeks
            .pop_front()
            .expect("no pending seek");
        callback(finished);
    }

    fn drop_pending_seeks(&self) {
        let dropped: Vec<_> = self.inner.lock().pending_seeks.drain(..).collect();
        drop(dropped);
    }

    fn register(&self, item: ItemHandle, observer: Observer, call: fn(u64) -> Call) -> ObserverHandle {
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.calls.push(call(item.raw()));
        inner.registrations.push(Registration {
            id,
            item,
            observer,
            removed: false,
        });
        ObserverHandle::new(id)
    }
}

impl MediaBackend for FakeBackend {
    fn create_item(
        &self,
        url: &str,
        _is_local: bool,
        _mime_type: Option<&str>,
    ) -> bridge_traits::error::Result<ItemHandle> {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::CreateItem(url.to_string()));
        if inner.rejected_sources.contains(url) {
            return Err(BridgeError::InvalidSource(format!("malformed URL: {}", url)));
        }
        inner.next_id += 1;
        let item = ItemHandle::new(inner.next_id);
        inner.last_item = Some(item);
        Ok(item)
    }

    fn item_state(&self, item: ItemHandle) -> ReadyState {
        self.inner
            .lock()
            .item_states
            .get(&item.raw())
            .cloned()
            .unwrap_or(ReadyState::Unknown)
    }

    fn attach(&self, item: ItemHandle) {
        let ready = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::Attach(item.raw()));
            inner.ready_on_attach
        };
        if ready {
            self.fire_ready(item);
        }
    }

    fn detach(&self) {
        self.inner.lock().calls.push(Call::Detach);
    }

    fn observe_readiness(&self, item: ItemHandle, callback: ReadinessCallback) -> ObserverHandle {
        self.register(item, Observer::Readiness(Arc::new(callback)), Call::ObserveReadiness)
    }

    fn observe_end_of_stream(
        &self,
        item: ItemHandle,
        callback: EndOfStreamCallback,
    ) -> ObserverHandle {
        self.register(
            item,
            Observer::EndOfStream(Arc::new(callback)),
            Call::ObserveEndOfStream,
        )
    }

    fn remove_observer(&self, observer: ObserverHandle) {
        let mut inner = self.inner.lock();
        inner.calls.push(Call::RemoveObserver(observer.raw()));
        if let Some(r) = inner
            .registrations
            .iter_mut()
            .find(|r| r.id == observer.raw())
        {
            r.removed = true;
        }
    }

    fn play(&self, rate: f64) {
        self.inner.lock().calls.push(Call::Play(rate));
    }

    fn pause(&self) {
        self.inner.lock().calls.push(Call::Pause);
    }

    fn set_volume(&self, volume: f64) {
        self.inner.lock().calls.push(Call::SetVolume(volume));
    }

    fn set_rate(&self, rate: f64) {
        self.inner.lock().calls.push(Call::SetRate(rate));
    }

    fn seek(&self, position: Duration, callback: SeekCallback) {
        let immediate = {
            let mut inner = self.inner.lock();
            inner.calls.push(Call::Seek(position));
            if inner.auto_complete_seeks {
                Some(callback)
            } else {
                inner.pending_seeks.push_back(callback);
                None
            }
        };
        if let Some(callback) = immediate {
            callback(true);
        }
    }

    fn duration(&self) -> Option<Duration> {
        self.inner.lock().duration
    }

    fn current_position(&self) -> Option<Duration> {
        Some(Duration::from_millis(1_250))
    }
}

// ============================================================================
// Recording EventSink / mocked SessionControl
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    durations: Mutex<Vec<i64>>,
    seek_completes: Mutex<usize>,
    completes: Mutex<usize>,
}

impl RecordingSink {
    fn durations(&self) -> Vec<i64> {
        self.durations.lock().clone()
    }

    fn seek_completes(&self) -> usize {
        *self.seek_completes.lock()
    }

    fn completes(&self) -> usize {
        *self.completes.lock()
    }
}

impl EventSink for RecordingSink {
    fn on_duration(&self, millis: i64) {
        self.durations.lock().push(millis);
    }

    fn on_seek_complete(&self) {
        *self.seek_completes.lock() += 1;
    }

    fn on_complete(&self) {
        *self.completes.lock() += 1;
    }
}

mock! {
    Control {}

    impl SessionControl for Control {
        fn control_audio_session(&self);
        fn activate_audio_session(&self) -> bridge_traits::error::Result<()>;
    }
}

// ============================================================================
// Harness
// ============================================================================

const SONG_A: &str = "https://cdn.example.com/a.mp3";
const SONG_B: &str = "https://cdn.example.com/b.mp3";

struct Harness {
    backend: Arc<FakeBackend>,
    sink: Arc<RecordingSink>,
    session: PlaybackSession,
}

fn harness() -> Harness {
    harness_with(|builder| builder)
}

fn harness_with(configure: impl FnOnce(SessionConfigBuilder) -> SessionConfigBuilder) -> Harness {
    let backend = FakeBackend::new();
    let sink = Arc::new(RecordingSink::default());
    let builder = SessionConfig::builder()
        .media_backend(backend.clone())
        .event_sink(sink.clone());
    let config = configure(builder).build().unwrap();

    Harness {
        backend,
        sink,
        session: PlaybackSession::new(config),
    }
}

/// Control mock that tolerates activation and counts nothing else.
fn quiet_control() -> MockControl {
    let mut control = MockControl::new();
    control.expect_activate_audio_session().returning(|| Ok(()));
    control
}

async fn load(h: &Harness, url: &str) -> ItemHandle {
    let pending = h.session.set_source(url, false, None);
    let item = h.backend.last_item();
    h.backend.fire_ready(item);
    pending.await.unwrap();
    item
}

// ============================================================================
// Source Loading
// ============================================================================

#[tokio::test]
async fn test_set_source_resolves_on_ready() {
    let h = harness();

    let pending = h.session.set_source(SONG_A, false, Some("audio/mpeg"));
    assert_eq!(h.session.state(), PlaybackState::Loading);

    let item = h.backend.last_item();
    h.backend.fire_ready(item);
    pending.await.unwrap();

    assert_eq!(h.session.state(), PlaybackState::Ready);
    assert_eq!(h.session.source_url().as_deref(), Some(SONG_A));
    assert_eq!(h.session.pending_observer_count(), 2);
    assert!(h.session.has_active_item());
}

#[tokio::test]
async fn test_observers_registered_before_attach() {
    let h = harness();
    let _pending = h.session.set_source(SONG_A, false, None);
    let item = h.backend.last_item().raw();

    assert_eq!(
        h.backend.calls(),
        vec![
            Call::CreateItem(SONG_A.to_string()),
            Call::ObserveReadiness(item),
            Call::ObserveEndOfStream(item),
            Call::Attach(item),
        ]
    );
}

#[tokio::test]
async fn test_ready_during_attach_is_not_lost() {
    let h = harness();
    h.backend.ready_on_attach();

    let result = h.session.set_source(SONG_A, false, None).now_or_never();

    assert_eq!(result, Some(Ok(())));
    assert_eq!(h.session.state(), PlaybackState::Ready);
}

#[tokio::test]
async fn test_repeated_ready_completes_once() {
    let h = harness();
    let item = load(&h, SONG_A).await;

    h.session.resume().unwrap();
    h.backend.fire_ready(item);
    h.backend.fire_ready(item);

    assert_eq!(h.session.state(), PlaybackState::Playing);
}

#[tokio::test]
async fn test_stale_readiness_is_discarded() {
    let h = harness();

    let first = h.session.set_source(SONG_A, false, None);
    let first_item = h.backend.last_item();
    let mut second = Box::pin(h.session.set_source(SONG_B, false, None));
    let second_item = h.backend.last_item();

    // The old item's readiness arrives after the new source was set.
    h.backend.fire_ready(first_item);

    assert!(second.as_mut().now_or_never().is_none());
    assert_eq!(first.await, Err(PlaybackError::Superseded));
    assert_eq!(h.session.source_url().as_deref(), Some(SONG_B));
    assert_eq!(h.session.state(), PlaybackState::Loading);

    h.backend.fire_failed(first_item, Some("stale failure"));
    assert_eq!(h.session.state(), PlaybackState::Loading);

    h.backend.fire_ready(second_item);
    assert_eq!(second.await, Ok(()));
    assert_eq!(h.session.state(), PlaybackState::Ready);
}

#[tokio::test]
async fn test_replacing_source_removes_old_observers() {
    let h = harness();
    load(&h, SONG_A).await;
    assert_eq!(h.backend.live_observer_count(), 2);

    load(&h, SONG_B).await;

    assert_eq!(h.backend.live_observer_count(), 2);
    assert_eq!(h.backend.count(|c| matches!(c, Call::RemoveObserver(_))), 2);
    assert_eq!(h.backend.count(|c| *c == Call::Detach), 1);
}

#[tokio::test]
async fn test_same_source_when_ready_skips_backend() {
    let h = harness();
    load(&h, SONG_A).await;
    let generation = h.session.generation();
    h.backend.clear_calls();

    let result = h.session.set_source(SONG_A, false, None).now_or_never();

    assert_eq!(result, Some(Ok(())));
    assert!(h.backend.calls().is_empty());
    assert_eq!(h.session.generation(), generation);
}

#[tokio::test]
async fn test_same_source_while_loading_joins_load() {
    let h = harness();

    let first = h.session.set_source(SONG_A, false, None);
    let second = h.session.set_source(SONG_A, false, None);
    h.backend.fire_ready(h.backend.last_item());

    assert_eq!(first.await, Ok(()));
    assert_eq!(second.await, Ok(()));
    assert_eq!(h.backend.count(|c| matches!(c, Call::CreateItem(_))), 1);
}

#[tokio::test]
async fn test_load_failure_reports_cause() {
    let h = harness();

    let pending = h.session.set_source(SONG_A, false, None);
    h.backend
        .fire_failed(h.backend.last_item(), Some("unsupported codec"));

    assert_eq!(
        pending.await,
        Err(PlaybackError::LoadFailed(Some("unsupported codec".to_string())))
    );
    assert_eq!(h.session.state(), PlaybackState::Failed);
}

#[tokio::test]
async fn test_load_failure_without_cause() {
    let h = harness();

    let pending = h.session.set_source(SONG_A, false, None);
    h.backend.fire_failed(h.backend.last_item(), None);

    assert_eq!(pending.await, Err(PlaybackError::LoadFailed(None)));
}

#[tokio::test]
async fn test_failed_load_without_waiter_is_not_an_event() {
    let h = harness();

    drop(h.session.set_source(SONG_A, false, None));
    h.backend.fire_failed(h.backend.last_item(), Some("404"));

    assert_eq!(h.session.state(), PlaybackState::Failed);
    assert_eq!(h.sink.completes(), 0);
    assert_eq!(h.sink.seek_completes(), 0);
    assert!(h.sink.durations().is_empty());
}

#[tokio::test]
async fn test_same_source_reloads_after_failure() {
    let h = harness();

    let pending = h.session.set_source(SONG_A, false, None);
    h.backend.fire_failed(h.backend.last_item(), None);
    assert!(pending.await.is_err());

    let retry = h.session.set_source(SONG_A, false, None);
    h.backend.fire_ready(h.backend.last_item());

    assert_eq!(retry.await, Ok(()));
    assert_eq!(h.backend.count(|c| matches!(c, Call::CreateItem(_))), 2);
}

#[tokio::test]
async fn test_invalid_source_leaves_state_untouched() {
    let h = harness();
    load(&h, SONG_A).await;
    let generation = h.session.generation();
    h.backend.reject_source("not a url");

    let result = h.session.set_source("not a url", false, None).await;

    assert!(matches!(result, Err(PlaybackError::InvalidSource(ref msg)) if msg.contains("malformed")));
    assert_eq!(h.session.source_url().as_deref(), Some(SONG_A));
    assert_eq!(h.session.generation(), generation);
    assert!(h.session.has_active_item());
    assert_eq!(h.session.state(), PlaybackState::Ready);
}

#[tokio::test]
async fn test_activation_failure_does_not_abort_load() {
    let mut control = MockControl::new();
    control
        .expect_activate_audio_session()
        .times(1)
        .returning(|| Err(BridgeError::OperationFailed("session busy".to_string())));
    control.expect_control_audio_session().times(0);

    let h = harness_with(|b| b.session_control(Arc::new(control)));

    let pending = h.session.set_source(SONG_A, false, None);
    h.backend.fire_ready(h.backend.last_item());

    assert_eq!(pending.await, Ok(()));
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test]
async fn test_resume_applies_settings_and_reports_duration() {
    let h = harness_with(|b| b.initial_volume(0.5).playback_rate(1.25));
    load(&h, SONG_A).await;
    h.backend.set_duration(Some(Duration::from_secs(180)));
    h.backend.clear_calls();

    h.session.resume().unwrap();

    assert!(h.session.is_playing());
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert_eq!(h.backend.calls(), vec![Call::SetVolume(0.5), Call::Play(1.25)]);
    assert_eq!(h.sink.durations(), vec![180_000]);
}

#[tokio::test]
async fn test_resume_skips_unknown_or_zero_duration() {
    let h = harness();
    load(&h, SONG_A).await;

    h.backend.set_duration(None);
    h.session.resume().unwrap();
    h.backend.set_duration(Some(Duration::ZERO));
    h.session.resume().unwrap();

    assert!(h.sink.durations().is_empty());
}

#[tokio::test]
async fn test_pause_after_resume_stops_backend_pushes() {
    let h = harness();
    load(&h, SONG_A).await;

    h.session.resume().unwrap();
    h.session.pause().unwrap();
    h.backend.clear_calls();

    assert!(!h.session.is_playing());
    assert_eq!(h.session.state(), PlaybackState::Paused);

    h.session.set_playback_rate(2.0).unwrap();
    assert!(h.backend.calls().is_empty());
    assert_eq!(h.session.playback_rate(), 2.0);
}

#[tokio::test]
async fn test_deferred_rate_applied_once_on_resume() {
    let h = harness();
    load(&h, SONG_A).await;
    h.session.set_playback_rate(0.75).unwrap();
    h.backend.clear_calls();

    h.session.resume().unwrap();

    assert_eq!(h.backend.count(|c| *c == Call::Play(0.75)), 1);
    assert_eq!(h.backend.count(|c| matches!(c, Call::SetRate(_))), 0);
}

#[tokio::test]
async fn test_rate_pushed_while_playing() {
    let h = harness();
    load(&h, SONG_A).await;
    h.session.resume().unwrap();
    h.backend.clear_calls();

    h.session.set_playback_rate(1.5).unwrap();

    assert_eq!(h.backend.calls(), vec![Call::SetRate(1.5)]);
}

#[tokio::test]
async fn test_invalid_rate_rejected() {
    let h = harness();

    assert_eq!(
        h.session.set_playback_rate(0.0),
        Err(PlaybackError::InvalidPlaybackRate(0.0))
    );
    assert!(h.session.set_playback_rate(f64::NAN).is_err());
    assert_eq!(h.session.playback_rate(), 1.0);
}

#[tokio::test]
async fn test_volume_clamped_and_pushed_immediately() {
    let h = harness();

    h.session.set_volume(1.7).unwrap();
    h.session.set_volume(-0.2).unwrap();

    assert_eq!(h.backend.calls(), vec![Call::SetVolume(1.0), Call::SetVolume(0.0)]);
    assert_eq!(h.session.volume(), 0.0);
    assert!(matches!(
        h.session.set_volume(f64::INFINITY),
        Err(PlaybackError::InvalidVolume(_))
    ));
}

#[tokio::test]
async fn test_position_queries_require_item() {
    let h = harness();
    h.backend.set_duration(Some(Duration::from_secs(3)));
    assert_eq!(h.session.duration(), None);
    assert_eq!(h.session.position_ms(), None);

    load(&h, SONG_A).await;

    assert_eq!(h.session.duration_ms(), Some(3_000));
    assert_eq!(h.session.position_ms(), Some(1_250));
}

// ============================================================================
// Seeking
// ============================================================================

#[tokio::test]
async fn test_seek_without_item_completes_immediately() {
    let h = harness();

    let result = h.session.seek(Duration::from_secs(10)).now_or_never();

    assert_eq!(result, Some(Ok(())));
    assert!(h.backend.calls().is_empty());
    assert_eq!(h.sink.seek_completes(), 0);
}

#[tokio::test]
async fn test_seek_while_paused_repauses() {
    let h = harness();
    load(&h, SONG_A).await;
    h.backend.clear_calls();

    let pending = h.session.seek(Duration::from_secs(42));
    h.backend.complete_seek(true);

    assert_eq!(pending.await, Ok(()));
    assert_eq!(
        h.backend.calls(),
        vec![Call::Seek(Duration::from_secs(42)), Call::Pause]
    );
    assert_eq!(h.sink.seek_completes(), 1);
}

#[tokio::test]
async fn test_seek_while_playing_keeps_playing() {
    let h = harness();
    load(&h, SONG_A).await;
    h.session.resume().unwrap();
    h.backend.clear_calls();

    let pending = h.session.seek(Duration::from_secs(5));
    h.backend.complete_seek(true);

    assert_eq!(pending.await, Ok(()));
    assert_eq!(h.backend.count(|c| *c == Call::Pause), 0);
}

#[tokio::test]
async fn test_interrupted_seek_still_reports_completion_event() {
    let h = harness();
    load(&h, SONG_A).await;

    let first = h.session.seek(Duration::from_secs(10));
    let second = h.session.seek(Duration::from_secs(20));
    h.backend.complete_seek(false);
    h.backend.complete_seek(true);

    assert_eq!(first.await, Err(PlaybackError::SeekInterrupted));
    assert_eq!(second.await, Ok(()));
    assert_eq!(h.sink.seek_completes(), 2);
}

#[tokio::test]
async fn test_seek_across_source_change_is_superseded() {
    let h = harness();
    load(&h, SONG_A).await;

    let pending = h.session.seek(Duration::from_secs(10));
    load(&h, SONG_B).await;
    h.backend.complete_seek(true);

    assert_eq!(pending.await, Err(PlaybackError::Superseded));
    assert_eq!(h.sink.seek_completes(), 0);
}

#[tokio::test]
async fn test_dropped_seek_callback() {
    let h = harness();
    load(&h, SONG_A).await;

    let pending = h.session.seek(Duration::from_secs(1));
    h.backend.drop_pending_seeks();

    assert_eq!(pending.await, Err(PlaybackError::CallbackDropped));
}

#[tokio::test]
async fn test_stop_pauses_then_rewinds() {
    let h = harness();
    load(&h, SONG_A).await;
    h.session.resume().unwrap();
    h.backend.clear_calls();

    let pending = h.session.stop();
    h.backend.complete_seek(true);

    assert_eq!(pending.await, Ok(()));
    assert!(!h.session.is_playing());
    assert_eq!(&h.backend.calls()[..2], &[Call::Pause, Call::Seek(Duration::ZERO)]);
}

// ============================================================================
// End of Stream
// ============================================================================

#[tokio::test]
async fn test_end_of_stream_without_looping() {
    let mut control = quiet_control();
    control.expect_control_audio_session().times(1).return_const(());
    let h = harness_with(|b| b.session_control(Arc::new(control)));
    h.backend.auto_complete_seeks();
    let item = load(&h, SONG_A).await;
    h.session.resume().unwrap();

    h.backend.fire_end_of_stream(item);

    assert!(!h.session.is_playing());
    assert_eq!(h.session.state(), PlaybackState::Paused);
    assert_eq!(h.sink.completes(), 1);
    assert_eq!(h.backend.count(|c| *c == Call::Seek(Duration::ZERO)), 1);
}

#[tokio::test]
async fn test_end_of_stream_with_looping_restarts() {
    let mut control = quiet_control();
    control.expect_control_audio_session().times(1).return_const(());
    let h = harness_with(|b| b.looping(true).session_control(Arc::new(control)));
    h.backend.auto_complete_seeks();
    let item = load(&h, SONG_A).await;
    h.session.resume().unwrap();

    h.backend.fire_end_of_stream(item);

    assert!(h.session.is_playing());
    assert_eq!(h.session.state(), PlaybackState::Playing);
    assert_eq!(h.sink.completes(), 1);
    assert_eq!(h.backend.count(|c| matches!(c, Call::Play(_))), 2);
}

#[tokio::test]
async fn test_complete_event_does_not_wait_for_rewind() {
    let h = harness();
    let item = load(&h, SONG_A).await;
    h.session.resume().unwrap();

    h.backend.fire_end_of_stream(item);

    assert_eq!(h.sink.completes(), 1);
    assert!(h.session.is_playing());

    h.backend.complete_seek(true);
    assert!(!h.session.is_playing());
}

#[tokio::test]
async fn test_end_of_stream_while_paused_is_ignored() {
    let mut control = quiet_control();
    control.expect_control_audio_session().times(0);
    let h = harness_with(|b| b.session_control(Arc::new(control)));
    let item = load(&h, SONG_A).await;
    h.backend.clear_calls();

    h.backend.fire_end_of_stream(item);

    assert!(h.backend.calls().is_empty());
    assert_eq!(h.sink.completes(), 0);
}

#[tokio::test]
async fn test_stale_end_of_stream_is_ignored() {
    let h = harness();
    let old_item = load(&h, SONG_A).await;
    h.session.resume().unwrap();
    load(&h, SONG_B).await;
    h.backend.clear_calls();

    h.backend.fire_end_of_stream(old_item);

    assert!(h.backend.calls().is_empty());
    assert_eq!(h.sink.completes(), 0);
    assert!(h.session.is_playing());
}

#[tokio::test]
async fn test_each_end_of_stream_completes_once_when_looping() {
    let h = harness_with(|b| b.looping(true));
    h.backend.auto_complete_seeks();
    let item = load(&h, SONG_A).await;
    h.session.resume().unwrap();

    h.backend.fire_end_of_stream(item);
    h.backend.fire_end_of_stream(item);

    assert_eq!(h.sink.completes(), 2);
    assert!(h.session.is_playing());
}

// ============================================================================
// Release / Dispose
// ============================================================================

#[tokio::test]
async fn test_release_clears_item_and_observers() {
    let h = harness();
    h.backend.auto_complete_seeks();
    load(&h, SONG_A).await;
    h.session.resume().unwrap();

    h.session.release().await.unwrap();

    assert_eq!(h.session.source_url(), None);
    assert!(!h.session.has_active_item());
    assert_eq!(h.session.pending_observer_count(), 0);
    assert_eq!(h.session.state(), PlaybackState::Idle);
    assert!(!h.session.is_playing());
    assert_eq!(h.backend.live_observer_count(), 0);
    assert_eq!(h.backend.count(|c| *c == Call::Detach), 1);
}

#[tokio::test]
async fn test_release_during_load_discards_late_readiness() {
    let h = harness();
    h.backend.auto_complete_seeks();

    let pending = h.session.set_source(SONG_A, false, None);
    let item = h.backend.last_item();
    h.session.release().await.unwrap();

    assert_eq!(pending.await, Err(PlaybackError::Superseded));

    h.backend.fire_ready(item);

    assert_eq!(h.session.source_url(), None);
    assert!(!h.session.has_active_item());
    assert_eq!(h.session.pending_observer_count(), 0);
    assert_eq!(h.session.state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_release_tears_down_even_if_rewind_interrupted() {
    let h = harness();
    load(&h, SONG_A).await;

    let pending = h.session.release();
    h.backend.complete_seek(false);

    assert_eq!(pending.await, Err(PlaybackError::SeekInterrupted));
    assert_eq!(h.session.source_url(), None);
    assert!(!h.session.has_active_item());
    assert_eq!(h.session.pending_observer_count(), 0);
    assert_eq!(h.backend.live_observer_count(), 0);
    assert_eq!(h.session.state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_release_twice_is_idempotent() {
    let h = harness();
    h.backend.auto_complete_seeks();
    load(&h, SONG_A).await;

    h.session.release().await.unwrap();
    h.session.release().await.unwrap();

    assert_eq!(h.backend.count(|c| *c == Call::Detach), 1);
    assert_eq!(h.session.state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_session_reusable_after_release() {
    let h = harness();
    h.backend.auto_complete_seeks();
    load(&h, SONG_A).await;
    h.session.release().await.unwrap();

    load(&h, SONG_B).await;

    assert_eq!(h.session.source_url().as_deref(), Some(SONG_B));
}

#[tokio::test]
async fn test_dispose_rejects_later_commands() {
    let h = harness();
    h.backend.auto_complete_seeks();
    load(&h, SONG_A).await;

    h.session.dispose().await.unwrap();
    assert!(h.session.is_disposed());
    assert_eq!(h.session.source_url(), None);
    h.backend.clear_calls();

    assert_eq!(h.session.resume(), Err(PlaybackError::AlreadyDisposed));
    assert_eq!(h.session.set_volume(0.5), Err(PlaybackError::AlreadyDisposed));
    assert_eq!(
        h.session.set_source(SONG_B, false, None).await,
        Err(PlaybackError::AlreadyDisposed)
    );
    assert_eq!(
        h.session.seek(Duration::ZERO).await,
        Err(PlaybackError::AlreadyDisposed)
    );
    assert_eq!(h.session.dispose().await, Err(PlaybackError::AlreadyDisposed));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_drop_detaches_and_silences_callbacks() {
    let h = harness();
    let item = load(&h, SONG_A).await;
    let Harness {
        backend,
        sink,
        session,
    } = h;

    drop(session);

    assert_eq!(backend.live_observer_count(), 0);
    assert_eq!(backend.count(|c| *c == Call::Detach), 1);

    backend.fire_ready(item);
    backend.fire_end_of_stream(item);
    assert_eq!(sink.completes(), 0);
}

// ============================================================================
// Event Bus
// ============================================================================

#[tokio::test]
async fn test_events_reach_bus_subscribers() {
    let backend = FakeBackend::new();
    backend.auto_complete_seeks();
    backend.set_duration(Some(Duration::from_millis(2_500)));

    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let session_id = bridge_traits::PlaybackSessionId::new();

    let config = SessionConfig::builder()
        .media_backend(backend.clone())
        .event_sink(Arc::new(BusEventSink::new(bus.clone(), session_id)))
        .build()
        .unwrap();
    let session = PlaybackSession::with_id(session_id, config);

    let pending = session.set_source(SONG_A, false, None);
    let item = backend.last_item();
    backend.fire_ready(item);
    pending.await.unwrap();

    session.resume().unwrap();
    backend.fire_end_of_stream(item);

    let id = session_id.to_string();
    assert_eq!(
        events.recv().await.unwrap(),
        PlaybackEvent::DurationKnown {
            session_id: id.clone(),
            duration_ms: 2_500
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PlaybackEvent::SeekCompleted {
            session_id: id.clone()
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PlaybackEvent::Completed { session_id: id }
    );
}

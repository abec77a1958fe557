//! Application-wide request activity and the busy indicator.
//!
//! The [`ActivityCoordinator`] wraps the transport once, counts foreground
//! requests and derives a debounced "busy" flag for interactive screens.
//! Background polling passes through uncounted. Observers such as the
//! usage meter see every request once it ends, background or not, including
//! requests abandoned by a timeout.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{FailureKind, Result};
use crate::transport::{Transport, TransportRequest, TransportResponse};

pub const DEFAULT_SHOW_DELAY: Duration = Duration::from_millis(700);
pub const DEFAULT_MIN_VISIBLE: Duration = Duration::from_millis(400);

/// Paths (substring match) that never count toward the busy indicator.
pub const BACKGROUND_PATHS: [&str; 5] = [
    "/kiosk/",
    "/public-info",
    "/widgets",
    "/notifications/poll",
    "/chat/poll",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityConfig {
    /// How long requests must be pending before the indicator shows.
    pub show_delay: Duration,
    /// How long the indicator stays once shown.
    pub min_visible: Duration,
    pub background_paths: Vec<String>,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            show_delay: DEFAULT_SHOW_DELAY,
            min_visible: DEFAULT_MIN_VISIBLE,
            background_paths: BACKGROUND_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl ActivityConfig {
    pub fn is_background(&self, path: &str) -> bool {
        self.background_paths
            .iter()
            .any(|pattern| path.contains(pattern.as_str()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Observers
// ─────────────────────────────────────────────────────────────────────────────

/// One finished request as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRecord {
    pub path: String,
    pub background: bool,
    pub request_bytes: u64,
    /// `None` when no response was received.
    pub response_bytes: Option<u64>,
    pub status: Option<u16>,
    pub failure: Option<FailureKind>,
    pub elapsed: Duration,
}

impl FetchRecord {
    pub fn total_bytes(&self) -> u64 {
        self.request_bytes + self.response_bytes.unwrap_or(0)
    }
}

/// Receives a record for every request that passed through the coordinator.
///
/// Called inline once the request completes or is cancelled; implementations
/// must be quick and must not block.
pub trait FetchObserver: Send + Sync {
    fn on_fetch(&self, record: &FetchRecord);
}

// ─────────────────────────────────────────────────────────────────────────────
// Busy indicator
// ─────────────────────────────────────────────────────────────────────────────

/// Pending-request count plus the number of times it has dropped to zero.
///
/// The epoch lets a reader that only samples the count notice that it went
/// idle in between, so "continuously positive" is never faked by a
/// 1 -> 0 -> 1 sequence seen as a steady 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingState {
    pub count: usize,
    pub idle_epoch: u64,
}

/// Debounce state machine for the busy flag.
#[derive(Debug, Clone)]
pub struct BusyIndicator {
    show_delay: Duration,
    min_visible: Duration,
    pending: PendingState,
    busy_since: Option<Instant>,
    visible_since: Option<Instant>,
}

impl BusyIndicator {
    pub fn new(show_delay: Duration, min_visible: Duration) -> Self {
        Self {
            show_delay,
            min_visible,
            pending: PendingState::default(),
            busy_since: None,
            visible_since: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible_since.is_some()
    }

    /// Record the latest pending state.
    pub fn observe(&mut self, pending: PendingState, now: Instant) {
        let went_idle = pending.idle_epoch != self.pending.idle_epoch;
        self.pending = pending;

        if pending.count == 0 {
            self.busy_since = None;
        } else if went_idle || self.busy_since.is_none() {
            self.busy_since = Some(now);
        }
    }

    /// Apply the debounce rules at `now` and return visibility.
    pub fn evaluate(&mut self, now: Instant) -> bool {
        match self.visible_since {
            None => {
                if let Some(since) = self.busy_since {
                    if now.saturating_duration_since(since) >= self.show_delay {
                        self.visible_since = Some(now);
                    }
                }
            }
            Some(shown) => {
                if self.pending.count == 0
                    && now.saturating_duration_since(shown) >= self.min_visible
                {
                    self.visible_since = None;
                }
            }
        }
        self.is_visible()
    }

    /// When the next [`evaluate`](Self::evaluate) could change the answer.
    pub fn next_wakeup(&self) -> Option<Instant> {
        match (self.visible_since, self.busy_since) {
            (None, Some(since)) => Some(since + self.show_delay),
            (Some(shown), _) if self.pending.count == 0 => Some(shown + self.min_visible),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

struct Shared {
    config: ActivityConfig,
    pending: watch::Sender<PendingState>,
    observers: RwLock<Vec<Arc<dyn FetchObserver>>>,
}

impl Shared {
    fn notify(&self, record: &FetchRecord) {
        let observers = self.observers.read().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            observer.on_fetch(record);
        }
    }
}

/// Decrements the pending count when dropped, whether the request finished,
/// failed or was cancelled.
struct PendingGuard<'a> {
    pending: &'a watch::Sender<PendingState>,
}

impl<'a> PendingGuard<'a> {
    fn enter(pending: &'a watch::Sender<PendingState>) -> Self {
        pending.send_modify(|state| state.count += 1);
        Self { pending }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.send_modify(|state| {
            state.count = state.count.saturating_sub(1);
            if state.count == 0 {
                state.idle_epoch += 1;
            }
        });
    }
}

/// Reports one request to the observers when dropped.
///
/// A request that never completes (its future was dropped by a timeout or an
/// aborted task) is reported as cancelled, with only its request side sized.
struct FetchTracker<'a> {
    shared: &'a Shared,
    pending: Option<PendingGuard<'a>>,
    path: String,
    background: bool,
    request_bytes: u64,
    started: Instant,
    completion: Option<(Option<u64>, Option<u16>, Option<FailureKind>)>,
}

impl<'a> FetchTracker<'a> {
    fn start(shared: &'a Shared, request: &TransportRequest) -> Self {
        let background = shared.config.is_background(&request.path);
        Self {
            shared,
            pending: (!background).then(|| PendingGuard::enter(&shared.pending)),
            path: request.path.clone(),
            background,
            request_bytes: request.estimated_size(),
            started: Instant::now(),
            completion: None,
        }
    }

    fn complete(&mut self, result: &Result<TransportResponse>) {
        self.completion = Some(match result {
            Ok(response) => (Some(response.estimated_size()), Some(response.status), None),
            Err(error) => (None, None, Some(error.kind())),
        });
    }
}

impl Drop for FetchTracker<'_> {
    fn drop(&mut self) {
        drop(self.pending.take());

        let (response_bytes, status, failure) = self
            .completion
            .take()
            .unwrap_or((None, None, Some(FailureKind::Cancelled)));
        let record = FetchRecord {
            path: std::mem::take(&mut self.path),
            background: self.background,
            request_bytes: self.request_bytes,
            response_bytes,
            status,
            failure,
            elapsed: self.started.elapsed(),
        };
        self.shared.notify(&record);
    }
}

/// Transport wrapper installed by [`ActivityCoordinator::install`].
pub struct InstrumentedTransport {
    inner: Arc<dyn Transport>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Transport for InstrumentedTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut tracker = FetchTracker::start(&self.shared, &request);
        let result = self.inner.send(request).await;
        tracker.complete(&result);
        result
    }
}

/// Process-wide request tracker with an install-once transport wrapper.
///
/// Create one per process and share it; it is constructed explicitly rather
/// than living in a global. The busy indicator task is spawned on the current
/// Tokio runtime, if any.
pub struct ActivityCoordinator {
    shared: Arc<Shared>,
    installed: Mutex<Option<Arc<InstrumentedTransport>>>,
    busy: watch::Receiver<bool>,
    indicator: Option<JoinHandle<()>>,
}

impl ActivityCoordinator {
    pub fn new(config: ActivityConfig) -> Self {
        let (pending, pending_rx) = watch::channel(PendingState::default());
        let (busy_tx, busy) = watch::channel(false);

        let indicator = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(drive_indicator(
                pending_rx,
                busy_tx,
                config.show_delay,
                config.min_visible,
            ))),
            Err(_) => {
                warn!("No Tokio runtime available, busy indicator disabled");
                None
            }
        };

        Self {
            shared: Arc::new(Shared {
                config,
                pending,
                observers: RwLock::new(Vec::new()),
            }),
            installed: Mutex::new(None),
            busy,
            indicator,
        }
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.shared.config
    }

    /// Wrap `inner` so every request is observed.
    ///
    /// Only the first call installs a wrapper. Later calls log a warning and
    /// return the wrapper that is already installed; `inner` is ignored.
    pub fn install(&self, inner: Arc<dyn Transport>) -> Arc<dyn Transport> {
        let mut installed = self.installed.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = installed.as_ref() {
            warn!("Activity instrumentation is already installed, keeping the existing wrapper");
            let existing: Arc<dyn Transport> = existing.clone();
            return existing;
        }

        let wrapper = Arc::new(InstrumentedTransport {
            inner,
            shared: Arc::clone(&self.shared),
        });
        *installed = Some(Arc::clone(&wrapper));
        debug!("Activity instrumentation installed");
        wrapper
    }

    pub fn is_installed(&self) -> bool {
        self.installed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn add_observer(&self, observer: Arc<dyn FetchObserver>) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Foreground requests currently in flight.
    pub fn pending(&self) -> usize {
        self.shared.pending.borrow().count
    }

    /// Follow the debounced busy flag.
    pub fn busy(&self) -> watch::Receiver<bool> {
        self.busy.clone()
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }
}

impl Drop for ActivityCoordinator {
    fn drop(&mut self) {
        if let Some(indicator) = self.indicator.take() {
            indicator.abort();
        }
    }
}

async fn drive_indicator(
    mut pending: watch::Receiver<PendingState>,
    busy: watch::Sender<bool>,
    show_delay: Duration,
    min_visible: Duration,
) {
    let mut indicator = BusyIndicator::new(show_delay, min_visible);

    let timer = tokio::time::sleep_until(Instant::now());
    tokio::pin!(timer);

    loop {
        let now = Instant::now();
        let state = *pending.borrow_and_update();
        indicator.observe(state, now);
        let visible = indicator.evaluate(now);
        busy.send_if_modified(|shown| {
            if *shown == visible {
                return false;
            }
            debug!("Busy indicator {}", if visible { "shown" } else { "hidden" });
            *shown = visible;
            true
        });

        let wakeup = indicator.next_wakeup();
        if let Some(at) = wakeup {
            timer.as_mut().reset(at);
        }

        tokio::select! {
            changed = pending.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = &mut timer, if wakeup.is_some() => {}
        }
    }
}

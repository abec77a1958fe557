//! Polled sync sources.
//!
//! A [`SyncSource`] owns the cached state of one endpoint: validator, last
//! payload and failure bookkeeping. A [`SourcePoller`] ticks it on the
//! interval from the current [`SyncSettings`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use lobbyboard_engine::{FallbackPayload, SyncSettings, SyncSourceId};
use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::conditional::{ConditionalFetchClient, Endpoint, PollOutcome};
use crate::fallback::log_degraded;

/// What a source currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holding {
    /// Never ticked.
    Nothing,
    /// Data received from the backend.
    Live,
    /// The static fallback, because the backend has not answered yet.
    Fallback,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Updated,
    Unchanged,
    /// The poll failed; the previous payload (or the fallback) stays.
    Degraded,
    /// Another tick of this source was still in flight.
    Skipped,
    /// The source was detached before the response arrived.
    Discarded,
}

/// Point-in-time view of a source, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub source: SyncSourceId,
    pub validator: Option<String>,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub holding: Holding,
    pub in_flight: bool,
}

struct SourceState<T> {
    validator: Option<String>,
    payload: Option<Arc<T>>,
    last_fetch: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    holding: Holding,
}

/// Cached state for one polled endpoint.
///
/// Ticks never overlap: a tick that starts while another is in flight is
/// skipped. Once a payload is held it is only replaced by a genuinely new
/// one; "not modified" keeps the very same `Arc`.
pub struct SyncSource<T: FallbackPayload> {
    endpoint: Endpoint,
    state: Mutex<SourceState<T>>,
    in_flight: AtomicBool,
    detached: AtomicBool,
    published: watch::Sender<Option<Arc<T>>>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: FallbackPayload> SyncSource<T> {
    pub fn new(endpoint: Endpoint) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            endpoint,
            state: Mutex::new(SourceState {
                validator: None,
                payload: None,
                last_fetch: None,
                last_attempt: None,
                consecutive_failures: 0,
                holding: Holding::Nothing,
            }),
            in_flight: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            published,
        }
    }

    pub fn for_building(building_id: i64) -> Self {
        Self::new(Endpoint::for_building(T::SOURCE, building_id))
    }

    fn lock(&self) -> MutexGuard<'_, SourceState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The payload currently held, live or fallback. `None` before the first tick.
    pub fn payload(&self) -> Option<Arc<T>> {
        self.lock().payload.clone()
    }

    /// Follow payload changes. Only genuine transitions are published.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.published.subscribe()
    }

    pub fn status(&self) -> SourceStatus {
        let state = self.lock();
        SourceStatus {
            source: T::SOURCE,
            validator: state.validator.clone(),
            last_fetch: state.last_fetch,
            last_attempt: state.last_attempt,
            consecutive_failures: state.consecutive_failures,
            holding: state.holding,
            in_flight: self.in_flight.load(Ordering::Acquire),
        }
    }

    /// Stop accepting results. Responses still in flight are dropped on arrival.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    /// Poll the endpoint once and apply the outcome.
    pub async fn tick(&self, client: &ConditionalFetchClient) -> TickOutcome {
        if self.is_detached() {
            return TickOutcome::Discarded;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("{} poll still in flight, skipping tick", T::SOURCE);
            return TickOutcome::Skipped;
        }
        let _guard = InFlightGuard(&self.in_flight);

        let validator = self.lock().validator.clone();
        let outcome = client.poll::<T>(&self.endpoint, validator.as_deref()).await;

        if self.is_detached() {
            debug!("{} response arrived after detach, discarding", T::SOURCE);
            return TickOutcome::Discarded;
        }
        self.apply(outcome)
    }

    fn apply(&self, outcome: PollOutcome<T>) -> TickOutcome {
        let now = Utc::now();
        let mut state = self.lock();
        state.last_attempt = Some(now);

        match outcome {
            PollOutcome::Updated { payload, validator } => {
                let payload = Arc::new(payload);
                state.payload = Some(Arc::clone(&payload));
                state.validator = validator;
                state.last_fetch = Some(now);
                state.consecutive_failures = 0;
                state.holding = Holding::Live;
                drop(state);

                debug!("{} updated", T::SOURCE);
                self.published.send_replace(Some(payload));
                TickOutcome::Updated
            }
            PollOutcome::Unchanged => {
                state.last_fetch = Some(now);
                state.consecutive_failures = 0;
                TickOutcome::Unchanged
            }
            PollOutcome::Unreachable(error) => {
                state.consecutive_failures += 1;
                log_degraded(T::SOURCE, &error);

                if state.payload.is_none() {
                    let fallback = Arc::new(T::fallback());
                    state.payload = Some(Arc::clone(&fallback));
                    state.holding = Holding::Fallback;
                    drop(state);

                    self.published.send_replace(Some(fallback));
                }
                TickOutcome::Degraded
            }
        }
    }
}

/// Background task ticking one [`SyncSource`].
///
/// The first tick happens immediately. Afterwards each tick is due one poll
/// interval after the previous one started; a settings change re-derives the
/// due time from the new interval. While polling is disabled the task sleeps
/// until settings change again. Dropping the poller detaches the source.
pub struct SourcePoller<T: FallbackPayload> {
    source: Arc<SyncSource<T>>,
    task: JoinHandle<()>,
}

impl<T: FallbackPayload> SourcePoller<T> {
    /// Must be called inside a Tokio runtime.
    pub fn spawn(
        source: Arc<SyncSource<T>>,
        client: ConditionalFetchClient,
        settings: watch::Receiver<SyncSettings>,
    ) -> Self {
        let task = tokio::spawn(run(Arc::clone(&source), client, settings));
        Self { source, task }
    }

    pub fn source(&self) -> &Arc<SyncSource<T>> {
        &self.source
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl<T: FallbackPayload> Drop for SourcePoller<T> {
    fn drop(&mut self) {
        self.source.detach();
        self.task.abort();
    }
}

async fn run<T: FallbackPayload>(
    source: Arc<SyncSource<T>>,
    client: ConditionalFetchClient,
    mut settings: watch::Receiver<SyncSettings>,
) {
    let mut current = *settings.borrow_and_update();
    let mut settings_open = true;
    let mut last_tick: Option<Instant> = None;

    let timer = tokio::time::sleep_until(Instant::now());
    tokio::pin!(timer);

    info!(
        "Polling {} every {} min (enabled: {})",
        T::SOURCE,
        current.poll_interval_minutes,
        current.enabled
    );

    loop {
        let due = current.enabled.then(|| match last_tick {
            Some(at) => at + current.poll_interval(),
            None => Instant::now(),
        });
        if let Some(due) = due {
            if timer.deadline() != due {
                timer.as_mut().reset(due);
            }
        }

        tokio::select! {
            () = &mut timer, if due.is_some() => {
                last_tick = Some(Instant::now());
                source.tick(&client).await;
            }
            changed = settings.changed(), if settings_open => {
                if changed.is_err() {
                    settings_open = false;
                    continue;
                }
                let next = *settings.borrow_and_update();
                if next != current {
                    debug!(
                        "{} poller picked up settings: every {} min, enabled: {}",
                        T::SOURCE,
                        next.poll_interval_minutes,
                        next.enabled
                    );
                    current = next;
                }
            }
            else => break,
        }
    }

    debug!("{} poller stopped", T::SOURCE);
}

//! Estimated network usage.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::info;

use crate::activity::{ActivityCoordinator, FetchObserver, FetchRecord};

/// Accumulated usage since the meter was started or last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub bytes: u64,
    pub requests: u64,
    pub running_since: Option<DateTime<Utc>>,
}

/// Adds up estimated request and response sizes while running.
///
/// The meter is registered as an observer exactly once, when attached, so
/// repeated `start` calls cannot double-count. Observation happens once a
/// request has ended, including requests abandoned by a timeout, and never
/// touches its result.
pub struct NetworkUsageMeter {
    running: AtomicBool,
    bytes: AtomicU64,
    requests: AtomicU64,
    running_since: Mutex<Option<DateTime<Utc>>>,
}

impl NetworkUsageMeter {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            bytes: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            running_since: Mutex::new(None),
        }
    }

    /// Create a stopped meter observing `coordinator`'s request stream.
    pub fn attach(coordinator: &ActivityCoordinator) -> Arc<Self> {
        let meter = Arc::new(Self::new());
        coordinator.add_observer(meter.clone());
        meter
    }

    /// Start counting. Returns `false` if the meter was already running.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::AcqRel) {
            return false;
        }
        *self.running_since.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        info!("Network usage meter started");
        true
    }

    /// Stop counting and log a summary. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        let snapshot = self.snapshot();
        info!(
            "Network usage meter stopped: ~{} bytes over {} request(s)",
            snapshot.bytes, snapshot.requests
        );
        *self.running_since.lock().unwrap_or_else(|e| e.into_inner()) = None;
        true
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn estimated_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            bytes: self.bytes.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            running_since: *self.running_since.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Zero the counters without changing whether the meter runs.
    pub fn reset(&self) {
        self.bytes.store(0, Ordering::Relaxed);
        self.requests.store(0, Ordering::Relaxed);
        if self.is_running() {
            *self.running_since.lock().unwrap_or_else(|e| e.into_inner()) = Some(Utc::now());
        }
    }
}

impl FetchObserver for NetworkUsageMeter {
    fn on_fetch(&self, record: &FetchRecord) {
        if !self.is_running() {
            return;
        }
        self.bytes.fetch_add(record.total_bytes(), Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityConfig;
    use crate::conditional::{ConditionalFetchClient, Endpoint, PollOutcome};
    use crate::mock::{MockReply, MockTransport};
    use crate::transport::{TransportRequest, REQUEST_OVERHEAD_BYTES, RESPONSE_OVERHEAD_BYTES};
    use lobbyboard_engine::{SyncSourceId, WidgetList};

    const PATH: &str = "/kiosk/buildings/1/widgets";

    fn setup() -> (ActivityCoordinator, Arc<NetworkUsageMeter>, Arc<dyn crate::Transport>) {
        let coordinator = ActivityCoordinator::new(ActivityConfig::default());
        let meter = NetworkUsageMeter::attach(&coordinator);
        let mock = MockTransport::new();
        mock.always(PATH, MockReply::raw(200, "0123456789"));
        let transport = coordinator.install(Arc::new(mock));
        (coordinator, meter, transport)
    }

    #[tokio::test]
    async fn test_counts_only_while_running() {
        let (_coordinator, meter, transport) = setup();

        transport.send(TransportRequest::get(PATH)).await.unwrap();
        assert_eq!(meter.estimated_bytes(), 0);

        assert!(meter.start());
        transport.send(TransportRequest::get(PATH)).await.unwrap();
        let expected = REQUEST_OVERHEAD_BYTES + PATH.len() as u64 + RESPONSE_OVERHEAD_BYTES + 10;
        assert_eq!(meter.estimated_bytes(), expected);

        assert!(meter.stop());
        transport.send(TransportRequest::get(PATH)).await.unwrap();
        assert_eq!(meter.estimated_bytes(), expected);
    }

    #[tokio::test]
    async fn test_double_start_does_not_double_count() {
        let (_coordinator, meter, transport) = setup();

        assert!(meter.start());
        assert!(!meter.start());
        transport.send(TransportRequest::get(PATH)).await.unwrap();

        let snapshot = meter.snapshot();
        assert_eq!(snapshot.requests, 1);
        assert!(snapshot.running_since.is_some());
        assert!(meter.stop());
        assert!(!meter.stop());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_polls_are_metered() {
        let coordinator = ActivityCoordinator::new(ActivityConfig::default());
        let meter = NetworkUsageMeter::attach(&coordinator);
        let mock = MockTransport::new();
        mock.always(PATH, MockReply::Hang);
        let client = ConditionalFetchClient::new(coordinator.install(Arc::new(mock.clone())));
        let endpoint = Endpoint::for_building(SyncSourceId::Widgets, 1);
        assert_eq!(endpoint.path, PATH);

        meter.start();
        for _ in 0..3 {
            let outcome = client.poll::<WidgetList>(&endpoint, None).await;
            assert!(matches!(outcome, PollOutcome::Unreachable(ref e) if e.is_timeout()));
        }

        assert_eq!(mock.request_count(), 3);
        let snapshot = meter.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.bytes, 3 * (REQUEST_OVERHEAD_BYTES + PATH.len() as u64));
    }

    #[tokio::test]
    async fn test_failed_requests_count_request_side_only() {
        let (_coordinator, meter, transport) = setup();
        meter.start();

        let result = transport.send(TransportRequest::get("/unscripted")).await;
        assert!(result.is_err());
        assert_eq!(
            meter.estimated_bytes(),
            REQUEST_OVERHEAD_BYTES + "/unscripted".len() as u64
        );

        meter.reset();
        assert_eq!(meter.snapshot().bytes, 0);
        assert!(meter.is_running());
    }
}

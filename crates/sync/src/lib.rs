//! Lobbyboard Sync - keeps the lobby kiosk fed from the building API.
//!
//! - [`transport`]: the network seam and its reqwest implementation
//! - [`conditional`]: conditional polling with cache validators
//! - [`fallback`]: degraded-mode payload substitution
//! - [`source`]: per-endpoint cached state and interval pollers
//! - [`activity`]: request counting, the busy indicator and fetch observers
//! - [`usage`]: estimated network usage
//! - [`session`]: mounting the kiosk view for one building
//!
//! # Usage
//!
//! ```rust,ignore
//! let coordinator = ActivityCoordinator::new(ActivityConfig::default());
//! let transport = coordinator.install(Arc::new(HttpTransport::new(base_url)?));
//! let client = ConditionalFetchClient::new(transport);
//! let session = KioskSession::mount(SessionConfig::new(building_id), client, &settings, clock);
//! ```

pub mod activity;
pub mod conditional;
pub mod error;
pub mod fallback;
pub mod mock;
pub mod session;
pub mod source;
pub mod transport;
pub mod usage;

pub use activity::{
    ActivityConfig, ActivityCoordinator, BusyIndicator, FetchObserver, FetchRecord,
    InstrumentedTransport, PendingState,
};
pub use conditional::{ConditionalFetchClient, Endpoint, PollOutcome};
pub use error::{FailureKind, FetchError, Result};
pub use fallback::{fetch_with_fallback, log_degraded, with_fallback, with_fallback_timeout};
pub use mock::{MockReply, MockTransport};
pub use session::{KioskSession, RefreshReport, SessionConfig, SourceTimeouts};
pub use source::{Holding, SourcePoller, SourceStatus, SyncSource, TickOutcome};
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
pub use usage::{NetworkUsageMeter, UsageSnapshot};

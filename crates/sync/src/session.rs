//! Mounting the kiosk view.
//!
//! A [`KioskSession`] ties everything together for one building: four polled
//! sources, the scene rotation fed from the scenes source, and the settings
//! that drive the poll interval. Unmounting stops every timer and discards
//! responses still in flight.

use std::sync::Arc;
use std::time::Duration;

use lobbyboard_engine::{
    ActiveScene, Clock, FallbackPayload, LatestBill, PublicInfo, RotationController, SceneList,
    SettingsSync, SyncSourceId, WidgetList,
};
use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::conditional::{ConditionalFetchClient, Endpoint};
use crate::source::{SourcePoller, SourceStatus, SyncSource, TickOutcome};

/// Per-source client-side timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceTimeouts {
    pub scenes: Duration,
    pub widgets: Duration,
    pub public_info: Duration,
    pub latest_bill: Duration,
}

impl Default for SourceTimeouts {
    fn default() -> Self {
        Self {
            scenes: SyncSourceId::Scenes.default_timeout(),
            widgets: SyncSourceId::Widgets.default_timeout(),
            public_info: SyncSourceId::PublicInfo.default_timeout(),
            latest_bill: SyncSourceId::LatestBill.default_timeout(),
        }
    }
}

impl SourceTimeouts {
    pub fn for_source(&self, source: SyncSourceId) -> Duration {
        match source {
            SyncSourceId::Scenes => self.scenes,
            SyncSourceId::Widgets => self.widgets,
            SyncSourceId::PublicInfo => self.public_info,
            SyncSourceId::LatestBill => self.latest_bill,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub building_id: i64,
    pub timeouts: SourceTimeouts,
}

impl SessionConfig {
    pub fn new(building_id: i64) -> Self {
        Self {
            building_id,
            timeouts: SourceTimeouts::default(),
        }
    }

    fn endpoint(&self, source: SyncSourceId) -> Endpoint {
        Endpoint::for_building(source, self.building_id).with_timeout(self.timeouts.for_source(source))
    }
}

/// Outcome of [`KioskSession::refresh_now`], one entry per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    pub scenes: TickOutcome,
    pub widgets: TickOutcome,
    pub public_info: TickOutcome,
    pub latest_bill: TickOutcome,
}

/// The mounted kiosk view for one building.
pub struct KioskSession {
    building_id: i64,
    client: ConditionalFetchClient,
    scenes: SourcePoller<SceneList>,
    widgets: SourcePoller<WidgetList>,
    public_info: SourcePoller<PublicInfo>,
    latest_bill: SourcePoller<LatestBill>,
    rotation: RotationController,
    feeder: JoinHandle<()>,
}

impl KioskSession {
    /// Start polling and rotating. Must be called inside a Tokio runtime.
    ///
    /// Every source polls right away and then on the interval from
    /// `settings`, following later changes to it.
    pub fn mount(
        config: SessionConfig,
        client: ConditionalFetchClient,
        settings: &SettingsSync,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scenes = poller::<SceneList>(&config, &client, settings);
        let widgets = poller::<WidgetList>(&config, &client, settings);
        let public_info = poller::<PublicInfo>(&config, &client, settings);
        let latest_bill = poller::<LatestBill>(&config, &client, settings);

        let rotation = RotationController::spawn(clock);
        let feeder = tokio::spawn(feed_rotation(
            scenes.source().subscribe(),
            rotation.handle(),
        ));

        info!("Kiosk session mounted for building {}", config.building_id);

        Self {
            building_id: config.building_id,
            client,
            scenes,
            widgets,
            public_info,
            latest_bill,
            rotation,
            feeder,
        }
    }

    pub fn building_id(&self) -> i64 {
        self.building_id
    }

    /// Follow the scene currently on screen.
    pub fn frames(&self) -> watch::Receiver<Option<ActiveScene>> {
        self.rotation.subscribe()
    }

    pub fn current_scene(&self) -> Option<ActiveScene> {
        self.rotation.current()
    }

    /// Operator navigation.
    pub fn rotation(&self) -> &RotationController {
        &self.rotation
    }

    pub fn widgets(&self) -> watch::Receiver<Option<Arc<WidgetList>>> {
        self.widgets.source().subscribe()
    }

    pub fn public_info(&self) -> watch::Receiver<Option<Arc<PublicInfo>>> {
        self.public_info.source().subscribe()
    }

    pub fn latest_bill(&self) -> watch::Receiver<Option<Arc<LatestBill>>> {
        self.latest_bill.source().subscribe()
    }

    /// Poll every source once, now, concurrently.
    ///
    /// Sources with a poll already in flight report [`TickOutcome::Skipped`].
    pub async fn refresh_now(&self) -> RefreshReport {
        let (scenes, widgets, public_info, latest_bill) = futures::join!(
            self.scenes.source().tick(&self.client),
            self.widgets.source().tick(&self.client),
            self.public_info.source().tick(&self.client),
            self.latest_bill.source().tick(&self.client),
        );
        debug!(
            "Manual refresh: scenes {:?}, widgets {:?}, public info {:?}, latest bill {:?}",
            scenes, widgets, public_info, latest_bill
        );
        RefreshReport {
            scenes,
            widgets,
            public_info,
            latest_bill,
        }
    }

    pub fn status(&self) -> Vec<SourceStatus> {
        vec![
            self.scenes.source().status(),
            self.widgets.source().status(),
            self.public_info.source().status(),
            self.latest_bill.source().status(),
        ]
    }

    /// Stop all timers. Responses still in flight are discarded.
    pub fn unmount(self) {
        info!("Kiosk session unmounted for building {}", self.building_id);
    }
}

impl Drop for KioskSession {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}

fn poller<T: FallbackPayload>(
    config: &SessionConfig,
    client: &ConditionalFetchClient,
    settings: &SettingsSync,
) -> SourcePoller<T> {
    let source = Arc::new(SyncSource::<T>::new(config.endpoint(T::SOURCE)));
    SourcePoller::spawn(source, client.clone(), settings.watch())
}

async fn feed_rotation(
    mut scenes: watch::Receiver<Option<Arc<SceneList>>>,
    rotation: lobbyboard_engine::RotationHandle,
) {
    loop {
        let latest = scenes.borrow_and_update().clone();
        if let Some(list) = latest {
            rotation.replace_scenes(list.scenes.clone());
        }
        if scenes.changed().await.is_err() {
            break;
        }
    }
}

use std::path::Path;
use std::sync::Arc;

use lobbyboard_engine::{
    ActiveScene, JsonFileStorage, LatestBill, PublicInfo, SettingsFileWatcher, SettingsSync,
    StorageBus, SystemClock,
};
use lobbyboard_sync::{
    ActivityConfig, ActivityCoordinator, ConditionalFetchClient, HttpTransport, KioskSession,
    NetworkUsageMeter, SessionConfig,
};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;

pub fn init_tracing() {
    let log_format = std::env::var("LOBBYBOARD_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Everything the running display owns.
pub struct Display {
    pub session: KioskSession,
    pub settings: SettingsSync,
    /// Follows edits made to the settings file by other processes.
    pub settings_watcher: Option<SettingsFileWatcher>,
    pub coordinator: ActivityCoordinator,
    pub meter: Option<Arc<NetworkUsageMeter>>,
}

/// Open the settings file and start following outside edits to it.
///
/// A watcher that cannot start is logged; the display then only sees its own changes.
pub fn open_settings(path: &Path) -> (SettingsSync, Option<SettingsFileWatcher>) {
    let storage = Arc::new(JsonFileStorage::new(path));
    let bus = StorageBus::default();
    let settings = SettingsSync::new(storage.clone(), bus.clone());

    let watcher = match SettingsFileWatcher::spawn(storage, bus) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!("Settings file changes from other processes will be missed: {}", e);
            None
        }
    };
    (settings, watcher)
}

pub fn build_display(config: &Config) -> anyhow::Result<Display> {
    let coordinator = ActivityCoordinator::new(ActivityConfig::default());
    let meter = config.usage_meter.then(|| {
        let meter = NetworkUsageMeter::attach(&coordinator);
        meter.start();
        meter
    });

    let http = HttpTransport::new(&config.api_base_url)?;
    let client = ConditionalFetchClient::new(coordinator.install(Arc::new(http)));

    let (settings, settings_watcher) = open_settings(&config.settings_path);
    info!("Settings file in use: {}", config.settings_path.display());

    let session = KioskSession::mount(
        SessionConfig {
            building_id: config.building_id,
            timeouts: config.timeouts,
        },
        client,
        &settings,
        Arc::new(SystemClock),
    );

    Ok(Display {
        session,
        settings,
        settings_watcher,
        coordinator,
        meter,
    })
}

pub fn describe_frame(frame: Option<&ActiveScene>) -> String {
    match frame {
        Some(active) => format!(
            "scene {} '{}' ({}/{}), transition {}, {} widget(s)",
            active.scene.id,
            active.scene.name,
            active.index + 1,
            active.eligible_count,
            active.scene.transition,
            active.placements().len()
        ),
        None => "nothing to show".to_string(),
    }
}

pub async fn log_frames(mut frames: watch::Receiver<Option<ActiveScene>>) {
    while frames.changed().await.is_ok() {
        let line = describe_frame(frames.borrow_and_update().as_ref());
        info!("Now showing {}", line);
    }
}

pub async fn log_public_info(mut updates: watch::Receiver<Option<Arc<PublicInfo>>>) {
    while updates.changed().await.is_ok() {
        let latest = updates.borrow_and_update().clone();
        if let Some(info) = latest {
            info!(
                "Public info for '{}': {} announcement(s)",
                info.building_name,
                info.announcements.len()
            );
        }
    }
}

pub async fn log_latest_bill(mut updates: watch::Receiver<Option<Arc<LatestBill>>>) {
    while updates.changed().await.is_ok() {
        let latest = updates.borrow_and_update().clone();
        match latest {
            Some(bill) if bill.has_image() => info!(
                "Latest bill available (period: {})",
                bill.period.as_deref().unwrap_or("unknown")
            ),
            Some(_) => info!("No latest bill to show"),
            None => {}
        }
    }
}

/// Run until Ctrl-C, then unmount.
pub async fn run(display: Display) -> anyhow::Result<()> {
    let Display {
        session,
        settings,
        settings_watcher,
        coordinator,
        meter,
    } = display;

    let watchers = [
        tokio::spawn(log_frames(session.frames())),
        tokio::spawn(log_public_info(session.public_info())),
        tokio::spawn(log_latest_bill(session.latest_bill())),
    ];

    let current = settings.current();
    info!(
        "Kiosk running for building {} (poll every {} min, enabled: {})",
        session.building_id(),
        current.poll_interval_minutes,
        current.enabled
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
    }

    session.unmount();
    drop(settings_watcher);
    for watcher in watchers {
        watcher.abort();
    }
    if let Some(meter) = meter {
        meter.stop();
    }
    if coordinator.pending() > 0 {
        info!("{} foreground request(s) still pending at shutdown", coordinator.pending());
    }
    info!("Kiosk display stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lobbyboard_engine::SyncSettings;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_settings_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let (first, _watcher) = open_settings(&path);
        assert_eq!(first.current(), SyncSettings::default());
        first.save(SyncSettings::new(15, true)).unwrap();
        drop(first);

        let (reopened, _watcher) = open_settings(&path);
        assert_eq!(reopened.current().poll_interval_minutes, 15);
    }

    #[tokio::test]
    async fn test_display_follows_settings_written_elsewhere() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let (display, watcher) = open_settings(&path);
        assert!(watcher.is_some());
        let (admin, _admin_watcher) = open_settings(&path);

        let expected = SyncSettings::new(1, false);
        admin.save(expected).unwrap();

        let mut updates = display.watch();
        let followed = tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while display.current() != expected {
                if updates.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
        assert!(followed.is_ok(), "display kept {:?}", display.current());
        assert_eq!(display.current(), expected);
    }

    #[test]
    fn test_idle_frame_description() {
        assert_eq!(describe_frame(None), "nothing to show");
    }
}

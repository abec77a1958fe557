//! Degraded-mode wrapper around fetches.
//!
//! Whatever goes wrong upstream, callers get a payload they can render. The
//! failure itself is only written to the log, classified so that operators
//! can tell an unreachable backend from one that answers badly.

use std::future::Future;
use std::time::Duration;

use lobbyboard_engine::{FallbackPayload, SyncSourceId};
use log::warn;

use crate::conditional::{ConditionalFetchClient, Endpoint, PollOutcome};
use crate::error::{FetchError, Result};

/// Run `fetch` and substitute the static fallback for `T` if it fails.
pub async fn with_fallback<T, F>(fetch: F) -> T
where
    T: FallbackPayload,
    F: Future<Output = Result<T>>,
{
    match fetch.await {
        Ok(payload) => payload,
        Err(error) => {
            log_degraded(T::SOURCE, &error);
            T::fallback()
        }
    }
}

/// Like [`with_fallback`], with an explicit upper bound on how long `fetch` may take.
pub async fn with_fallback_timeout<T, F>(timeout: Duration, fetch: F) -> T
where
    T: FallbackPayload,
    F: Future<Output = Result<T>>,
{
    with_fallback(async {
        match tokio::time::timeout(timeout, fetch).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::timeout(T::SOURCE.as_str(), timeout)),
        }
    })
    .await
}

/// Unconditional fetch of `endpoint`, falling back on any failure.
pub async fn fetch_with_fallback<T: FallbackPayload>(
    client: &ConditionalFetchClient,
    endpoint: &Endpoint,
) -> T {
    with_fallback(async {
        match client.poll::<T>(endpoint, None).await {
            PollOutcome::Updated { payload, .. } => Ok(payload),
            PollOutcome::Unreachable(error) => Err(error),
            // Only possible with a validator, and none was sent.
            PollOutcome::Unchanged => Err(FetchError::status(endpoint.path.clone(), 304)),
        }
    })
    .await
}

/// Write one operator-facing warning for a degraded source.
pub fn log_degraded(source: SyncSourceId, error: &FetchError) {
    let kind = error.kind();
    if kind.is_unreachable() {
        warn!(
            "Backend unreachable for {} ({}), showing last known or fallback content: {}",
            source, kind, error
        );
    } else {
        warn!(
            "Backend answered badly for {} ({}), showing last known or fallback content: {}",
            source, kind, error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockTransport};
    use lobbyboard_engine::{LatestBill, PublicInfo, SceneList, WidgetList};
    use std::sync::Arc;

    async fn rejected<T: FallbackPayload>() -> T {
        with_fallback(async { Err(FetchError::connection("/x", "connection refused")) }).await
    }

    #[tokio::test]
    async fn test_every_source_degrades_to_a_valid_payload() {
        let scenes: SceneList = rejected().await;
        assert!(scenes.scenes.is_empty());

        let widgets: WidgetList = rejected().await;
        assert!(widgets.widgets.is_empty());

        let info: PublicInfo = rejected().await;
        assert_eq!(info, PublicInfo::placeholder());

        let bill: LatestBill = rejected().await;
        assert!(!bill.has_image());
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let info = with_fallback(async {
            let mut info = PublicInfo::placeholder();
            info.building_name = "Maple Court".to_string();
            Ok(info)
        })
        .await;
        assert_eq!(info.building_name, "Maple Court");
    }

    #[tokio::test(start_paused = true)]
    async fn test_widget_timeout_resolves_within_bound() {
        let mock = MockTransport::new();
        let client = ConditionalFetchClient::new(Arc::new(mock.clone()));
        let endpoint = Endpoint::for_building(SyncSourceId::Widgets, 3);
        mock.push(&endpoint.path, MockReply::Hang);

        let started = tokio::time::Instant::now();
        let widgets: WidgetList = fetch_with_fallback(&client, &endpoint).await;

        assert!(widgets.widgets.is_empty());
        assert_eq!(started.elapsed(), Duration::from_millis(5_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_timeout_wrapper() {
        let started = tokio::time::Instant::now();
        let bill: LatestBill = with_fallback_timeout(
            Duration::from_secs(15),
            std::future::pending::<Result<LatestBill>>(),
        )
        .await;
        assert_eq!(bill, LatestBill::default());
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_bad_status_falls_back_too() {
        let mock = MockTransport::new();
        let client = ConditionalFetchClient::new(Arc::new(mock.clone()));
        let endpoint = Endpoint::for_building(SyncSourceId::Scenes, 3);
        mock.push(&endpoint.path, MockReply::status(500));

        let scenes: SceneList = fetch_with_fallback(&client, &endpoint).await;
        assert!(scenes.scenes.is_empty());
    }
}

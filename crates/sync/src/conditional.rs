//! Conditional GET with cache validators.
//!
//! A poll either yields a fresh payload, confirms that the previous one is
//! still current, or reports why the backend could not be used. Callers keep
//! the validator from the last `Updated` outcome and pass it back on the next
//! poll.

use std::sync::Arc;
use std::time::Duration;

use lobbyboard_engine::{FallbackPayload, SyncSourceId};
use log::debug;

use crate::error::FetchError;
use crate::transport::{Transport, TransportRequest};

/// One polled API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub source: SyncSourceId,
    pub path: String,
    pub timeout: Duration,
}

impl Endpoint {
    pub fn for_building(source: SyncSourceId, building_id: i64) -> Self {
        Self {
            source,
            path: source.path_for_building(building_id),
            timeout: source.default_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Result of one conditional poll.
#[derive(Debug)]
pub enum PollOutcome<T> {
    /// The server sent a new representation.
    Updated {
        payload: T,
        validator: Option<String>,
    },
    /// The previously received representation is still current.
    Unchanged,
    /// The backend could not be used this time.
    Unreachable(FetchError),
}

/// Client issuing conditional requests through the installed [`Transport`].
#[derive(Clone)]
pub struct ConditionalFetchClient {
    transport: Arc<dyn Transport>,
}

impl ConditionalFetchClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Poll `endpoint`, sending `validator` as `If-None-Match` when present.
    ///
    /// The whole exchange, body included, is bounded by the endpoint timeout.
    /// Every failure comes back as [`PollOutcome::Unreachable`].
    pub async fn poll<T: FallbackPayload>(
        &self,
        endpoint: &Endpoint,
        validator: Option<&str>,
    ) -> PollOutcome<T> {
        let mut request = TransportRequest::get(endpoint.path.clone()).with_timeout(endpoint.timeout);
        if let Some(validator) = validator {
            request = request.with_validator(validator);
        }

        let response = match tokio::time::timeout(endpoint.timeout, self.transport.send(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => return PollOutcome::Unreachable(error),
            Err(_) => {
                return PollOutcome::Unreachable(FetchError::timeout(
                    endpoint.path.clone(),
                    endpoint.timeout,
                ))
            }
        };

        if response.is_not_modified() {
            if validator.is_some() {
                debug!("{} not modified", endpoint.source);
                return PollOutcome::Unchanged;
            }
            // Nothing cached to fall back on.
            return PollOutcome::Unreachable(FetchError::status(endpoint.path.clone(), 304));
        }

        if !response.is_success() {
            return PollOutcome::Unreachable(FetchError::status(
                endpoint.path.clone(),
                response.status,
            ));
        }

        // Servers that ignore If-None-Match but still send the same validator.
        if let (Some(sent), Some(received)) = (validator, response.etag.as_deref()) {
            if sent == received {
                debug!("{} answered 200 with an unchanged validator", endpoint.source);
                return PollOutcome::Unchanged;
            }
        }

        match serde_json::from_slice::<T>(&response.body) {
            Ok(payload) => PollOutcome::Updated {
                payload,
                validator: response.etag,
            },
            Err(e) => PollOutcome::Unreachable(FetchError::decode(endpoint.path.clone(), e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockReply, MockTransport};
    use lobbyboard_engine::{PublicInfo, WidgetList};
    use serde_json::json;

    fn client(mock: &MockTransport) -> ConditionalFetchClient {
        ConditionalFetchClient::new(Arc::new(mock.clone()))
    }

    fn widgets_endpoint() -> Endpoint {
        Endpoint::for_building(SyncSourceId::Widgets, 7)
    }

    #[tokio::test]
    async fn test_first_poll_is_unconditional_and_keeps_validator() {
        let mock = MockTransport::new();
        let endpoint = widgets_endpoint();
        mock.push(&endpoint.path, MockReply::json(&json!({ "widgets": [] }), Some("\"w1\"")));

        let outcome = client(&mock).poll::<WidgetList>(&endpoint, None).await;
        match outcome {
            PollOutcome::Updated { payload, validator } => {
                assert!(payload.widgets.is_empty());
                assert_eq!(validator.as_deref(), Some("\"w1\""));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(mock.requests()[0].if_none_match, None);
    }

    #[tokio::test]
    async fn test_validator_is_sent_and_304_is_unchanged() {
        let mock = MockTransport::new();
        let endpoint = widgets_endpoint();
        mock.push(&endpoint.path, MockReply::not_modified());

        let outcome = client(&mock).poll::<WidgetList>(&endpoint, Some("\"w1\"")).await;
        assert!(matches!(outcome, PollOutcome::Unchanged));
        assert_eq!(mock.requests()[0].if_none_match.as_deref(), Some("\"w1\""));
    }

    #[tokio::test]
    async fn test_304_without_validator_is_a_failure() {
        let mock = MockTransport::new();
        let endpoint = widgets_endpoint();
        mock.push(&endpoint.path, MockReply::not_modified());

        let outcome = client(&mock).poll::<WidgetList>(&endpoint, None).await;
        match outcome {
            PollOutcome::Unreachable(FetchError::Status { status, .. }) => assert_eq!(status, 304),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_validator_on_200_is_unchanged() {
        let mock = MockTransport::new();
        let endpoint = widgets_endpoint();
        mock.push(&endpoint.path, MockReply::json(&json!({ "widgets": [] }), Some("\"w1\"")));

        let outcome = client(&mock).poll::<WidgetList>(&endpoint, Some("\"w1\"")).await;
        assert!(matches!(outcome, PollOutcome::Unchanged));
    }

    #[tokio::test]
    async fn test_server_error_and_bad_body_are_unreachable() {
        let mock = MockTransport::new();
        let endpoint = Endpoint::for_building(SyncSourceId::PublicInfo, 7);
        mock.push(&endpoint.path, MockReply::status(503));
        mock.push(&endpoint.path, MockReply::raw(200, "{\"buildingName\": 5"));

        let client = client(&mock);
        let first = client.poll::<PublicInfo>(&endpoint, None).await;
        let second = client.poll::<PublicInfo>(&endpoint, None).await;

        match first {
            PollOutcome::Unreachable(error) => assert_eq!(error.kind(), crate::FailureKind::UpstreamStatus),
            other => panic!("unexpected outcome: {:?}", other),
        }
        match second {
            PollOutcome::Unreachable(error) => assert_eq!(error.kind(), crate::FailureKind::MalformedPayload),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_request_times_out_at_endpoint_deadline() {
        let mock = MockTransport::new();
        let endpoint = widgets_endpoint();
        mock.push(&endpoint.path, MockReply::Hang);

        let started = tokio::time::Instant::now();
        let outcome = client(&mock).poll::<WidgetList>(&endpoint, None).await;

        assert_eq!(started.elapsed(), Duration::from_millis(5_000));
        match outcome {
            PollOutcome::Unreachable(error) => assert!(error.is_timeout()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}

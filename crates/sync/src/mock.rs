//! Scripted [`Transport`] for tests and offline demos.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{FetchError, Result};
use crate::transport::{Transport, TransportRequest, TransportResponse};

/// One scripted reaction to a request.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond(TransportResponse),
    Fail(FetchError),
    /// Never answers; the caller's timeout has to fire.
    Hang,
}

impl MockReply {
    /// 200 with a JSON body and an optional validator.
    pub fn json<T: Serialize>(value: &T, etag: Option<&str>) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::Respond(TransportResponse {
            status: 200,
            etag: etag.map(str::to_string),
            body,
        })
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self::Respond(TransportResponse {
            status,
            etag: None,
            body: body.as_bytes().to_vec(),
        })
    }

    pub fn not_modified() -> Self {
        Self::Respond(TransportResponse {
            status: 304,
            etag: None,
            body: Vec::new(),
        })
    }

    pub fn status(status: u16) -> Self {
        Self::raw(status, "")
    }

    pub fn refused() -> Self {
        Self::Fail(FetchError::connection("mock", "connection refused"))
    }
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<MockReply>>,
    fallback: HashMap<String, MockReply>,
    requests: Vec<TransportRequest>,
    delay: Duration,
}

/// In-memory transport answering from per-path scripts.
///
/// Queued replies are consumed in order; once a path's queue is empty the
/// sticky reply set with [`always`](Self::always) answers. Paths with no
/// script at all get a connection failure.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a one-shot reply for `path`.
    pub fn push(&self, path: &str, reply: MockReply) {
        self.lock()
            .replies
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Reply used for `path` whenever its queue is empty.
    pub fn always(&self, path: &str, reply: MockReply) {
        self.lock().fallback.insert(path.to_string(), reply);
    }

    /// Simulated latency applied to every reply.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.lock().requests.clone()
    }

    pub fn requests_for(&self, path: &str) -> Vec<TransportRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.path == path)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let (reply, delay) = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            let queued = state
                .replies
                .get_mut(&request.path)
                .and_then(VecDeque::pop_front);
            let reply = queued.or_else(|| state.fallback.get(&request.path).cloned());
            (reply, state.delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(MockReply::Respond(response)) => Ok(response),
            Some(MockReply::Fail(error)) => Err(error),
            Some(MockReply::Hang) => std::future::pending().await,
            None => Err(FetchError::connection(
                request.path,
                "no scripted reply",
            )),
        }
    }
}

//! Outbound JSON-RPC/SSE calls to a single upstream MCP server. Stateless with respect to any particular upstream's identity —
//! the caller (Upstream Registry) owns the per-upstream session id and
//! passes it in on each call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use gateway_core::rpc::{JsonRpcRequest, JsonRpcResponse, RpcEvent};
use reqwest::header::{HeaderMap, HeaderValue};
use tokio::sync::{mpsc, Mutex, Semaphore};

use crate::error::TransportError;

const SESSION_HEADER: &str = "Mcp-Session-Id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";

/// Result of a single outbound `tools/call`: the
/// gateway mirrors whichever response shape the upstream produced.
pub enum UpstreamOutcome {
    Unary(JsonRpcResponse),
    /// Events are forwarded to the caller's session buffer in order;
    /// `event_id` here is the *upstream's* id and must be translated to a
    /// gateway-scoped one by the receiver before it is appended.
    Stream(mpsc::Receiver<RpcEvent>),
}

/// Per-upstream in-flight cap and bounded wait queue. `admission` bounds
/// calls that are either running or queued (`max_in_flight + queue_cap`
/// permits); a non-blocking `try_acquire` against it is what returns
/// `UPSTREAM_SATURATED` for overflow. `in_flight` then bounds how many of
/// the admitted calls actually run concurrently — waiting on it is the
/// "queued" state.
struct UpstreamLimiter {
    admission: Arc<Semaphore>,
    in_flight: Arc<Semaphore>,
}

impl UpstreamLimiter {
    fn new(max_in_flight: usize, queue_cap: usize) -> Self {
        Self {
            admission: Arc::new(Semaphore::new(max_in_flight + queue_cap)),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
        }
    }
}

pub struct TransportClient {
    http: reqwest::Client,
    limiters: Mutex<HashMap<String, Arc<UpstreamLimiter>>>,
    max_in_flight: usize,
    queue_cap: usize,
    unary_timeout: Duration,
}

impl TransportClient {
    pub fn new(max_in_flight: usize, queue_cap: usize, unary_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(Self {
            http,
            limiters: Mutex::new(HashMap::new()),
            max_in_flight,
            queue_cap,
            unary_timeout,
        })
    }

    async fn limiter_for(&self, upstream_id: &str) -> Arc<UpstreamLimiter> {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(upstream_id.to_string())
            .or_insert_with(|| Arc::new(UpstreamLimiter::new(self.max_in_flight, self.queue_cap)))
            .clone()
    }

    /// Sends the upstream `initialize` handshake and returns the upstream-assigned session id, if any.
    pub async fn initialize(&self, upstream_id: &str, base_url: &str) -> Result<Option<String>, TransportError> {
        let request = JsonRpcRequest::new(
            Some(serde_json::Value::from(1)),
            "initialize",
            Some(serde_json::json!({ "protocolVersion": gateway_core::rpc::PROTOCOL_VERSION })),
        );
        let (_, session_id) = self.send_unary(upstream_id, base_url, None, &request).await?;
        Ok(session_id)
    }

    /// Fetches the upstream's tool catalog.
    pub async fn list_tools(
        &self,
        upstream_id: &str,
        base_url: &str,
        upstream_session_id: Option<&str>,
    ) -> Result<serde_json::Value, TransportError> {
        let request = JsonRpcRequest::new(Some(serde_json::Value::from(2)), "tools/list", None);
        let (response, _) = self.send_unary(upstream_id, base_url, upstream_session_id, &request).await?;
        if let Some(error) = response.error {
            return Err(TransportError::Malformed(error.message));
        }
        response.result.ok_or_else(|| TransportError::Malformed("tools/list returned no result".into()))
    }

    /// Lightweight health ping: a trivial
    /// `tools/list` used purely to confirm liveness.
    pub async fn ping(&self, upstream_id: &str, base_url: &str, upstream_session_id: Option<&str>) -> Result<(), TransportError> {
        self.list_tools(upstream_id, base_url, upstream_session_id).await.map(|_| ())
    }

    /// Forwards a `tools/call` (or any JSON-RPC method) to the upstream,
    /// acquiring the per-upstream in-flight permit first. Origin and JWT
    /// headers are never forwarded. Returns the upstream-assigned session
    /// id alongside the outcome whenever the response carries one, so a
    /// first-contact `initialize` can be cached by the caller.
    pub async fn call(
        &self,
        upstream_id: &str,
        base_url: &str,
        upstream_session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> Result<(UpstreamOutcome, Option<String>), TransportError> {
        let limiter = self.limiter_for(upstream_id).await;

        let admission_permit = limiter
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| TransportError::Saturated)?;

        let in_flight_permit = limiter
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Cancelled)?;

        let outcome = self.dispatch(base_url, upstream_session_id, request).await;
        drop(in_flight_permit);
        drop(admission_permit);
        outcome
    }

    async fn dispatch(
        &self,
        base_url: &str,
        upstream_session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> Result<(UpstreamOutcome, Option<String>), TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(PROTOCOL_HEADER, HeaderValue::from_static(gateway_core::rpc::PROTOCOL_VERSION));
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json, text/event-stream"));
        if let Some(session_id) = upstream_session_id {
            let value = HeaderValue::from_str(session_id).map_err(|e| TransportError::Malformed(e.to_string()))?;
            headers.insert(SESSION_HEADER, value);
        }

        let response = self
            .http
            .post(base_url)
            .headers(headers)
            .json(request)
            .timeout(self.unary_timeout)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status: status.as_u16(), body });
        }

        let response_session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| upstream_session_id.map(str::to_string));

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("text/event-stream") {
            let (tx, rx) = mpsc::channel(64);
            let mut stream = response.bytes_stream().eventsource();
            tokio::spawn(async move {
                let mut next_id = 0u64;
                while let Some(event) = stream.next().await {
                    let Ok(event) = event else { break };
                    let Ok(payload) = serde_json::from_str::<serde_json::Value>(&event.data) else { continue };
                    next_id += 1;
                    if tx.send(RpcEvent { event_id: next_id, payload }).await.is_err() {
                        break;
                    }
                }
            });
            return Ok((UpstreamOutcome::Stream(rx), response_session_id));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;
        Ok((UpstreamOutcome::Unary(body), response_session_id))
    }

    /// Helper for handshake/control calls that only ever expect a unary
    /// JSON response, returning the upstream-assigned session id from the
    /// response headers if present.
    async fn send_unary(
        &self,
        upstream_id: &str,
        base_url: &str,
        upstream_session_id: Option<&str>,
        request: &JsonRpcRequest,
    ) -> Result<(JsonRpcResponse, Option<String>), TransportError> {
        match self.call(upstream_id, base_url, upstream_session_id, request).await? {
            (UpstreamOutcome::Unary(response), session_id) => Ok((response, session_id)),
            (UpstreamOutcome::Stream(mut rx), session_id) => {
                let Some(event) = rx.recv().await else {
                    return Err(TransportError::Malformed("upstream closed stream with no events".into()));
                };
                let response: JsonRpcResponse = serde_json::from_value(event.payload)
                    .map_err(|e| TransportError::Malformed(e.to_string()))?;
                Ok((response, session_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limiter_saturates_past_capacity() {
        let client = TransportClient::new(1, 0, Duration::from_secs(1)).unwrap();
        let limiter = client.limiter_for("srv-1").await;
        let _permit = limiter.admission.clone().try_acquire_owned().unwrap();
        assert!(limiter.admission.clone().try_acquire_owned().is_err());
    }

    #[tokio::test]
    async fn connect_error_maps_to_upstream_error_kind() {
        let client = TransportClient::new(4, 8, Duration::from_millis(200)).unwrap();
        let request = JsonRpcRequest::new(Some(serde_json::Value::from(1)), "tools/list", None);
        let err = client.call("srv-1", "http://127.0.0.1:1", None, &request).await.unwrap_err();
        assert_eq!(err.kind(), "UPSTREAM_ERROR");
    }
}

//! A single MCP session: its state machine, bounded ring event buffer,
//! and the one-consumer SSE backpressure queue.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use gateway_core::rpc::RpcEvent;
use base64::Engine;
use rand::RngCore;
use tokio::sync::{mpsc, Mutex};

use crate::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Creating,
    Active,
    Closing,
    Closed,
}

/// 32 random bytes, base64url-encoded, unique per instance.
pub fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

struct Buffer {
    events: VecDeque<RpcEvent>,
    capacity: usize,
    oldest_retained: u64,
}

impl Buffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            oldest_retained: 1,
        }
    }

    fn push(&mut self, event: RpcEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.oldest_retained += 1;
        }
        self.events.push_back(event);
    }

    fn since(&self, last_event_id: Option<u64>) -> Result<Vec<RpcEvent>, SessionError> {
        let Some(last) = last_event_id else {
            return Ok(self.events.iter().cloned().collect());
        };
        if last != 0 && last < self.oldest_retained.saturating_sub(1) && !self.events.is_empty() {
            return Err(SessionError::StreamGap { requested: last, oldest: self.oldest_retained });
        }
        Ok(self.events.iter().filter(|e| e.event_id > last).cloned().collect())
    }
}

pub struct Session {
    pub id: String,
    pub user_id: Option<String>,
    state: RwLock<SessionState>,
    buffer: Mutex<Buffer>,
    next_event_id: AtomicU64,
    last_activity: RwLock<DateTime<Utc>>,
    subscriber: Mutex<Option<mpsc::Sender<RpcEvent>>>,
}

impl Session {
    pub fn new(id: String, user_id: Option<String>, buffer_capacity: usize) -> Self {
        Self {
            id,
            user_id,
            state: RwLock::new(SessionState::Creating),
            buffer: Mutex::new(Buffer::new(buffer_capacity)),
            next_event_id: AtomicU64::new(1),
            last_activity: RwLock::new(Utc::now()),
            subscriber: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read().unwrap()
    }

    pub fn transition(&self, new_state: SessionState) {
        *self.state.write().unwrap() = new_state;
    }

    pub fn touch(&self) {
        *self.last_activity.write().unwrap() = Utc::now();
    }

    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - *self.last_activity.read().unwrap()
    }

    /// Appends a gateway-scoped event to the ring buffer and, if an SSE
    /// writer is currently subscribed, forwards it; a full subscriber
    /// queue closes the session.
    pub async fn append_event(&self, payload: serde_json::Value) -> Result<RpcEvent, SessionError> {
        let event_id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let event = RpcEvent { event_id, payload };

        self.buffer.lock().await.push(event.clone());
        self.touch();

        let mut subscriber = self.subscriber.lock().await;
        if let Some(tx) = subscriber.as_ref() {
            if tx.try_send(event.clone()).is_err() {
                *subscriber = None;
                self.transition(SessionState::Closed);
                return Err(SessionError::BackpressureExceeded);
            }
        }
        Ok(event)
    }

    /// Replays buffered events after `last_event_id`, or the whole
    /// buffer when `last_event_id` is `None` (a fresh subscribe).
    pub async fn events_since(&self, last_event_id: Option<u64>) -> Result<Vec<RpcEvent>, SessionError> {
        self.buffer.lock().await.since(last_event_id)
    }

    /// Registers the single SSE writer task as this session's consumer,
    /// replacing any prior one (a reconnect supersedes the old writer).
    pub async fn subscribe(&self, queue_cap: usize) -> mpsc::Receiver<RpcEvent> {
        let (tx, rx) = mpsc::channel(queue_cap);
        *self.subscriber.lock().await = Some(tx);
        rx
    }

    pub async fn unsubscribe(&self) {
        *self.subscriber.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_43_char_base64url_for_32_bytes() {
        let id = new_session_id();
        assert_eq!(id.len(), 43);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }

    #[tokio::test]
    async fn append_then_since_replays_in_order() {
        let session = Session::new("s1".into(), None, 256);
        session.append_event(serde_json::json!({"a": 1})).await.unwrap();
        session.append_event(serde_json::json!({"a": 2})).await.unwrap();
        let events = session.events_since(None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, 1);
        assert_eq!(events[1].event_id, 2);
    }

    #[tokio::test]
    async fn resume_after_last_event_id_returns_only_newer() {
        let session = Session::new("s1".into(), None, 256);
        session.append_event(serde_json::json!({"a": 1})).await.unwrap();
        session.append_event(serde_json::json!({"a": 2})).await.unwrap();
        let events = session.events_since(Some(1)).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, 2);
    }

    #[tokio::test]
    async fn stream_gap_when_requested_id_older_than_buffer() {
        let session = Session::new("s1".into(), None, 2);
        for i in 0..5 {
            session.append_event(serde_json::json!({"a": i})).await.unwrap();
        }
        let err = session.events_since(Some(1)).await.unwrap_err();
        assert_eq!(err.kind(), "STREAM_GAP");
    }

    #[tokio::test]
    async fn full_subscriber_queue_closes_session() {
        let session = Session::new("s1".into(), None, 256);
        let _rx = session.subscribe(1).await;
        session.append_event(serde_json::json!({"a": 1})).await.unwrap();
        let err = session.append_event(serde_json::json!({"a": 2})).await.unwrap_err();
        assert_eq!(err.kind(), "BACKPRESSURE_EXCEEDED");
        assert_eq!(session.state(), SessionState::Closed);
    }
}

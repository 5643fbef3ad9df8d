//! The Session Manager: creates, looks up, and closes
//! sessions, and runs the inactivity reaper.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::SessionError;
use crate::session::{new_session_id, Session, SessionState};

pub struct SessionManagerConfig {
    pub buffer_capacity: usize,
    pub sse_queue_capacity: usize,
    pub idle_timeout: chrono::Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            sse_queue_capacity: 64,
            idle_timeout: chrono::Duration::seconds(300),
        }
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(config: SessionManagerConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn sse_queue_capacity(&self) -> usize {
        self.config.sse_queue_capacity
    }

    /// Creates a new session in `Creating` state, transitioning to
    /// `Active` once `initialize` completes successfully.
    pub fn create(&self, user_id: Option<String>) -> Arc<Session> {
        let id = new_session_id();
        let session = Arc::new(Session::new(id.clone(), user_id, self.config.buffer_capacity));
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn activate(&self, session: &Session) {
        session.transition(SessionState::Active);
    }

    pub fn get(&self, session_id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.clone())
            .filter(|s| s.state() != SessionState::Closed)
            .ok_or_else(|| SessionError::Unknown(session_id.to_string()))
    }

    /// Closes a session explicitly (DELETE, or the reaper) and removes it
    /// from the table.
    pub async fn close(&self, session_id: &str) {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            session.transition(SessionState::Closing);
            session.unsubscribe().await;
            session.transition(SessionState::Closed);
        }
    }

    /// Closes every open session.
    pub async fn close_all(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.close(&id).await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Spawns the periodic idle sweep: closes every session whose last
    /// activity is older than the configured idle timeout.
    pub fn spawn_reaper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let idle: Vec<String> = manager
                    .sessions
                    .iter()
                    .filter(|e| e.value().idle_for() > manager.config.idle_timeout)
                    .map(|e| e.key().clone())
                    .collect();
                for id in idle {
                    tracing::info!(session_id = %id, "closing idle session");
                    manager.close(&id).await;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let manager = SessionManager::new(SessionManagerConfig::default());
        let session = manager.create(Some("u1".into()));
        let fetched = manager.get(&session.id).unwrap();
        assert_eq!(fetched.id, session.id);
    }

    #[tokio::test]
    async fn close_removes_from_table() {
        let manager = SessionManager::new(SessionManagerConfig::default());
        let session = manager.create(None);
        manager.close(&session.id).await;
        assert!(manager.get(&session.id).is_err());
    }

    #[tokio::test]
    async fn reaper_closes_idle_sessions() {
        let mut config = SessionManagerConfig::default();
        config.idle_timeout = chrono::Duration::milliseconds(10);
        let manager = Arc::new(SessionManager::new(config));
        let session = manager.create(None);
        session.transition(SessionState::Active);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let handle = manager.spawn_reaper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(manager.get(&session.id).is_err());
    }
}

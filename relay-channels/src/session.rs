//! Conversational session store with TTL eviction.
//!
//! Sessions are memory-resident and lost on restart. That is a deliberate
//! limitation of this service, not a defect: the platform retries nothing
//! and a fresh session simply starts a fresh conversation.

use relay_gateway::{Role, Turn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One conversation's state.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bounded recent-turn window, oldest first
    pub history: Vec<Turn>,
    /// Updated on every inbound or outbound turn
    pub last_active: Instant,
}

/// In-process store mapping conversation identifiers to sessions.
///
/// The single shared mutable resource of the service. All mutation happens
/// under one write lock, so an append is atomic with respect to a
/// concurrent sweep: a session is never evicted mid-append, and appending
/// to a just-evicted id recreates it cleanly.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    max_history: usize,
}

impl SessionStore {
    /// Create a store retaining at most `max_history` turns per session.
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    /// Append a turn to the session for `id`, creating it if absent.
    ///
    /// Trims the history to the retention window (oldest non-system turns
    /// dropped first), bumps `last_active`, and returns a snapshot of the
    /// trimmed history for the caller's completion request. Concurrent
    /// appends for the same id serialize on the write lock and both turns
    /// are preserved in lock-acquisition order.
    pub async fn append_turn(&self, id: &str, role: Role, text: &str) -> Vec<Turn> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.to_string()).or_insert_with(|| Session {
            history: Vec::new(),
            last_active: Instant::now(),
        });

        session.history.push(Turn::new(role, text));
        trim_history(&mut session.history, self.max_history);
        session.last_active = Instant::now();

        session.history.clone()
    }

    /// Delete every session idle longer than `ttl`. Returns the count.
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_active) <= ttl);
        before - sessions.len()
    }

    /// Number of currently loaded sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Whether a session exists for `id`.
    pub async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// Snapshot of a session's history, if present.
    pub async fn history(&self, id: &str) -> Option<Vec<Turn>> {
        self.sessions.read().await.get(id).map(|s| s.history.clone())
    }
}

/// Drop oldest non-system turns until the history fits the window.
fn trim_history(history: &mut Vec<Turn>, max: usize) {
    while history.len() > max {
        let Some(idx) = history.iter().position(|t| t.role != Role::System) else {
            break;
        };
        history.remove(idx);
    }
}

/// Spawn the eviction sweeper as a background task.
///
/// Owned by the server lifecycle: the caller holds the handle and aborts
/// it on shutdown so tests tear down cleanly.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    period: Duration,
    ttl: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick fires immediately; skip it so sweeps start one
        // period after startup.
        interval.tick().await;

        loop {
            interval.tick().await;
            let evicted = store.sweep(ttl).await;
            if evicted > 0 {
                tracing::info!(evicted, "Evicted expired sessions");
            }
        }
    })
}

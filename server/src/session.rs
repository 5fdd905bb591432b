//! Identity-keyed registry of live connections.
//!
//! One active session per player identity: a newer authenticated connection
//! for the same identity supersedes the older one, which is closed with the
//! session-replaced code. Sessions are registered by the endpoint; the match
//! manager reaches connections only through the cloneable [`ConnectionHandle`]
//! stored here and in the match player slots.

use crate::auth::PlayerIdentity;
use crate::outbound::OutboundQueue;
use crate::util::now_millis;
use shared::protocol::{ServerEvent, CLOSE_SESSION_REPLACED};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Weak-style reference to one connection: who it is, which registration it
/// belongs to, and where its outbound frames go.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub identity: PlayerIdentity,
    /// Registration sequence; distinguishes a replaced session from its
    /// successor for the same identity.
    pub seq: u64,
    queue: Arc<OutboundQueue>,
    last_seen: Arc<AtomicU64>,
}

impl ConnectionHandle {
    pub fn send(&self, event: ServerEvent) {
        self.queue.push(event);
    }

    pub fn close(&self, code: u16, reason: &str) {
        self.queue.close(code, reason);
    }

    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    /// Records inbound traffic for the heartbeat sweeper.
    pub fn touch(&self) {
        self.last_seen.store(now_millis(), Ordering::Relaxed);
    }

    pub fn idle_longer_than(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_millis().saturating_sub(last) > timeout.as_millis() as u64
    }
}

/// All live sessions, keyed by player id.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ConnectionHandle>>,
    next_seq: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection for `identity`. If the identity already had a
    /// session, it is closed with code 4001 and returned so the caller can
    /// log the replacement.
    pub fn register(
        &self,
        identity: PlayerIdentity,
        queue: Arc<OutboundQueue>,
    ) -> (ConnectionHandle, Option<ConnectionHandle>) {
        let handle = ConnectionHandle {
            identity: identity.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            queue,
            last_seen: Arc::new(AtomicU64::new(now_millis())),
        };

        let replaced = self
            .sessions
            .lock()
            .unwrap()
            .insert(identity.id, handle.clone());
        if let Some(old) = &replaced {
            old.close(CLOSE_SESSION_REPLACED, "session replaced");
        }

        (handle, replaced)
    }

    /// Removes the session for `player_id` if it still belongs to
    /// registration `seq`. Returns `false` when the session was already
    /// replaced or gone, in which case the caller must not treat the socket
    /// loss as a player disconnect.
    pub fn unregister(&self, player_id: &str, seq: u64) -> bool {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get(player_id) {
            Some(current) if current.seq == seq => {
                sessions.remove(player_id);
                true
            }
            _ => false,
        }
    }

    pub fn handle_for(&self, player_id: &str) -> Option<ConnectionHandle> {
        self.sessions.lock().unwrap().get(player_id).cloned()
    }

    /// Sends an event to every live session.
    pub fn broadcast(&self, event: &ServerEvent) {
        let sessions = self.sessions.lock().unwrap();
        for handle in sessions.values() {
            handle.send(event.clone());
        }
    }

    /// Sessions with no inbound traffic for longer than `timeout`.
    pub fn idle_sessions(&self, timeout: Duration) -> Vec<ConnectionHandle> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .values()
            .filter(|h| h.idle_longer_than(timeout))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

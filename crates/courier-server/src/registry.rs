//! The per-peer session registry, keyed by the routing identity the peer
//! announced at handshake (§4.4).

use std::sync::Arc;

use courier_session::Session;
use dashmap::DashMap;

/// `(target_id, target_sub_id)` — the identity a confirmed session is
/// reachable at for outbound routing.
pub type RegistryKey = (String, String);

/// Concurrent registry of confirmed sessions, grounded on the teacher's
/// `DashMap<PeerId, Arc<PeerConnection>>` session-manager pattern.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<RegistryKey, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn insert(&self, session: Arc<Session>) {
        self.sessions.insert((session.target_id(), session.target_sub_id()), session);
    }

    pub fn remove(&self, key: &RegistryKey) {
        self.sessions.remove(key);
    }

    /// All sessions whose `(target_id, target_sub_id)` equals `key`.
    pub fn get(&self, key: &RegistryKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Every session whose `target_id` equals `target_id`, regardless of
    /// `target_sub_id` — used when an outbound container addresses a bare
    /// `target_id` (§4.4).
    pub fn all_with_target_id(&self, target_id: &str) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|entry| entry.key().0 == target_id)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Every session currently registered (used for broadcast).
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Every registered session with `bridge_mode = true` — these receive
    /// outbound containers regardless of target match (§4.4's bridge_mode
    /// bypass).
    pub fn all_bridges(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().bridge_mode())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

//! Online-Player Registry
//!
//! Process-wide map from authenticated username to that user's live
//! connection handle. Shared by every connection task; all operations are
//! atomic with respect to concurrent readers and writers, with no locking
//! required from callers.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::game::state::Side;
use crate::network::protocol::ServerMessage;
use crate::network::session::MatchSession;

/// One connection's view of a bound match: the shared session plus which of
/// its two sides this connection plays.
#[derive(Clone)]
pub struct MatchBinding {
    /// The match shared with the opponent's connection.
    pub session: Arc<Mutex<MatchSession>>,
    /// This connection's side of it.
    pub side: Side,
}

/// Capability bound to one live connection: queue outbound messages to it,
/// and bind it into a match. Cloneable; all clones address the same
/// connection.
///
/// The binding cell is how the accepter's task installs a new match on the
/// challenger's connection without touching the challenger's task state.
#[derive(Clone)]
pub struct ClientHandle {
    sender: mpsc::Sender<ServerMessage>,
    binding: Arc<RwLock<Option<MatchBinding>>>,
}

impl ClientHandle {
    /// Wrap the outbound channel of a connection.
    pub fn new(sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            sender,
            binding: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue one message to this connection. Best-effort: a closed channel
    /// means the connection is already tearing down.
    pub async fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message).await;
    }

    /// Install a match binding, replacing any previous one.
    pub async fn bind(&self, binding: MatchBinding) {
        *self.binding.write().await = Some(binding);
    }

    /// The currently bound match, if any.
    pub async fn binding(&self) -> Option<MatchBinding> {
        self.binding.read().await.clone()
    }
}

/// Username -> handle map of everyone currently online.
pub struct SessionRegistry {
    players: RwLock<BTreeMap<String, ClientHandle>>,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            players: RwLock::new(BTreeMap::new()),
        }
    }

    /// Associate `username` with `handle`, unconditionally overwriting any
    /// prior entry. A second login with the same name silently displaces the
    /// first connection's entry; the first connection stays open, unaware.
    pub async fn put(&self, username: String, handle: ClientHandle) {
        self.players.write().await.insert(username, handle);
    }

    /// Handle of the named user, if online.
    pub async fn get(&self, username: &str) -> Option<ClientHandle> {
        self.players.read().await.get(username).cloned()
    }

    /// Remove the named user's entry; called once per connection teardown.
    pub async fn remove(&self, username: &str) {
        self.players.write().await.remove(username);
    }

    /// Usernames of everyone online, in sorted order.
    pub async fn usernames(&self) -> Vec<String> {
        self.players.read().await.keys().cloned().collect()
    }

    /// Number of online users.
    pub async fn online_count(&self) -> usize {
        self.players.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

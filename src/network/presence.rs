//! Presence Registry
//!
//! Tracks which connections belong to which user. A user may hold several
//! connections at once; they are online while at least one remains. The
//! online/offline transitions are broadcast to every other user exactly once
//! per transition.

use std::collections::{BTreeSet, HashMap};

use serde::{Serialize, Deserialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::network::protocol::{ConnectionId, ServerMessage};

/// Outbound channel to one connection's writer task.
pub type ClientSender = mpsc::Sender<ServerMessage>;

/// Live status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresenceStatus {
    /// No live connection.
    Offline,
    /// Connected, not seated in a room.
    Online,
    /// Seated in an active room.
    Playing,
}

#[derive(Default)]
struct PresenceInner {
    /// Connection -> (username, sender).
    connections: HashMap<ConnectionId, (String, ClientSender)>,
    /// Username -> connections.
    users: HashMap<String, BTreeSet<ConnectionId>>,
}

/// Connection/user index.
#[derive(Default)]
pub struct PresenceRegistry {
    inner: RwLock<PresenceInner>,
}

impl PresenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a username.
    ///
    /// Returns `true` if this is the user's first live connection, in which
    /// case every other online user receives `userConnected`. Re-registering
    /// a connection under a different name moves it.
    pub async fn register(&self, connection: ConnectionId, username: &str, sender: ClientSender) -> bool {
        let mut came_online = false;
        let mut went_offline = None;

        {
            let mut inner = self.inner.write().await;

            if let Some((previous, _)) = inner.connections.get(&connection).cloned() {
                if previous == username {
                    return false;
                }
                if remove_connection(&mut inner, connection, &previous) {
                    went_offline = Some(previous);
                }
            }

            inner.connections.insert(connection, (username.to_string(), sender));
            let set = inner.users.entry(username.to_string()).or_default();
            set.insert(connection);
            if set.len() == 1 {
                came_online = true;
            }
        }

        if let Some(previous) = went_offline {
            info!(username = %previous, "User offline");
            self.broadcast_except(&previous, ServerMessage::UserDisconnected { username: previous.clone() })
                .await;
        }

        if came_online {
            info!(username, connection, "User online");
            self.broadcast_except(username, ServerMessage::UserConnected { username: username.to_string() })
                .await;
        } else {
            debug!(username, connection, "Additional connection");
        }

        came_online
    }

    /// Remove a connection.
    ///
    /// Returns the username it was bound to and whether the user is now
    /// fully offline. `userDisconnected` is broadcast only on that final
    /// removal.
    pub async fn unregister(&self, connection: ConnectionId) -> Option<(String, bool)> {
        let (username, offline) = {
            let mut inner = self.inner.write().await;
            let (username, _) = inner.connections.get(&connection).cloned()?;
            let offline = remove_connection(&mut inner, connection, &username);
            (username, offline)
        };

        if offline {
            info!(username = %username, "User offline");
            self.broadcast_except(&username, ServerMessage::UserDisconnected { username: username.clone() })
                .await;
        } else {
            debug!(username = %username, connection, "Connection closed, user still online");
        }

        Some((username, offline))
    }

    /// Is the user online?
    pub async fn is_online(&self, username: &str) -> bool {
        self.inner
            .read()
            .await
            .users
            .get(username)
            .map_or(false, |set| !set.is_empty())
    }

    /// Live connections of a user in id order.
    pub async fn connections_for(&self, username: &str) -> Vec<(ConnectionId, ClientSender)> {
        let inner = self.inner.read().await;
        let Some(set) = inner.users.get(username) else {
            return Vec::new();
        };
        set.iter()
            .filter_map(|id| inner.connections.get(id).map(|(_, tx)| (*id, tx.clone())))
            .collect()
    }

    /// Lowest-id (oldest) live connection of a user.
    pub async fn primary_connection(&self, username: &str) -> Option<(ConnectionId, ClientSender)> {
        self.connections_for(username).await.into_iter().next()
    }

    /// Username bound to a connection.
    pub async fn username_of(&self, connection: ConnectionId) -> Option<String> {
        self.inner
            .read()
            .await
            .connections
            .get(&connection)
            .map(|(name, _)| name.clone())
    }

    /// Online/offline status. Callers that know about rooms upgrade
    /// `Online` to `Playing`.
    pub async fn status_of(&self, username: &str, seated: bool) -> PresenceStatus {
        if !self.is_online(username).await {
            PresenceStatus::Offline
        } else if seated {
            PresenceStatus::Playing
        } else {
            PresenceStatus::Online
        }
    }

    /// Deliver a message to every connection of a user.
    ///
    /// Best effort: silently does nothing if the user is offline, and drops
    /// the message for any connection whose queue is full.
    pub async fn notify_user(&self, username: &str, message: ServerMessage) {
        for (connection, sender) in self.connections_for(username).await {
            if sender.try_send(message.clone()).is_err() {
                debug!(username, connection, "Dropped notification");
            }
        }
    }

    /// Deliver a message to every connection.
    pub async fn broadcast_all(&self, message: ServerMessage) {
        let inner = self.inner.read().await;
        for (_, sender) in inner.connections.values() {
            let _ = sender.try_send(message.clone());
        }
    }

    /// Number of identified connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    async fn broadcast_except(&self, username: &str, message: ServerMessage) {
        let inner = self.inner.read().await;
        for (name, sender) in inner.connections.values() {
            if name != username {
                let _ = sender.try_send(message.clone());
            }
        }
    }
}

/// Returns `true` if the user has no connections left.
fn remove_connection(inner: &mut PresenceInner, connection: ConnectionId, username: &str) -> bool {
    inner.connections.remove(&connection);
    let Some(set) = inner.users.get_mut(username) else {
        return false;
    };
    set.remove(&connection);
    if set.is_empty() {
        inner.users.remove(username);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    fn channel() -> (ClientSender, Receiver<ServerMessage>) {
        mpsc::channel(64)
    }

    fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn count_disconnects(messages: &[ServerMessage], who: &str) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::UserDisconnected { username } if username == who))
            .count()
    }

    #[tokio::test]
    async fn test_two_connections_one_offline_transition() {
        let presence = PresenceRegistry::new();
        let (observer_tx, mut observer_rx) = channel();
        let (a1, _r1) = channel();
        let (a2, _r2) = channel();

        presence.register(100, "observer", observer_tx).await;
        assert!(presence.register(1, "alice", a1).await);
        assert!(!presence.register(2, "alice", a2).await);

        let seen = drain(&mut observer_rx);
        let connects = seen
            .iter()
            .filter(|m| matches!(m, ServerMessage::UserConnected { username } if username == "alice"))
            .count();
        assert_eq!(connects, 1);

        // Losing one of two connections keeps the user online
        assert_eq!(presence.unregister(1).await, Some(("alice".to_string(), false)));
        assert!(presence.is_online("alice").await);
        assert_eq!(presence.status_of("alice", false).await, PresenceStatus::Online);
        assert_eq!(count_disconnects(&drain(&mut observer_rx), "alice"), 0);

        // Losing the last one fires exactly one event
        assert_eq!(presence.unregister(2).await, Some(("alice".to_string(), true)));
        assert!(!presence.is_online("alice").await);
        assert_eq!(count_disconnects(&drain(&mut observer_rx), "alice"), 1);

        // Unknown connection is a no-op
        assert_eq!(presence.unregister(2).await, None);
        assert_eq!(count_disconnects(&drain(&mut observer_rx), "alice"), 0);
    }

    #[tokio::test]
    async fn test_status_of() {
        let presence = PresenceRegistry::new();
        let (tx, _rx) = channel();
        assert_eq!(presence.status_of("bob", true).await, PresenceStatus::Offline);
        presence.register(1, "bob", tx).await;
        assert_eq!(presence.status_of("bob", false).await, PresenceStatus::Online);
        assert_eq!(presence.status_of("bob", true).await, PresenceStatus::Playing);
    }

    #[tokio::test]
    async fn test_notify_user_reaches_all_connections() {
        let presence = PresenceRegistry::new();
        let (t1, mut r1) = channel();
        let (t2, mut r2) = channel();
        presence.register(1, "carol", t1).await;
        presence.register(2, "carol", t2).await;

        presence
            .notify_user("carol", ServerMessage::PlayerStatsInvalidated { username: "carol".into() })
            .await;
        assert_eq!(drain(&mut r1).len(), 1);
        assert_eq!(drain(&mut r2).len(), 1);

        // Offline user: silent no-op
        presence
            .notify_user("nobody", ServerMessage::PlayerStatsInvalidated { username: "nobody".into() })
            .await;
    }

    #[tokio::test]
    async fn test_connections_ordered() {
        let presence = PresenceRegistry::new();
        let (t1, _r1) = channel();
        let (t2, _r2) = channel();
        presence.register(7, "dave", t1).await;
        presence.register(3, "dave", t2).await;

        let ids: Vec<_> = presence.connections_for("dave").await.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![3, 7]);
        assert_eq!(presence.primary_connection("dave").await.map(|(id, _)| id), Some(3));
        assert_eq!(presence.username_of(7).await.as_deref(), Some("dave"));
    }
}

//! Lobby Manager
//!
//! Named waiting rooms that turn into a match once full. A lobby moves
//! `open -> filling -> converted`: it leaves the public listing the moment it
//! fills, and after a short grace delay its members are seated in a new room
//! and the lobby is discarded.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ArenaError, ArenaResult, ConflictReason};
use crate::game::settings::MatchSettings;
use crate::network::presence::{ClientSender, PresenceRegistry};
use crate::network::protocol::{ConnectionId, LobbyId, LobbySummary, ServerMessage};
use crate::room::{RoomRegistry, RoomSpec, SlotOccupant};

/// Players per lobby.
pub const LOBBY_CAPACITY: usize = 2;

/// Lobby lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyStatus {
    /// Listed and accepting members.
    Open,
    /// Full; a room is about to start.
    Filling,
    /// A room was created from it.
    Converted,
}

/// Creation parameters, already validated and defaulted.
#[derive(Debug, Clone)]
pub struct LobbyOptions {
    /// Display name.
    pub name: String,
    /// Requested capacity.
    pub capacity: usize,
    /// Optional join password.
    pub password: Option<String>,
    /// Points needed to win.
    pub target_score: u32,
    /// Match settings.
    pub settings: MatchSettings,
}

#[derive(Debug, Clone)]
struct LobbyMember {
    username: String,
    connection: ConnectionId,
    sender: ClientSender,
}

#[derive(Debug)]
struct Lobby {
    id: LobbyId,
    name: String,
    owner: String,
    password: Option<String>,
    capacity: usize,
    members: Vec<LobbyMember>,
    status: LobbyStatus,
    /// Bumped on every fill so a stale grace timer is ignored.
    fills: u64,
    target_score: u32,
    settings: MatchSettings,
}

impl Lobby {
    fn is_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m.username == username)
    }

    fn summary(&self) -> LobbySummary {
        LobbySummary {
            lobby_id: self.id,
            name: self.name.clone(),
            owner: self.owner.clone(),
            members: self.members.iter().map(|m| m.username.clone()).collect(),
            capacity: self.capacity,
            has_password: self.password.is_some(),
            settings: self.settings,
        }
    }

    fn send_state(&self) {
        let state = ServerMessage::LobbyState(self.summary());
        for member in &self.members {
            let _ = member.sender.try_send(state.clone());
        }
    }
}

/// Lobby registry.
pub struct LobbyManager {
    lobbies: RwLock<HashMap<LobbyId, Lobby>>,
    rooms: Arc<RoomRegistry>,
}

impl LobbyManager {
    /// Create an empty manager.
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self {
            lobbies: RwLock::new(HashMap::new()),
            rooms,
        }
    }

    fn presence(&self) -> &PresenceRegistry {
        &self.rooms.services().presence
    }

    /// Open a lobby with the owner as first member.
    pub async fn create(
        &self,
        owner: &str,
        connection: ConnectionId,
        sender: ClientSender,
        options: LobbyOptions,
    ) -> ArenaResult<LobbySummary> {
        if options.capacity != LOBBY_CAPACITY {
            return Err(ArenaError::InvalidInput(format!(
                "lobby capacity must be {}",
                LOBBY_CAPACITY
            )));
        }
        if options.name.trim().is_empty() {
            return Err(ArenaError::InvalidInput("lobby name is empty".into()));
        }

        let lobby = Lobby {
            id: Uuid::new_v4(),
            name: options.name.trim().to_string(),
            owner: owner.to_string(),
            password: options.password.filter(|p| !p.is_empty()),
            capacity: options.capacity,
            members: vec![LobbyMember {
                username: owner.to_string(),
                connection,
                sender,
            }],
            status: LobbyStatus::Open,
            fills: 0,
            target_score: options.target_score,
            settings: options.settings,
        };
        let summary = lobby.summary();
        info!(lobby_id = %lobby.id, owner, name = %lobby.name, "Lobby created");
        lobby.send_state();

        self.lobbies.write().await.insert(lobby.id, lobby);
        self.broadcast_list().await;
        Ok(summary)
    }

    /// Join an open lobby. Filling it schedules the room.
    pub async fn join(
        self: &Arc<Self>,
        lobby_id: LobbyId,
        username: &str,
        connection: ConnectionId,
        sender: ClientSender,
        password: Option<&str>,
    ) -> ArenaResult<LobbySummary> {
        let (summary, filled, fill) = {
            let mut lobbies = self.lobbies.write().await;
            let lobby = lobbies
                .get_mut(&lobby_id)
                .ok_or_else(|| ArenaError::not_found("lobby"))?;

            if lobby.is_member(username) {
                return Err(ArenaError::Conflict(ConflictReason::AlreadyMember));
            }
            if lobby.status != LobbyStatus::Open || lobby.members.len() >= lobby.capacity {
                return Err(ArenaError::Conflict(ConflictReason::Full));
            }
            if let Some(expected) = &lobby.password {
                if password != Some(expected.as_str()) {
                    return Err(ArenaError::Conflict(ConflictReason::WrongPassword));
                }
            }

            lobby.members.push(LobbyMember {
                username: username.to_string(),
                connection,
                sender,
            });
            let filled = lobby.members.len() == lobby.capacity;
            if filled {
                // Leaves the listing in the same critical section
                lobby.status = LobbyStatus::Filling;
                lobby.fills += 1;
            }
            lobby.send_state();
            (lobby.summary(), filled, lobby.fills)
        };

        info!(lobby_id = %lobby_id, username, filled, "Lobby joined");
        self.broadcast_list().await;

        if filled {
            let manager = self.clone();
            let grace = self.rooms.services().config.lobby_grace;
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                manager.convert(lobby_id, fill).await;
            });
        }
        Ok(summary)
    }

    /// Leave a lobby; an empty lobby is deleted.
    pub async fn leave(&self, lobby_id: LobbyId, username: &str) -> ArenaResult<()> {
        {
            let mut lobbies = self.lobbies.write().await;
            let lobby = lobbies
                .get_mut(&lobby_id)
                .ok_or_else(|| ArenaError::not_found("lobby"))?;
            if !lobby.is_member(username) {
                return Err(ArenaError::not_found("lobby member"));
            }

            lobby.members.retain(|m| m.username != username);
            if lobby.members.is_empty() {
                lobbies.remove(&lobby_id);
                info!(lobby_id = %lobby_id, "Lobby deleted");
            } else {
                // A departure during the grace delay reopens the lobby
                lobby.status = LobbyStatus::Open;
                if lobby.owner == username {
                    lobby.owner = lobby.members[0].username.clone();
                }
                lobby.send_state();
                debug!(lobby_id = %lobby_id, username, "Lobby left");
            }
        }
        self.broadcast_list().await;
        Ok(())
    }

    /// Remove a user from every lobby they are in.
    pub async fn leave_all(&self, username: &str) {
        let ids: Vec<LobbyId> = self
            .lobbies
            .read()
            .await
            .values()
            .filter(|lobby| lobby.is_member(username))
            .map(|lobby| lobby.id)
            .collect();
        for id in ids {
            let _ = self.leave(id, username).await;
        }
    }

    /// Open lobbies, sorted by name.
    pub async fn list(&self) -> Vec<LobbySummary> {
        let lobbies = self.lobbies.read().await;
        let mut open: Vec<_> = lobbies
            .values()
            .filter(|lobby| lobby.status == LobbyStatus::Open)
            .map(Lobby::summary)
            .collect();
        open.sort_by(|a, b| a.name.cmp(&b.name));
        open
    }

    /// Status of a lobby, if it still exists.
    pub async fn status(&self, lobby_id: &LobbyId) -> Option<LobbyStatus> {
        self.lobbies.read().await.get(lobby_id).map(|lobby| lobby.status)
    }

    async fn convert(&self, lobby_id: LobbyId, fill: u64) {
        let lobby = {
            let mut lobbies = self.lobbies.write().await;
            match lobbies.get(&lobby_id) {
                Some(lobby)
                    if lobby.status == LobbyStatus::Filling
                        && lobby.fills == fill
                        && lobby.members.len() == LOBBY_CAPACITY => {}
                _ => return,
            }
            match lobbies.remove(&lobby_id) {
                Some(mut lobby) => {
                    lobby.status = LobbyStatus::Converted;
                    lobby
                }
                None => return,
            }
        };

        let [first, second] = [&lobby.members[0], &lobby.members[1]];
        let slots = [
            SlotOccupant::human(&first.username, first.connection, first.sender.clone()),
            SlotOccupant::human(&second.username, second.connection, second.sender.clone()),
        ];
        let spec = RoomSpec::new(slots, lobby.settings, lobby.target_score);

        match self.rooms.spawn(spec).await {
            Ok(handle) => {
                info!(lobby_id = %lobby_id, room_id = %handle.room_id, "Lobby converted");
            }
            Err(e) => {
                warn!(lobby_id = %lobby_id, error = %e, "Lobby conversion failed");
                for member in &lobby.members {
                    let _ = member.sender.try_send(e.to_message());
                }
            }
        }
    }

    async fn broadcast_list(&self) {
        let lobbies = self.list().await;
        self.presence()
            .broadcast_all(ServerMessage::LobbyListUpdated { lobbies })
            .await;
    }
}

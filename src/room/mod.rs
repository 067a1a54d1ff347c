//! Match Rooms
//!
//! One room is one tokio task that owns a [`MatchState`] and every timer of
//! the match (countdown, tick, bot decisions, deadline). Other components
//! talk to it only through [`RoomCommand`]s on its channel. The
//! [`RoomRegistry`] indexes live rooms and which user sits in which room.
//!
//! [`MatchState`]: crate::game::state::MatchState

mod actor;

pub use actor::Room;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult, ConflictReason};
use crate::game::input::PaddleDirection;
use crate::game::settings::MatchSettings;
use crate::network::presence::{ClientSender, PresenceRegistry};
use crate::network::protocol::{ConnectionId, RoomId, TournamentId};
use crate::services::store::ResultStore;
use crate::tournament::TournamentSignal;

/// Command queue depth per room.
const COMMAND_BUFFER: usize = 256;

// =============================================================================
// ROOM SPEC
// =============================================================================

/// Who controls a paddle.
#[derive(Debug, Clone)]
pub enum SlotOccupant {
    /// A connected user.
    Human {
        /// Account name.
        username: String,
        /// Display name.
        alias: String,
        /// Bound connection.
        connection: ConnectionId,
        /// Outbound channel of that connection.
        sender: ClientSender,
    },
    /// A bot controller.
    Bot {
        /// Display name.
        alias: String,
    },
}

impl SlotOccupant {
    /// A human using their username as display name.
    pub fn human(username: &str, connection: ConnectionId, sender: ClientSender) -> Self {
        SlotOccupant::Human {
            username: username.to_string(),
            alias: username.to_string(),
            connection,
            sender,
        }
    }

    /// Display name.
    pub fn alias(&self) -> &str {
        match self {
            SlotOccupant::Human { alias, .. } | SlotOccupant::Bot { alias } => alias,
        }
    }

    /// Username, for humans.
    pub fn username(&self) -> Option<&str> {
        match self {
            SlotOccupant::Human { username, .. } => Some(username),
            SlotOccupant::Bot { .. } => None,
        }
    }

    /// Is this a bot slot?
    pub fn is_bot(&self) -> bool {
        matches!(self, SlotOccupant::Bot { .. })
    }
}

/// Bracket match a room plays.
#[derive(Debug, Clone)]
pub struct TournamentLink {
    /// Owning tournament.
    pub tournament_id: TournamentId,
    /// Round index.
    pub round: usize,
    /// Match index in the round.
    pub index: usize,
    /// Where to report the result.
    pub reporter: mpsc::UnboundedSender<TournamentSignal>,
}

/// Everything needed to start a room.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    /// Room identifier.
    pub room_id: RoomId,
    /// Left and right occupants.
    pub slots: [SlotOccupant; 2],
    /// Validated settings.
    pub settings: MatchSettings,
    /// Points needed to win.
    pub target_score: u32,
    /// Force-resolve by score after this long in play.
    pub deadline: Option<Duration>,
    /// Bracket linkage.
    pub tournament: Option<TournamentLink>,
}

impl RoomSpec {
    /// A room with a fresh id and no deadline or bracket link.
    pub fn new(slots: [SlotOccupant; 2], settings: MatchSettings, target_score: u32) -> Self {
        Self {
            room_id: Uuid::new_v4(),
            slots,
            settings,
            target_score,
            deadline: None,
            tournament: None,
        }
    }
}

// =============================================================================
// COMMANDS & HANDLES
// =============================================================================

/// Messages a room task accepts.
#[derive(Debug)]
pub enum RoomCommand {
    /// Paddle direction from a connection.
    Move { connection: ConnectionId, direction: PaddleDirection },
    /// Paddle dash from a connection.
    Dash { connection: ConnectionId },
    /// Move a user's slot to another connection.
    Rebind {
        username: String,
        connection: ConnectionId,
        sender: ClientSender,
        reply: oneshot::Sender<ArenaResult<()>>,
    },
    /// Add a spectator.
    Spectate { connection: ConnectionId, sender: ClientSender },
    /// A connection went away.
    Detach { connection: ConnectionId },
    /// A player gives up; the opponent wins.
    Forfeit { username: String },
    /// Stop without a result.
    Stop { reason: String },
}

/// Cloneable reference to a live room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    /// Room identifier.
    pub room_id: RoomId,
    /// Display names in slot order.
    pub aliases: [String; 2],
    /// Seated usernames (bots excluded).
    pub humans: Vec<String>,
    /// Owning tournament, if any.
    pub tournament: Option<TournamentId>,
    commands: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Queue a command. Fails if the room is gone.
    pub async fn send(&self, command: RoomCommand) -> ArenaResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ArenaError::not_found("room"))
    }

    /// Queue a command without waiting. Used from contexts that must not
    /// block on a busy room.
    pub fn try_send(&self, command: RoomCommand) -> bool {
        self.commands.try_send(command).is_ok()
    }

    /// Rebind and wait for the room's answer.
    pub async fn rebind(&self, username: &str, connection: ConnectionId, sender: ClientSender) -> ArenaResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(RoomCommand::Rebind {
            username: username.to_string(),
            connection,
            sender,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ArenaError::not_found("room"))?
    }

    /// Is the room task still running?
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Collaborators a room needs while running and finalizing.
#[derive(Clone)]
pub struct RoomServices {
    /// Notification delivery.
    pub presence: Arc<PresenceRegistry>,
    /// Result persistence.
    pub store: Arc<dyn ResultStore>,
    /// Timing configuration.
    pub config: Arc<ArenaConfig>,
}

#[derive(Default)]
struct RoomsInner {
    rooms: HashMap<RoomId, RoomHandle>,
    seats: HashMap<String, RoomId>,
}

/// Index of active rooms.
pub struct RoomRegistry {
    inner: RwLock<RoomsInner>,
    services: RoomServices,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new(services: RoomServices) -> Self {
        Self {
            inner: RwLock::new(RoomsInner::default()),
            services,
        }
    }

    /// Collaborators shared by all rooms.
    pub fn services(&self) -> &RoomServices {
        &self.services
    }

    /// Register and start a room.
    ///
    /// Fails with `Conflict(AlreadyPlaying)` if one of its humans already
    /// sits in another room.
    pub async fn spawn(self: &Arc<Self>, spec: RoomSpec) -> ArenaResult<RoomHandle> {
        let room = Room::new(spec, self.clone());
        self.start(room).await
    }

    /// Register and start a prepared room.
    pub(crate) async fn start(self: &Arc<Self>, room: Room) -> ArenaResult<RoomHandle> {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = RoomHandle {
            room_id: room.id(),
            aliases: room.aliases(),
            humans: room.humans(),
            tournament: room.tournament_id(),
            commands: tx,
        };

        {
            let mut inner = self.inner.write().await;
            if handle.humans.iter().any(|name| inner.seats.contains_key(name)) {
                return Err(ArenaError::Conflict(ConflictReason::AlreadyPlaying));
            }
            for name in &handle.humans {
                inner.seats.insert(name.clone(), handle.room_id);
            }
            inner.rooms.insert(handle.room_id, handle.clone());
        }

        info!(
            room_id = %handle.room_id,
            left = %handle.aliases[0],
            right = %handle.aliases[1],
            "Room spawned"
        );
        tokio::spawn(room.run(rx));
        Ok(handle)
    }

    /// Look up a room.
    pub async fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.inner.read().await.rooms.get(room_id).cloned()
    }

    /// Room a user is seated in.
    pub async fn room_for_player(&self, username: &str) -> Option<RoomHandle> {
        let inner = self.inner.read().await;
        let room_id = inner.seats.get(username)?;
        inner.rooms.get(room_id).cloned()
    }

    /// Is the user seated in an active room?
    pub async fn is_seated(&self, username: &str) -> bool {
        self.inner.read().await.seats.contains_key(username)
    }

    /// Remove a room and its seats. Called by the room task as its last act.
    pub async fn remove(&self, room_id: &RoomId) -> Option<RoomHandle> {
        let mut inner = self.inner.write().await;
        let handle = inner.rooms.remove(room_id)?;
        for name in &handle.humans {
            if inner.seats.get(name) == Some(room_id) {
                inner.seats.remove(name);
            }
        }
        Some(handle)
    }

    /// Number of active rooms.
    pub async fn count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    /// Every active room.
    pub async fn all(&self) -> Vec<RoomHandle> {
        self.inner.read().await.rooms.values().cloned().collect()
    }
}

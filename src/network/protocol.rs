//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket. Every frame
//! is a JSON text message tagged by `type` with a camelCase event name.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::core::vec2::Vec2;
use crate::game::input::PaddleDirection;
use crate::game::settings::{MatchSettings, SettingsInput};
use crate::game::state::{MatchStatus, Score, Side};

/// Server-assigned connection identifier.
pub type ConnectionId = u64;
/// Match room identifier.
pub type RoomId = Uuid;
/// Lobby identifier.
pub type LobbyId = Uuid;
/// Challenge identifier.
pub type ChallengeId = Uuid;
/// Tournament identifier.
pub type TournamentId = Uuid;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a user.
    Identify { token: String },

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Open a new lobby; the creator joins it.
    CreateLobby {
        name: String,
        #[serde(default = "default_lobby_capacity")]
        capacity: usize,
        #[serde(default)]
        password: Option<String>,
        #[serde(default)]
        target_score: Option<u32>,
        #[serde(default)]
        settings: SettingsInput,
    },

    /// Join an open lobby.
    JoinLobby {
        lobby_id: LobbyId,
        #[serde(default)]
        password: Option<String>,
    },

    /// Leave a lobby.
    LeaveLobby { lobby_id: LobbyId },

    /// Ask for the open lobby list.
    RequestLobbyList,

    /// Invite another user to a match.
    ProposeChallenge {
        to: String,
        #[serde(default)]
        target_score: Option<u32>,
        #[serde(default)]
        duration_secs: Option<u64>,
        #[serde(default)]
        settings: SettingsInput,
    },

    /// Accept or decline an incoming challenge.
    RespondChallenge { challenge_id: ChallengeId, accept: bool },

    /// Withdraw a challenge this user proposed.
    CancelChallenge { challenge_id: ChallengeId },

    /// Move this user's slot in a room to this connection.
    RebindMatchConnection { room_id: RoomId },

    /// Paddle direction.
    MovePaddle { room_id: RoomId, direction: PaddleDirection },

    /// Paddle dash.
    DashPaddle { room_id: RoomId },

    /// Create a tournament; the creator is enrolled as host.
    CreateTournament {
        name: String,
        size: usize,
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        target_score: Option<u32>,
        #[serde(default)]
        duration_secs: Option<u64>,
        #[serde(default)]
        settings: SettingsInput,
    },

    /// Enroll in a tournament.
    JoinTournament {
        tournament_id: TournamentId,
        #[serde(default)]
        alias: Option<String>,
    },

    /// Withdraw from a tournament.
    LeaveTournament { tournament_id: TournamentId },

    /// Fill empty slots with bots and start (host only).
    ForceFillTournament { tournament_id: TournamentId },

    /// Start with the current roster (host only).
    StartTournament { tournament_id: TournamentId },

    /// Watch a room.
    SpectateMatch { room_id: RoomId },
}

fn default_lobby_capacity() -> usize {
    2
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Identify succeeded.
    Identified { username: String, server_version: String },

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown { reason: String },

    /// A user came online.
    UserConnected { username: String },

    /// A user went offline.
    UserDisconnected { username: String },

    /// Generic human-readable notification.
    Notification { kind: String, message: String },

    /// Open lobbies.
    LobbyListUpdated { lobbies: Vec<LobbySummary> },

    /// Membership of a lobby this user is in.
    LobbyState(LobbySummary),

    /// Join refused.
    LobbyJoinRejected { lobby_id: LobbyId, code: ErrorCode, reason: String },

    /// Challenge created and delivered.
    ChallengeSent { challenge_id: ChallengeId, to: String },

    /// Someone challenged this user.
    ChallengeIncoming {
        challenge_id: ChallengeId,
        from: String,
        target_score: u32,
        duration_secs: Option<u64>,
        settings: MatchSettings,
    },

    /// Challenge accepted; a room was created.
    ChallengeAccepted { challenge_id: ChallengeId, room_id: RoomId },

    /// Challenge declined.
    ChallengeDeclined { challenge_id: ChallengeId, by: String },

    /// Challenge withdrawn, or dropped because a player was offline.
    ChallengeCanceled { challenge_id: ChallengeId, reason: String },

    /// Switch to the match view.
    MatchAssigned(MatchAssignment),

    /// Countdown tick before play.
    MatchCountdown { room_id: RoomId, value: u32 },

    /// Full room state.
    MatchStateSnapshot(MatchSnapshot),

    /// Final result.
    MatchEnded(MatchEndInfo),

    /// Room stopped without a result.
    MatchAborted { room_id: RoomId, reason: String },

    /// Personal stats changed; refetch.
    PlayerStatsInvalidated { username: String },

    /// Tournament roster, bracket or status changed.
    TournamentStateUpdated(TournamentView),

    /// A round finished; the next starts after the cooldown.
    TournamentRoundComplete {
        tournament_id: TournamentId,
        round: usize,
        next_round_in_ms: u64,
    },

    /// This user's bracket match is starting.
    TournamentMatchStarting {
        tournament_id: TournamentId,
        round: usize,
        match_index: usize,
        room_id: RoomId,
        side: Side,
        opponent: String,
    },

    /// Tournament over.
    TournamentFinished { tournament_id: TournamentId, ranking: Vec<Standing> },
}

/// Public lobby information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    /// Lobby identifier.
    pub lobby_id: LobbyId,
    /// Display name.
    pub name: String,
    /// Owner username.
    pub owner: String,
    /// Members in join order.
    pub members: Vec<String>,
    /// Capacity.
    pub capacity: usize,
    /// Whether a password is required.
    pub has_password: bool,
    /// Settings the room will use.
    pub settings: MatchSettings,
}

/// Room assignment for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAssignment {
    /// Room to render.
    pub room_id: RoomId,
    /// This player's paddle.
    pub side: Side,
    /// Opponent display name.
    pub opponent: String,
    /// Points to win.
    pub target_score: u32,
    /// Room settings.
    pub settings: MatchSettings,
}

/// One paddle in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleView {
    /// Slot.
    pub side: Side,
    /// Occupant display name.
    pub player: String,
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Dash in progress.
    pub dashing: bool,
}

/// Full room state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    /// Room identifier.
    pub room_id: RoomId,
    /// Simulation tick.
    pub tick: u64,
    /// Lifecycle status.
    pub status: MatchStatus,
    /// Ball center.
    pub ball: Vec2,
    /// Ball velocity.
    pub ball_velocity: Vec2,
    /// Ball radius.
    pub ball_radius: f32,
    /// Paddles in slot order.
    pub paddles: Vec<PaddleView>,
    /// Current score.
    pub score: Score,
    /// Points to win.
    pub target_score: u32,
    /// Room settings.
    pub settings: MatchSettings,
}

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// Target score reached.
    Score,
    /// Duration or watchdog deadline hit.
    Timeout,
    /// A player left or went offline.
    Forfeit,
}

/// Final result of a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchEndInfo {
    /// Room identifier.
    pub room_id: RoomId,
    /// Winner display name.
    pub winner: String,
    /// Loser display name.
    pub loser: String,
    /// Final score.
    pub final_score: Score,
    /// Display names in slot order.
    pub players: [String; 2],
    /// Why it ended.
    pub reason: EndReason,
}

/// A bracket slot on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SlotView {
    /// Not populated yet.
    Empty,
    /// No opponent.
    Bye,
    /// A participant.
    Player { alias: String, bot: bool },
}

/// A bracket match on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketMatchView {
    /// Stable match id.
    pub id: String,
    /// Round index.
    pub round: usize,
    /// Index within the round.
    pub index: usize,
    /// First slot.
    pub p1: SlotView,
    /// Second slot.
    pub p2: SlotView,
    /// "pending", "playing" or "done".
    pub status: String,
    /// Winner alias.
    pub winner: Option<String>,
    /// Linked room once launched.
    pub room_id: Option<RoomId>,
}

/// A roster entry on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    /// Display alias.
    pub alias: String,
    /// Username, absent for bots.
    pub username: Option<String>,
    /// Knocked out.
    pub eliminated: bool,
}

/// Tournament state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    /// Tournament identifier.
    pub tournament_id: TournamentId,
    /// Display name.
    pub name: String,
    /// Host username.
    pub host: String,
    /// Bracket size.
    pub size: usize,
    /// "waiting", "running" or "completed".
    pub status: String,
    /// Current round index.
    pub current_round: usize,
    /// Roster.
    pub participants: Vec<ParticipantView>,
    /// Rounds, empty until started.
    pub rounds: Vec<Vec<BracketMatchView>>,
    /// Ranking once completed.
    pub ranking: Option<Vec<Standing>>,
}

/// One line of the final ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// 1-based placement; ties share a value.
    pub place: u32,
    /// Display alias.
    pub alias: String,
    /// Username, absent for bots.
    pub username: Option<String>,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Entity does not exist.
    NotFound,
    /// Caller lacks permission.
    Unauthorized,
    /// Conflicts with current state.
    Conflict,
    /// A required player has no live connection.
    PlayerOffline,
    /// Token names no account; the connection is closed.
    AccountMissing,
    /// Not identified yet.
    NotAuthenticated,
    /// Malformed request.
    InvalidInput,
    /// Connection limit reached; the connection is closed.
    ServerOverloaded,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Event name, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Identify { .. } => "identify",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::CreateLobby { .. } => "createLobby",
            ClientMessage::JoinLobby { .. } => "joinLobby",
            ClientMessage::LeaveLobby { .. } => "leaveLobby",
            ClientMessage::RequestLobbyList => "requestLobbyList",
            ClientMessage::ProposeChallenge { .. } => "proposeChallenge",
            ClientMessage::RespondChallenge { .. } => "respondChallenge",
            ClientMessage::CancelChallenge { .. } => "cancelChallenge",
            ClientMessage::RebindMatchConnection { .. } => "rebindMatchConnection",
            ClientMessage::MovePaddle { .. } => "movePaddle",
            ClientMessage::DashPaddle { .. } => "dashPaddle",
            ClientMessage::CreateTournament { .. } => "createTournament",
            ClientMessage::JoinTournament { .. } => "joinTournament",
            ClientMessage::LeaveTournament { .. } => "leaveTournament",
            ClientMessage::ForceFillTournament { .. } => "forceFillTournament",
            ClientMessage::StartTournament { .. } => "startTournament",
            ClientMessage::SpectateMatch { .. } => "spectateMatch",
        }
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_names_are_camel_case() {
        let msg = ClientMessage::from_json(
            r#"{"type":"movePaddle","roomId":"67e55044-10b1-426f-9247-bb680e5fe0c8","direction":"up"}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::MovePaddle { direction, .. } => assert_eq!(direction, PaddleDirection::Up),
            other => panic!("Wrong message type: {:?}", other),
        }

        let msg = ClientMessage::from_json(r#"{"type":"requestLobbyList"}"#).unwrap();
        assert_eq!(msg.kind(), "requestLobbyList");
    }

    #[test]
    fn test_create_lobby_defaults() {
        let msg = ClientMessage::from_json(r#"{"type":"createLobby","name":"friday"}"#).unwrap();
        match msg {
            ClientMessage::CreateLobby { capacity, password, settings, .. } => {
                assert_eq!(capacity, 2);
                assert!(password.is_none());
                assert!(settings.ball_speed.is_none());
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_propose_challenge_with_settings() {
        let msg = ClientMessage::from_json(
            r#"{"type":"proposeChallenge","to":"bob","targetScore":3,"settings":{"accelBall":false}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::ProposeChallenge { to, target_score, settings, .. } => {
                assert_eq!(to, "bob");
                assert_eq!(target_score, Some(3));
                assert_eq!(settings.accelerate_on_hit, Some(false));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let json = ServerMessage::MatchCountdown { room_id: Uuid::nil(), value: 3 }
            .to_json()
            .unwrap();
        assert!(json.contains(r#""type":"matchCountdown""#));
        assert!(json.contains(r#""roomId""#));

        let json = ServerMessage::PlayerStatsInvalidated { username: "ada".into() }
            .to_json()
            .unwrap();
        assert!(json.contains(r#""type":"playerStatsInvalidated""#));
    }

    #[test]
    fn test_match_ended_roundtrip() {
        let msg = ServerMessage::MatchEnded(MatchEndInfo {
            room_id: Uuid::nil(),
            winner: "ada".into(),
            loser: "bob".into(),
            final_score: Score { left: 3, right: 1 },
            players: ["Ada L.".into(), "bob".into()],
            reason: EndReason::Score,
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""finalScore":{"left":3,"right":1}"#));
        assert!(!json.contains(r#""score""#));
        let parsed = ServerMessage::from_json(&json).unwrap();
        match parsed {
            ServerMessage::MatchEnded(info) => {
                assert_eq!(info.final_score.total(), 4);
                assert_eq!(info.players[0], "Ada L.");
                assert_eq!(info.reason, EndReason::Score);
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_error_codes() {
        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::PlayerOffline,
            message: "bob is offline".to_string(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("player_offline"));
    }
}

//! Arena
//!
//! Routes inbound client events to the presence registry, lobbies,
//! challenges, rooms and tournaments, and reacts to connections closing.
//! The WebSocket layer owns the sockets; everything it reads ends up in
//! [`Arena::dispatch`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::challenge::{ChallengeBroker, ChallengeOptions};
use crate::config::ArenaConfig;
use crate::error::{ArenaError, ArenaResult};
use crate::game::settings::MatchSettings;
use crate::lobby::{LobbyManager, LobbyOptions};
use crate::network::auth::IdentityService;
use crate::network::presence::{ClientSender, PresenceRegistry, PresenceStatus};
use crate::network::protocol::{ClientMessage, ConnectionId, RoomId, ServerMessage};
use crate::room::{RoomCommand, RoomHandle, RoomRegistry, RoomServices};
use crate::services::store::ResultStore;
use crate::tournament::{TournamentManager, TournamentOptions};

/// Every registry of the server, wired together.
pub struct Arena {
    identity: Arc<dyn IdentityService>,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRegistry>,
    lobbies: Arc<LobbyManager>,
    challenges: ChallengeBroker,
    tournaments: Arc<TournamentManager>,
    config: Arc<ArenaConfig>,
    version: String,
}

impl Arena {
    /// Build the arena. Must be called inside a tokio runtime.
    pub fn new(identity: Arc<dyn IdentityService>, store: Arc<dyn ResultStore>, config: ArenaConfig) -> Self {
        let config = Arc::new(config);
        let presence = Arc::new(PresenceRegistry::new());
        let rooms = Arc::new(RoomRegistry::new(RoomServices {
            presence: presence.clone(),
            store,
            config: config.clone(),
        }));

        Self {
            identity,
            presence,
            lobbies: Arc::new(LobbyManager::new(rooms.clone())),
            challenges: ChallengeBroker::new(rooms.clone()),
            tournaments: TournamentManager::new(rooms.clone()),
            rooms,
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Connection/user index.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Active rooms.
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Tournaments.
    pub fn tournaments(&self) -> &Arc<TournamentManager> {
        &self.tournaments
    }

    /// Presence status including seating.
    pub async fn status_of(&self, username: &str) -> PresenceStatus {
        let seated = self.rooms.is_seated(username).await;
        self.presence.status_of(username, seated).await
    }

    /// Handle one inbound event from `connection`.
    ///
    /// Errors belong to the requesting connection; the caller reports them
    /// and closes the connection when the error is fatal.
    pub async fn dispatch(&self, connection: ConnectionId, sender: &ClientSender, message: ClientMessage) -> ArenaResult<()> {
        debug!(connection, kind = message.kind(), "Inbound event");

        let message = match message {
            ClientMessage::Identify { token } => return self.identify(connection, sender, &token).await,
            ClientMessage::Ping { timestamp } => {
                let _ = sender.try_send(ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis().max(0) as u64,
                });
                return Ok(());
            }
            other => other,
        };

        let username = self
            .presence
            .username_of(connection)
            .await
            .ok_or(ArenaError::NotAuthenticated)?;
        let user = username.as_str();

        match message {
            ClientMessage::Identify { .. } | ClientMessage::Ping { .. } => Ok(()),

            // === Lobbies ===
            ClientMessage::CreateLobby { name, capacity, password, target_score, settings } => {
                let options = LobbyOptions {
                    name,
                    capacity,
                    password,
                    target_score: self.config.target_score(target_score),
                    settings: MatchSettings::from_input(&settings),
                };
                self.lobbies.create(user, connection, sender.clone(), options).await?;
                Ok(())
            }
            ClientMessage::JoinLobby { lobby_id, password } => {
                let joined = self
                    .lobbies
                    .join(lobby_id, user, connection, sender.clone(), password.as_deref())
                    .await;
                if let Err(e) = joined {
                    debug!(lobby_id = %lobby_id, username = user, error = %e, "Lobby join rejected");
                    let _ = sender.try_send(ServerMessage::LobbyJoinRejected {
                        lobby_id,
                        code: e.code(),
                        reason: e.to_string(),
                    });
                }
                Ok(())
            }
            ClientMessage::LeaveLobby { lobby_id } => self.lobbies.leave(lobby_id, user).await,
            ClientMessage::RequestLobbyList => {
                let lobbies = self.lobbies.list().await;
                let _ = sender.try_send(ServerMessage::LobbyListUpdated { lobbies });
                Ok(())
            }

            // === Challenges ===
            ClientMessage::ProposeChallenge { to, target_score, duration_secs, settings } => {
                let options = ChallengeOptions {
                    target_score: self.config.target_score(target_score),
                    duration: duration(duration_secs),
                    settings: MatchSettings::from_input(&settings),
                };
                self.challenges.propose(user, &to, options).await?;
                Ok(())
            }
            ClientMessage::RespondChallenge { challenge_id, accept } => {
                self.challenges.respond(challenge_id, user, accept).await?;
                Ok(())
            }
            ClientMessage::CancelChallenge { challenge_id } => self.challenges.cancel(challenge_id, user).await,

            // === Rooms ===
            ClientMessage::RebindMatchConnection { room_id } => {
                self.room(&room_id).await?.rebind(user, connection, sender.clone()).await
            }
            ClientMessage::MovePaddle { room_id, direction } => {
                let room = self.room(&room_id).await?;
                if !room.try_send(RoomCommand::Move { connection, direction }) {
                    debug!(room_id = %room_id, connection, "Move dropped");
                }
                Ok(())
            }
            ClientMessage::DashPaddle { room_id } => {
                let room = self.room(&room_id).await?;
                if !room.try_send(RoomCommand::Dash { connection }) {
                    debug!(room_id = %room_id, connection, "Dash dropped");
                }
                Ok(())
            }
            ClientMessage::SpectateMatch { room_id } => {
                self.room(&room_id)
                    .await?
                    .send(RoomCommand::Spectate { connection, sender: sender.clone() })
                    .await
            }

            // === Tournaments ===
            ClientMessage::CreateTournament { name, size, alias, target_score, duration_secs, settings } => {
                let options = TournamentOptions {
                    name,
                    size,
                    alias,
                    target_score: self.config.target_score(target_score),
                    duration: duration(duration_secs),
                    settings: MatchSettings::from_input(&settings),
                };
                self.tournaments.create(user, options).await?;
                Ok(())
            }
            ClientMessage::JoinTournament { tournament_id, alias } => {
                self.tournaments.join(tournament_id, user, alias).await?;
                Ok(())
            }
            ClientMessage::LeaveTournament { tournament_id } => self.tournaments.leave(tournament_id, user).await,
            ClientMessage::ForceFillTournament { tournament_id } => {
                self.tournaments.force_fill(tournament_id, user).await
            }
            ClientMessage::StartTournament { tournament_id } => self.tournaments.start(tournament_id, user).await,
        }
    }

    async fn identify(&self, connection: ConnectionId, sender: &ClientSender, token: &str) -> ArenaResult<()> {
        let username = self.identity.resolve_user(token).map_err(|e| {
            info!(connection, error = %e, "Identify rejected");
            ArenaError::AccountMissing
        })?;
        if let Err(e) = self.rooms.services().store.find_user_id_by_username(&username).await {
            info!(connection, username = %username, error = %e, "Identify rejected, no account");
            return Err(ArenaError::AccountMissing);
        }

        self.presence.register(connection, &username, sender.clone()).await;
        let _ = sender.try_send(ServerMessage::Identified {
            username: username.clone(),
            server_version: self.version.clone(),
        });
        let _ = sender.try_send(ServerMessage::LobbyListUpdated {
            lobbies: self.lobbies.list().await,
        });
        for incoming in self.challenges.pending_for(&username).await {
            let _ = sender.try_send(incoming);
        }
        Ok(())
    }

    async fn room(&self, room_id: &RoomId) -> ArenaResult<RoomHandle> {
        self.rooms
            .get(room_id)
            .await
            .ok_or_else(|| ArenaError::not_found("room"))
    }

    /// A connection went away.
    ///
    /// Spectator bindings are dropped. Once the user has no connection left,
    /// they leave their lobbies, and their room is forfeited (tournament) or
    /// stopped without a result (anything else).
    pub async fn connection_closed(&self, connection: ConnectionId) {
        for room in self.rooms.all().await {
            room.try_send(RoomCommand::Detach { connection });
        }

        let Some((username, offline)) = self.presence.unregister(connection).await else {
            return;
        };
        if !offline {
            return;
        }

        self.lobbies.leave_all(&username).await;
        if let Some(room) = self.rooms.room_for_player(&username).await {
            let command = if room.tournament.is_some() {
                RoomCommand::Forfeit { username: username.clone() }
            } else {
                RoomCommand::Stop {
                    reason: format!("{} disconnected", username),
                }
            };
            if room.send(command).await.is_err() {
                debug!(room_id = %room.room_id, "Room already gone");
            }
        }
    }

    /// Stop every room and tell every client the server is going away.
    pub async fn shutdown(&self, reason: &str) {
        let rooms = self.rooms.all().await;
        warn!(rooms = rooms.len(), reason, "Arena shutting down");
        for room in rooms {
            let _ = room.try_send(RoomCommand::Stop { reason: reason.to_string() });
        }
        self.presence
            .broadcast_all(ServerMessage::Shutdown { reason: reason.to_string() })
            .await;
    }
}

fn duration(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vec2::Vec2;
    use crate::game::input::PaddleDirection;
    use crate::game::settings::SettingsInput;
    use crate::game::state::{MatchStatus, FIELD_HEIGHT, FIELD_WIDTH, PADDLE_HEIGHT, PADDLE_MARGIN, PADDLE_WIDTH};
    use crate::network::auth::InsecureIdentity;
    use crate::network::protocol::{ChallengeId, EndReason, ErrorCode, MatchEndInfo};
    use crate::services::store::MemoryResultStore;
    use tokio::sync::mpsc::{self, Receiver};

    fn arena(store: Arc<MemoryResultStore>) -> Arena {
        Arena::new(Arc::new(InsecureIdentity), store, ArenaConfig::default())
    }

    async fn connect(arena: &Arena, connection: ConnectionId, name: &str) -> (ClientSender, Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8192);
        arena
            .dispatch(connection, &tx, ClientMessage::Identify { token: name.into() })
            .await
            .unwrap();
        (tx, rx)
    }

    fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// ada (connection 1) challenges bob (connection 2), who accepts.
    async fn challenge_accepted(
        arena: &Arena,
        ada_tx: &ClientSender,
        bob_tx: &ClientSender,
        bob_rx: &mut Receiver<ServerMessage>,
        target_score: Option<u32>,
        settings: SettingsInput,
    ) -> ChallengeId {
        arena
            .dispatch(
                1,
                ada_tx,
                ClientMessage::ProposeChallenge {
                    to: "bob".into(),
                    target_score,
                    duration_secs: None,
                    settings,
                },
            )
            .await
            .unwrap();
        let challenge_id = drain(bob_rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::ChallengeIncoming { challenge_id, .. } => Some(challenge_id),
                _ => None,
            })
            .expect("challenge delivered");
        arena
            .dispatch(2, bob_tx, ClientMessage::RespondChallenge { challenge_id, accept: true })
            .await
            .unwrap();
        challenge_id
    }

    /// Where the ball will cross `x`, folding wall reflections.
    fn intercept_y(position: Vec2, velocity: Vec2, x: f32, radius: f32) -> f32 {
        if velocity.x == 0.0 {
            return position.y;
        }
        let t = (x - position.x) / velocity.x;
        let span = FIELD_HEIGHT - 2.0 * radius;
        let mut y = (position.y + velocity.y * t - radius).rem_euclid(2.0 * span);
        if y > span {
            y = 2.0 * span - y;
        }
        y + radius
    }

    #[tokio::test]
    async fn test_requires_identify() {
        let arena = arena(Arc::new(MemoryResultStore::with_users(["ada"])));
        let (tx, mut rx) = mpsc::channel(16);

        let err = arena
            .dispatch(1, &tx, ClientMessage::RequestLobbyList)
            .await
            .unwrap_err();
        assert_eq!(err, ArenaError::NotAuthenticated);

        // Ping works before identify
        arena.dispatch(1, &tx, ClientMessage::Ping { timestamp: 5 }).await.unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Pong { timestamp: 5, .. })));
    }

    #[tokio::test]
    async fn test_identify_unknown_account_is_fatal() {
        let arena = arena(Arc::new(MemoryResultStore::with_users(["ada"])));
        let (tx, _rx) = mpsc::channel(16);

        let err = arena
            .dispatch(1, &tx, ClientMessage::Identify { token: "mallory".into() })
            .await
            .unwrap_err();
        assert_eq!(err, ArenaError::AccountMissing);
        assert!(err.is_fatal());

        let err = arena
            .dispatch(1, &tx, ClientMessage::Identify { token: "   ".into() })
            .await
            .unwrap_err();
        assert_eq!(err, ArenaError::AccountMissing);
        assert_eq!(arena.presence().connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_identify_replies() {
        let arena = arena(Arc::new(MemoryResultStore::with_users(["ada"])));
        let (_tx, mut rx) = connect(&arena, 1, "ada").await;
        let seen = drain(&mut rx);
        assert!(matches!(&seen[0], ServerMessage::Identified { username, .. } if username == "ada"));
        assert!(matches!(&seen[1], ServerMessage::LobbyListUpdated { lobbies } if lobbies.is_empty()));
        assert_eq!(arena.status_of("ada").await, PresenceStatus::Online);
    }

    #[tokio::test]
    async fn test_join_rejection_is_reported_as_event() {
        let arena = arena(Arc::new(MemoryResultStore::with_users(["ada", "bob"])));
        let (ada_tx, _ada_rx) = connect(&arena, 1, "ada").await;
        let (bob_tx, mut bob_rx) = connect(&arena, 2, "bob").await;

        arena
            .dispatch(
                1,
                &ada_tx,
                ClientMessage::CreateLobby {
                    name: "secret".into(),
                    capacity: 2,
                    password: Some("pw".into()),
                    target_score: None,
                    settings: SettingsInput::default(),
                },
            )
            .await
            .unwrap();
        let lobby_id = drain(&mut bob_rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::LobbyListUpdated { lobbies } => lobbies.first().map(|l| l.lobby_id),
                _ => None,
            })
            .expect("lobby listed");

        arena
            .dispatch(2, &bob_tx, ClientMessage::JoinLobby { lobby_id, password: None })
            .await
            .unwrap();
        assert!(drain(&mut bob_rx).iter().any(|m| matches!(
            m,
            ServerMessage::LobbyJoinRejected { code: ErrorCode::Conflict, .. }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_casual_room_without_result() {
        let store = Arc::new(MemoryResultStore::with_users(["ada", "bob"]));
        let arena = arena(store.clone());
        let (ada_tx, mut ada_rx) = connect(&arena, 1, "ada").await;
        let (bob_tx, mut bob_rx) = connect(&arena, 2, "bob").await;

        challenge_accepted(&arena, &ada_tx, &bob_tx, &mut bob_rx, None, SettingsInput::default()).await;
        assert_eq!(arena.status_of("bob").await, PresenceStatus::Playing);

        drop(bob_tx);
        arena.connection_closed(2).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(arena.rooms().count().await, 0);
        assert!(drain(&mut ada_rx).iter().any(|m| matches!(m, ServerMessage::MatchAborted { .. })));
        assert!(store.results().await.is_empty());
        assert_eq!(arena.status_of("bob").await, PresenceStatus::Offline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connection_rebinds_slot() {
        let arena = arena(Arc::new(MemoryResultStore::with_users(["ada", "bob"])));
        let (ada_tx, _ada_rx) = connect(&arena, 1, "ada").await;
        let (bob_tx, mut bob_rx) = connect(&arena, 2, "bob").await;
        let (ada2_tx, mut ada2_rx) = connect(&arena, 3, "ada").await;

        challenge_accepted(&arena, &ada_tx, &bob_tx, &mut bob_rx, None, SettingsInput::default()).await;
        let room_id = arena.rooms().room_for_player("ada").await.unwrap().room_id;

        // The first connection drops; the user stays online and rebinds
        arena.connection_closed(1).await;
        assert_eq!(arena.rooms().count().await, 1);
        drain(&mut ada2_rx);
        arena
            .dispatch(3, &ada2_tx, ClientMessage::RebindMatchConnection { room_id })
            .await
            .unwrap();
        assert!(drain(&mut ada2_rx)
            .iter()
            .any(|m| matches!(m, ServerMessage::MatchStateSnapshot(s) if s.room_id == room_id)));

        // Unknown room
        let err = arena
            .dispatch(2, &bob_tx, ClientMessage::RebindMatchConnection { room_id: uuid::Uuid::new_v4() })
            .await
            .unwrap_err();
        assert!(matches!(err, ArenaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_identify_replays_pending_challenge() {
        let arena = arena(Arc::new(MemoryResultStore::with_users(["ada", "bob"])));
        let (ada_tx, _ada_rx) = connect(&arena, 1, "ada").await;
        arena
            .dispatch(
                1,
                &ada_tx,
                ClientMessage::ProposeChallenge {
                    to: "bob".into(),
                    target_score: Some(4),
                    duration_secs: None,
                    settings: SettingsInput::default(),
                },
            )
            .await
            .unwrap();

        // bob was offline when the challenge was made
        let (bob_tx, mut bob_rx) = connect(&arena, 2, "bob").await;
        let challenge_id = drain(&mut bob_rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::ChallengeIncoming { challenge_id, from, target_score: 4, .. } if from == "ada" => {
                    Some(challenge_id)
                }
                _ => None,
            })
            .expect("pending challenge replayed");

        arena
            .dispatch(2, &bob_tx, ClientMessage::RespondChallenge { challenge_id, accept: false })
            .await
            .unwrap();
        let (_bob2_tx, mut bob2_rx) = connect(&arena, 3, "bob").await;
        assert!(drain(&mut bob2_rx)
            .iter()
            .all(|m| !matches!(m, ServerMessage::ChallengeIncoming { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_forfeits_tournament_match() {
        let store = Arc::new(MemoryResultStore::with_users(["ada", "bob"]));
        let arena = arena(store.clone());
        let (ada_tx, mut ada_rx) = connect(&arena, 1, "ada").await;
        let (bob_tx, _bob_rx) = connect(&arena, 2, "bob").await;

        arena
            .dispatch(
                1,
                &ada_tx,
                ClientMessage::CreateTournament {
                    name: "Night Cup".into(),
                    size: 2,
                    alias: None,
                    target_score: Some(21),
                    duration_secs: None,
                    settings: SettingsInput::default(),
                },
            )
            .await
            .unwrap();
        let tournament_id = drain(&mut ada_rx)
            .into_iter()
            .find_map(|m| match m {
                ServerMessage::TournamentStateUpdated(view) => Some(view.tournament_id),
                _ => None,
            })
            .expect("tournament published");
        arena
            .dispatch(2, &bob_tx, ClientMessage::JoinTournament { tournament_id, alias: None })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(arena.status_of("bob").await, PresenceStatus::Playing);

        drop(bob_tx);
        arena.connection_closed(2).await;

        let mut ranking = None;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if let Some(view) = arena.tournaments().view(&tournament_id).await {
                if view.status == "completed" {
                    ranking = view.ranking;
                    break;
                }
            }
        }
        let ranking = ranking.expect("tournament completed");
        assert_eq!(ranking[0].username.as_deref(), Some("ada"));

        let ends: Vec<MatchEndInfo> = drain(&mut ada_rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::MatchEnded(info) => Some(info),
                _ => None,
            })
            .collect();
        assert_eq!(ends.len(), 1);
        assert_eq!(ends[0].winner, "ada");
        assert_eq!(ends[0].reason, EndReason::Forfeit);

        let rows = store.results().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].winner_id, store.find_user_id_by_username("ada").await.unwrap());
        assert_eq!(arena.rooms().count().await, 0);
    }

    /// Challenge to 3 points without acceleration. The left player tracks
    /// the ball; the right player keeps away from where the ball will
    /// arrive, so every point goes left.
    #[tokio::test(start_paused = true)]
    async fn test_challenge_scenario_to_three() {
        let store = Arc::new(MemoryResultStore::with_users(["ada", "bob"]));
        let arena = arena(store.clone());
        let (ada_tx, mut ada_rx) = connect(&arena, 1, "ada").await;
        let (bob_tx, mut bob_rx) = connect(&arena, 2, "bob").await;

        let no_accel = SettingsInput {
            accelerate_on_hit: Some(false),
            ..Default::default()
        };
        challenge_accepted(&arena, &ada_tx, &bob_tx, &mut bob_rx, Some(3), no_accel).await;

        let left_face = PADDLE_MARGIN + PADDLE_WIDTH;
        let right_face = FIELD_WIDTH - PADDLE_MARGIN - PADDLE_WIDTH;

        let mut ended: Vec<MatchEndInfo> = Vec::new();
        let mut bob_ended = 0;
        for _ in 0..200_000 {
            tokio::select! {
                Some(msg) = ada_rx.recv() => match msg {
                    ServerMessage::MatchAssigned(a) => {
                        assert_eq!(a.target_score, 3);
                        assert!(!a.settings.accelerate_on_hit);
                    }
                    ServerMessage::MatchStateSnapshot(s) if s.status == MatchStatus::Playing => {
                        let center = s.paddles[0].y + PADDLE_HEIGHT / 2.0;
                        let aim = if s.ball_velocity.x < 0.0 {
                            intercept_y(s.ball, s.ball_velocity, left_face, s.ball_radius)
                        } else {
                            FIELD_HEIGHT / 2.0
                        };
                        let direction = if aim < center - 5.0 {
                            PaddleDirection::Up
                        } else if aim > center + 5.0 {
                            PaddleDirection::Down
                        } else {
                            PaddleDirection::Stop
                        };
                        // The room may already be gone by the time a late snapshot is read
                        let _ = arena
                            .dispatch(1, &ada_tx, ClientMessage::MovePaddle { room_id: s.room_id, direction })
                            .await;
                    }
                    ServerMessage::MatchEnded(info) => ended.push(info),
                    _ => {}
                },
                Some(msg) = bob_rx.recv() => match msg {
                    ServerMessage::MatchStateSnapshot(s) if s.ball_velocity.x > 0.0 => {
                        let arrive = intercept_y(s.ball, s.ball_velocity, right_face, s.ball_radius);
                        let direction = if arrive < FIELD_HEIGHT / 2.0 {
                            PaddleDirection::Down
                        } else {
                            PaddleDirection::Up
                        };
                        // The room may already be gone by the time a late snapshot is read
                        let _ = arena
                            .dispatch(2, &bob_tx, ClientMessage::MovePaddle { room_id: s.room_id, direction })
                            .await;
                    }
                    ServerMessage::MatchEnded(_) => bob_ended += 1,
                    _ => {}
                },
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            if !ended.is_empty() && bob_ended > 0 && arena.rooms().count().await == 0 {
                break;
            }
        }

        assert_eq!(ended.len(), 1);
        let info = &ended[0];
        assert_eq!(info.final_score.left + info.final_score.right, 3);
        assert_eq!(info.winner, "ada");
        assert_eq!(info.reason, EndReason::Score);
        assert_eq!(bob_ended, 1);

        let rows = store.results().await;
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].winner_score, rows[0].loser_score), (3, 0));

        // Nothing further arrives once the room is gone
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(drain(&mut ada_rx)
            .iter()
            .all(|m| !matches!(m, ServerMessage::MatchStateSnapshot(_) | ServerMessage::MatchEnded(_))));
    }

    #[test]
    fn test_duration_zero_means_none() {
        assert_eq!(duration(None), None);
        assert_eq!(duration(Some(0)), None);
        assert_eq!(duration(Some(30)), Some(Duration::from_secs(30)));
    }
}

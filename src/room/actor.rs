//! Room Task
//!
//! The task that owns one match. A single `select!` loop drives the
//! countdown, the fixed-rate simulation tick, bot decisions and the optional
//! deadline, and applies commands between ticks. Timers are polled before
//! the command queue. All timers live in one
//! [`RoomTimers`] value that is dropped as a unit when the loop exits, so no
//! timer can touch the match after teardown.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

use crate::core::rng::MatchRng;
use crate::error::ArenaError;
use crate::game::bot::BotPolicy;
use crate::game::events::GameEvent;
use crate::game::input::{apply_move, start_dash};
use crate::game::state::{MatchState, MatchStatus, Side};
use crate::game::tick::{resolve_by_score, serve, tick};
use crate::network::presence::ClientSender;
use crate::network::protocol::{
    ConnectionId, EndReason, MatchAssignment, MatchEndInfo, MatchSnapshot, PaddleView,
    RoomId, ServerMessage, TournamentId,
};
use crate::room::{RoomCommand, RoomRegistry, RoomSpec, SlotOccupant, TournamentLink};
use crate::tournament::{MatchReport, TournamentSignal};

/// Smallest timer period accepted from configuration.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// How the loop ended.
#[derive(Debug)]
enum Ending {
    /// A winner is known.
    Decided { winner: Side, reason: EndReason },
    /// Stopped without a result.
    Aborted(String),
    /// Every handle was dropped.
    Abandoned,
}

/// Every timer a room owns.
struct RoomTimers {
    countdown: Interval,
    tick: Interval,
    bot: Interval,
    deadline: Pin<Box<Sleep>>,
    deadline_armed: bool,
}

impl RoomTimers {
    fn new(countdown_step: Duration, tick_period: Duration, bot_interval: Duration) -> Self {
        let now = Instant::now();
        let mut countdown = interval_at(now, countdown_step.max(MIN_PERIOD));
        let mut tick = interval_at(now, tick_period.max(MIN_PERIOD));
        let mut bot = interval_at(now, bot_interval.max(MIN_PERIOD));
        countdown.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        bot.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            countdown,
            tick,
            bot,
            deadline: Box::pin(sleep(Duration::ZERO)),
            deadline_armed: false,
        }
    }

    /// Start the play-phase timers.
    fn begin_play(&mut self, deadline: Option<Duration>) {
        self.tick.reset();
        self.bot.reset();
        if let Some(after) = deadline {
            self.deadline.as_mut().reset(Instant::now() + after);
            self.deadline_armed = true;
        }
    }
}

/// One authoritative match.
pub struct Room {
    id: RoomId,
    slots: [SlotOccupant; 2],
    state: MatchState,
    rng: MatchRng,
    countdown: u32,
    deadline: Option<Duration>,
    tournament: Option<TournamentLink>,
    spectators: HashMap<ConnectionId, ClientSender>,
    bot: BotPolicy,
    registry: Arc<RoomRegistry>,
}

impl Room {
    /// Build a room in `Waiting` from its spec.
    pub fn new(spec: RoomSpec, registry: Arc<RoomRegistry>) -> Self {
        let aliases = [spec.slots[0].alias(), spec.slots[1].alias()];
        let rng = MatchRng::for_room(&spec.room_id, &aliases);
        let countdown = registry.services().config.countdown_from;
        let bot = registry.services().config.bot;

        Self {
            id: spec.room_id,
            state: MatchState::new(spec.settings, spec.target_score),
            rng,
            countdown,
            deadline: spec.deadline,
            tournament: spec.tournament,
            spectators: HashMap::new(),
            bot,
            slots: spec.slots,
            registry,
        }
    }

    /// Room identifier.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// Display names in slot order.
    pub fn aliases(&self) -> [String; 2] {
        [self.slots[0].alias().to_string(), self.slots[1].alias().to_string()]
    }

    /// Seated usernames.
    pub fn humans(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(|slot| slot.username().map(str::to_string))
            .collect()
    }

    /// Owning tournament.
    pub fn tournament_id(&self) -> Option<TournamentId> {
        self.tournament.as_ref().map(|link| link.tournament_id)
    }

    // =========================================================================
    // TASK LOOP
    // =========================================================================

    /// Run the match to completion, then finalize and deregister.
    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<RoomCommand>) {
        let config = self.registry.services().config.clone();
        let mut timers = RoomTimers::new(config.countdown_step, config.tick_period(), self.bot.interval);
        let has_bots = self.slots.iter().any(SlotOccupant::is_bot);

        self.announce();
        self.state.status = MatchStatus::Starting;

        let ending = loop {
            tokio::select! {
                biased;

                () = &mut timers.deadline, if timers.deadline_armed => {
                    let winner = resolve_by_score(&self.state.score, &mut self.rng);
                    info!(
                        room_id = %self.id,
                        left = self.state.score.left,
                        right = self.state.score.right,
                        "Deadline reached, resolving by score"
                    );
                    break Ending::Decided { winner, reason: EndReason::Timeout };
                }

                _ = timers.countdown.tick(), if self.state.status == MatchStatus::Starting => {
                    self.broadcast(ServerMessage::MatchCountdown { room_id: self.id, value: self.countdown });
                    if self.countdown == 0 {
                        self.begin_play();
                        timers.begin_play(self.deadline);
                    } else {
                        self.countdown -= 1;
                    }
                }

                _ = timers.tick.tick(), if self.state.status == MatchStatus::Playing => {
                    let result = tick(&mut self.state, &mut self.rng);
                    self.log_events(&result.events);
                    let snapshot = self.snapshot();
                    self.broadcast(ServerMessage::MatchStateSnapshot(snapshot));
                    if let Some(winner) = result.winner {
                        break Ending::Decided { winner, reason: EndReason::Score };
                    }
                }

                _ = timers.bot.tick(), if has_bots && self.state.status == MatchStatus::Playing => {
                    self.drive_bots();
                }

                // Polled last; a command flood must not starve the timers
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Some(ending) = self.handle_command(command) {
                            break ending;
                        }
                    }
                    None => break Ending::Abandoned,
                },
            }
        };

        // Teardown: no timer fires and no command is accepted past this point
        drop(timers);
        commands.close();

        match ending {
            Ending::Decided { winner, reason } => self.finalize(winner, reason).await,
            Ending::Aborted(reason) => {
                info!(room_id = %self.id, reason = %reason, "Room stopped");
                self.state.status = MatchStatus::Finished;
                self.broadcast(ServerMessage::MatchAborted { room_id: self.id, reason });
            }
            Ending::Abandoned => debug!(room_id = %self.id, "Room abandoned"),
        }

        self.registry.remove(&self.id).await;
    }

    fn handle_command(&mut self, command: RoomCommand) -> Option<Ending> {
        match command {
            RoomCommand::Move { connection, direction } => {
                if self.state.status != MatchStatus::Playing {
                    return None;
                }
                if let Some(side) = self.side_of_connection(connection) {
                    apply_move(self.state.paddle_mut(side), direction);
                }
            }
            RoomCommand::Dash { connection } => {
                if self.state.status != MatchStatus::Playing {
                    return None;
                }
                if let Some(side) = self.side_of_connection(connection) {
                    if start_dash(&mut self.state, side) {
                        debug!(room_id = %self.id, ?side, "Dash");
                    }
                }
            }
            RoomCommand::Rebind { username, connection, sender, reply } => {
                let result = self.rebind(&username, connection, sender);
                let _ = reply.send(result);
            }
            RoomCommand::Spectate { connection, sender } => {
                let _ = sender.try_send(ServerMessage::MatchStateSnapshot(self.snapshot()));
                self.spectators.insert(connection, sender);
            }
            RoomCommand::Detach { connection } => {
                self.spectators.remove(&connection);
            }
            RoomCommand::Forfeit { username } => {
                if let Some(side) = self.side_of_user(&username) {
                    info!(room_id = %self.id, username = %username, "Forfeit");
                    return Some(Ending::Decided {
                        winner: side.opponent(),
                        reason: EndReason::Forfeit,
                    });
                }
            }
            RoomCommand::Stop { reason } => return Some(Ending::Aborted(reason)),
        }
        None
    }

    fn rebind(&mut self, who: &str, new_connection: ConnectionId, new_sender: ClientSender) -> Result<(), ArenaError> {
        let side = self
            .side_of_user(who)
            .ok_or_else(|| ArenaError::Unauthorized("not a player in this room".into()))?;

        if let SlotOccupant::Human { connection, sender, .. } = &mut self.slots[side.index()] {
            debug!(room_id = %self.id, from = *connection, to = new_connection, "Rebind");
            *connection = new_connection;
            *sender = new_sender.clone();
        }
        self.spectators.remove(&new_connection);

        let _ = new_sender.try_send(ServerMessage::MatchStateSnapshot(self.snapshot()));
        Ok(())
    }

    fn begin_play(&mut self) {
        self.state.status = MatchStatus::Playing;
        serve(&mut self.state, &mut self.rng);
        info!(room_id = %self.id, "Room playing");
        let snapshot = self.snapshot();
        self.broadcast(ServerMessage::MatchStateSnapshot(snapshot));
    }

    fn drive_bots(&mut self) {
        for side in Side::BOTH {
            if self.slots[side.index()].is_bot() {
                let direction = self.bot.decide_for(&self.state, side, &mut self.rng);
                apply_move(self.state.paddle_mut(side), direction);
            }
        }
    }

    fn log_events(&self, events: &[GameEvent]) {
        for event in events {
            match event {
                GameEvent::PointScored { scorer, score } => {
                    debug!(room_id = %self.id, ?scorer, left = score.left, right = score.right, "Point");
                }
                #[cfg(feature = "debug-tracing")]
                other => tracing::trace!(room_id = %self.id, tick = self.state.tick, ?other, "Tick event"),
                #[cfg(not(feature = "debug-tracing"))]
                _ => {}
            }
        }
    }

    // =========================================================================
    // FINALIZATION
    // =========================================================================

    async fn finalize(&mut self, winner: Side, reason: EndReason) {
        self.state.status = MatchStatus::Finished;
        let loser = winner.opponent();
        let score = self.state.score;

        // Persistence runs concurrently with the broadcast
        let persistence = self.spawn_persistence(winner);

        let info = MatchEndInfo {
            room_id: self.id,
            winner: self.slots[winner.index()].alias().to_string(),
            loser: self.slots[loser.index()].alias().to_string(),
            final_score: score,
            players: self.aliases(),
            reason,
        };
        info!(
            room_id = %self.id,
            winner = %info.winner,
            left = score.left,
            right = score.right,
            ?reason,
            "Match finished"
        );
        self.broadcast(ServerMessage::MatchEnded(info));

        // Teardown waits for persistence so a result is never counted twice
        if let Some(handle) = persistence {
            if let Err(e) = handle.await {
                warn!(room_id = %self.id, error = %e, "Result persistence task failed");
            }
        }

        let presence = &self.registry.services().presence;
        for username in self.humans() {
            presence
                .notify_user(&username, ServerMessage::PlayerStatsInvalidated { username: username.clone() })
                .await;
        }

        if let Some(link) = &self.tournament {
            let report = MatchReport {
                tournament_id: link.tournament_id,
                round: link.round,
                index: link.index,
                room_id: self.id,
                winner,
                score,
                reason,
            };
            if link.reporter.send(TournamentSignal::MatchResolved(report)).is_err() {
                warn!(room_id = %self.id, "Tournament driver gone, result not reported");
            }
        }
    }

    /// Persist the win/loss pair when both slots are humans.
    fn spawn_persistence(&self, winner: Side) -> Option<JoinHandle<()>> {
        let loser = winner.opponent();
        let winner_name = self.slots[winner.index()].username()?.to_string();
        let loser_name = self.slots[loser.index()].username()?.to_string();
        let winner_score = self.state.score.of(winner);
        let loser_score = self.state.score.of(loser);
        let store = self.registry.services().store.clone();
        let room_id = self.id;

        Some(tokio::spawn(async move {
            let winner_id = store.find_user_id_by_username(&winner_name).await;
            let loser_id = store.find_user_id_by_username(&loser_name).await;
            let (winner_id, loser_id) = match (winner_id, loser_id) {
                (Ok(w), Ok(l)) => (w, l),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(%room_id, error = %e, "Result not persisted");
                    return;
                }
            };
            if let Err(e) = store
                .record_match_result(winner_id, loser_id, winner_score, loser_score)
                .await
            {
                warn!(%room_id, error = %e, "Result not persisted");
            }
        }))
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Tell each human which side they play.
    fn announce(&self) {
        for side in Side::BOTH {
            if let SlotOccupant::Human { sender, .. } = &self.slots[side.index()] {
                let _ = sender.try_send(ServerMessage::MatchAssigned(MatchAssignment {
                    room_id: self.id,
                    side,
                    opponent: self.slots[side.opponent().index()].alias().to_string(),
                    target_score: self.state.target_score,
                    settings: self.state.settings,
                }));
            }
        }
    }

    /// Best-effort delivery to both players and all spectators.
    fn broadcast(&mut self, message: ServerMessage) {
        for slot in &self.slots {
            if let SlotOccupant::Human { sender, .. } = slot {
                let _ = sender.try_send(message.clone());
            }
        }
        self.spectators.retain(|_, sender| !sender.is_closed());
        for sender in self.spectators.values() {
            let _ = sender.try_send(message.clone());
        }
    }

    fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            room_id: self.id,
            tick: self.state.tick,
            status: self.state.status,
            ball: self.state.ball.position,
            ball_velocity: self.state.ball.velocity,
            ball_radius: self.state.ball.radius,
            paddles: Side::BOTH
                .iter()
                .map(|side| {
                    let paddle = self.state.paddle(*side);
                    PaddleView {
                        side: *side,
                        player: self.slots[side.index()].alias().to_string(),
                        x: paddle.left(),
                        y: paddle.y,
                        dashing: paddle.is_dashing(),
                    }
                })
                .collect(),
            score: self.state.score,
            target_score: self.state.target_score,
            settings: self.state.settings,
        }
    }

    fn side_of_connection(&self, connection: ConnectionId) -> Option<Side> {
        Side::BOTH.into_iter().find(|side| {
            matches!(&self.slots[side.index()], SlotOccupant::Human { connection: c, .. } if *c == connection)
        })
    }

    fn side_of_user(&self, username: &str) -> Option<Side> {
        Side::BOTH
            .into_iter()
            .find(|side| self.slots[side.index()].username() == Some(username))
    }
}

//! Tournament Manager
//!
//! Registry and state machine for tournaments: `waiting` while the roster
//! fills, `running` while rounds are played, `completed` once the ranking is
//! fixed. Fill deadlines, round cooldowns and the eviction of completed
//! tournaments are small timer tasks that post a [`TournamentSignal`] back to
//! the driver; bracket matches run in rooms whose results arrive the same way.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ArenaError, ArenaResult, ConflictReason};
use crate::game::settings::MatchSettings;
use crate::game::state::{Score, Side};
use crate::network::presence::PresenceRegistry;
use crate::network::protocol::{
    BracketMatchView, EndReason, ParticipantView, ServerMessage, SlotView, Standing, TournamentId,
    TournamentView,
};
use crate::room::{RoomRegistry, RoomSpec, SlotOccupant, TournamentLink};
use crate::tournament::bracket::{Bracket, Slot};
use crate::tournament::{MatchReport, TournamentSignal};

/// Bracket sizes a tournament may be created with.
pub const ALLOWED_SIZES: [usize; 4] = [2, 4, 8, 16];

/// Creation parameters, already validated and defaulted.
#[derive(Debug, Clone)]
pub struct TournamentOptions {
    /// Display name.
    pub name: String,
    /// Bracket size; must be in [`ALLOWED_SIZES`].
    pub size: usize,
    /// Host alias; defaults to the username.
    pub alias: Option<String>,
    /// Points needed to win each match.
    pub target_score: u32,
    /// Watchdog for matches with a human.
    pub duration: Option<Duration>,
    /// Match settings.
    pub settings: MatchSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TournamentStatus {
    Waiting,
    Running,
    Completed,
}

impl TournamentStatus {
    fn as_str(self) -> &'static str {
        match self {
            TournamentStatus::Waiting => "waiting",
            TournamentStatus::Running => "running",
            TournamentStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone)]
struct Participant {
    alias: String,
    /// `None` for bots.
    username: Option<String>,
    eliminated: bool,
    /// Left while running; forfeits any further match.
    withdrawn: bool,
}

impl Participant {
    fn human(username: &str, alias: Option<String>) -> Self {
        Self {
            alias: alias.unwrap_or_else(|| username.to_string()),
            username: Some(username.to_string()),
            eliminated: false,
            withdrawn: false,
        }
    }

    fn bot(alias: String) -> Self {
        Self {
            alias,
            username: None,
            eliminated: false,
            withdrawn: false,
        }
    }
}

struct Tournament {
    id: TournamentId,
    name: String,
    host: String,
    size: usize,
    status: TournamentStatus,
    participants: Vec<Participant>,
    bracket: Option<Bracket>,
    current_round: usize,
    resolved_in_round: usize,
    playable_in_round: usize,
    target_score: u32,
    duration: Option<Duration>,
    settings: MatchSettings,
    ranking: Option<Vec<Standing>>,
    fill_timer: Option<JoinHandle<()>>,
}

impl Tournament {
    fn position_of(&self, username: &str) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.username.as_deref() == Some(username))
    }

    fn alias_taken(&self, alias: &str) -> bool {
        self.participants.iter().any(|p| p.alias == alias)
    }

    fn usernames(&self) -> Vec<String> {
        self.participants
            .iter()
            .filter_map(|p| p.username.clone())
            .collect()
    }

    fn backfill_bots(&mut self) -> usize {
        let mut added = 0;
        let mut n = 1;
        while self.participants.len() < self.size {
            let alias = format!("Bot {}", n);
            n += 1;
            if !self.alias_taken(&alias) {
                self.participants.push(Participant::bot(alias));
                added += 1;
            }
        }
        added
    }

    fn standing(&self, place: u32, who: usize) -> Standing {
        let p = &self.participants[who];
        Standing {
            place,
            alias: p.alias.clone(),
            username: p.username.clone(),
        }
    }

    fn slot_view(&self, slot: Slot) -> SlotView {
        match slot {
            Slot::Empty => SlotView::Empty,
            Slot::Bye => SlotView::Bye,
            Slot::Participant(who) => {
                let p = &self.participants[who];
                SlotView::Player {
                    alias: p.alias.clone(),
                    bot: p.username.is_none(),
                }
            }
        }
    }

    fn view(&self) -> TournamentView {
        let rounds = self
            .bracket
            .as_ref()
            .map(|bracket| {
                bracket
                    .rounds()
                    .iter()
                    .map(|round| {
                        round
                            .iter()
                            .map(|m| BracketMatchView {
                                id: m.id(),
                                round: m.round,
                                index: m.index,
                                p1: self.slot_view(m.p1),
                                p2: self.slot_view(m.p2),
                                status: m.status.as_str().to_string(),
                                winner: m.winner.map(|w| self.participants[w].alias.clone()),
                                room_id: m.room_id,
                            })
                            .collect()
                    })
                    .collect()
            })
            .unwrap_or_default();

        TournamentView {
            tournament_id: self.id,
            name: self.name.clone(),
            host: self.host.clone(),
            size: self.size,
            status: self.status.as_str().to_string(),
            current_round: self.current_round,
            participants: self
                .participants
                .iter()
                .map(|p| ParticipantView {
                    alias: p.alias.clone(),
                    username: p.username.clone(),
                    eliminated: p.eliminated,
                })
                .collect(),
            rounds,
            ranking: self.ranking.clone(),
        }
    }
}

/// Tournament registry and driver.
pub struct TournamentManager {
    tournaments: RwLock<HashMap<TournamentId, Tournament>>,
    rooms: Arc<RoomRegistry>,
    signals: mpsc::UnboundedSender<TournamentSignal>,
}

impl TournamentManager {
    /// Create the manager and spawn its driver task.
    pub fn new(rooms: Arc<RoomRegistry>) -> Arc<Self> {
        let (signals, rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            tournaments: RwLock::new(HashMap::new()),
            rooms,
            signals,
        });
        tokio::spawn(Self::drive(Arc::downgrade(&manager), rx));
        manager
    }

    async fn drive(manager: Weak<Self>, mut rx: mpsc::UnboundedReceiver<TournamentSignal>) {
        while let Some(signal) = rx.recv().await {
            let Some(manager) = manager.upgrade() else {
                break;
            };
            manager.handle_signal(signal).await;
        }
        debug!("Tournament driver stopped");
    }

    fn presence(&self) -> &PresenceRegistry {
        &self.rooms.services().presence
    }

    /// Current state of a tournament.
    pub async fn view(&self, id: &TournamentId) -> Option<TournamentView> {
        self.tournaments.read().await.get(id).map(Tournament::view)
    }

    /// Number of known tournaments.
    pub async fn count(&self) -> usize {
        self.tournaments.read().await.len()
    }

    // =========================================================================
    // REQUESTS
    // =========================================================================

    /// Create a tournament with `host` enrolled and start its fill window.
    pub async fn create(&self, host: &str, options: TournamentOptions) -> ArenaResult<TournamentView> {
        if !ALLOWED_SIZES.contains(&options.size) {
            return Err(ArenaError::InvalidInput(format!(
                "tournament size must be one of {:?}",
                ALLOWED_SIZES
            )));
        }

        let id = Uuid::new_v4();
        let fill_window = self.rooms.services().config.fill_window;
        let tournament = Tournament {
            id,
            name: options.name,
            host: host.to_string(),
            size: options.size,
            status: TournamentStatus::Waiting,
            participants: vec![Participant::human(host, options.alias)],
            bracket: None,
            current_round: 0,
            resolved_in_round: 0,
            playable_in_round: 0,
            target_score: options.target_score,
            duration: options.duration,
            settings: options.settings,
            ranking: None,
            fill_timer: Some(self.schedule(fill_window, TournamentSignal::FillDeadline(id))),
        };

        info!(tournament_id = %id, host, size = tournament.size, "Tournament created");
        let view = tournament.view();
        self.publish(&tournament).await;
        self.tournaments.write().await.insert(id, tournament);
        Ok(view)
    }

    /// Enroll a user. Joining again while enrolled only resends the state.
    pub async fn join(&self, id: TournamentId, username: &str, alias: Option<String>) -> ArenaResult<TournamentView> {
        let mut tournaments = self.tournaments.write().await;
        let t = tournaments
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("tournament"))?;

        if t.position_of(username).is_some() {
            let view = t.view();
            self.presence()
                .notify_user(username, ServerMessage::TournamentStateUpdated(view.clone()))
                .await;
            return Ok(view);
        }
        if t.status != TournamentStatus::Waiting {
            return Err(ArenaError::Conflict(ConflictReason::AlreadyRunning));
        }
        if t.participants.len() >= t.size {
            return Err(ArenaError::Conflict(ConflictReason::Full));
        }
        let participant = Participant::human(username, alias);
        if t.alias_taken(&participant.alias) {
            return Err(ArenaError::InvalidInput("alias already taken".into()));
        }

        t.participants.push(participant);
        info!(tournament_id = %id, username, enrolled = t.participants.len(), "Tournament joined");
        self.publish(t).await;

        if t.participants.len() == t.size {
            self.begin(t).await;
        }
        Ok(t.view())
    }

    /// Withdraw a user: removed while waiting, forfeits while running.
    pub async fn leave(&self, id: TournamentId, username: &str) -> ArenaResult<()> {
        let mut tournaments = self.tournaments.write().await;
        let t = tournaments
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("tournament"))?;
        let position = t
            .position_of(username)
            .ok_or_else(|| ArenaError::not_found("participant"))?;

        match t.status {
            TournamentStatus::Waiting => {
                t.participants.remove(position);
                info!(tournament_id = %id, username, "Tournament left");
                if t.participants.is_empty() {
                    if let Some(timer) = t.fill_timer.take() {
                        timer.abort();
                    }
                    tournaments.remove(&id);
                    info!(tournament_id = %id, "Tournament dropped, roster empty");
                    return Ok(());
                }
                if t.host == username {
                    if let Some(next) = t.participants.iter().find_map(|p| p.username.clone()) {
                        t.host = next;
                    }
                }
                self.publish(t).await;
            }
            TournamentStatus::Running => {
                t.participants[position].withdrawn = true;
                info!(tournament_id = %id, username, "Tournament withdrawn");
                if let Some(room) = self.rooms.room_for_player(username).await {
                    if room.tournament == Some(id) {
                        let _ = room
                            .send(crate::room::RoomCommand::Forfeit { username: username.to_string() })
                            .await;
                    }
                }
            }
            TournamentStatus::Completed => {}
        }
        Ok(())
    }

    /// Start with the current roster (host only).
    pub async fn start(&self, id: TournamentId, username: &str) -> ArenaResult<()> {
        let mut tournaments = self.tournaments.write().await;
        let t = tournaments
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("tournament"))?;
        if t.host != username {
            return Err(ArenaError::Unauthorized("only the host can start".into()));
        }
        if t.status != TournamentStatus::Waiting {
            return Err(ArenaError::Conflict(ConflictReason::AlreadyRunning));
        }
        if t.participants.len() < 2 {
            return Err(ArenaError::Conflict(ConflictReason::NotEnoughPlayers));
        }
        self.begin(t).await;
        Ok(())
    }

    /// Fill the roster with bots and start (host only).
    pub async fn force_fill(&self, id: TournamentId, username: &str) -> ArenaResult<()> {
        let mut tournaments = self.tournaments.write().await;
        let t = tournaments
            .get_mut(&id)
            .ok_or_else(|| ArenaError::not_found("tournament"))?;
        if t.host != username {
            return Err(ArenaError::Unauthorized("only the host can fill".into()));
        }
        if t.status != TournamentStatus::Waiting {
            return Err(ArenaError::Conflict(ConflictReason::AlreadyRunning));
        }
        let added = t.backfill_bots();
        info!(tournament_id = %id, bots = added, "Tournament force-filled");
        self.begin(t).await;
        Ok(())
    }

    // =========================================================================
    // DRIVER
    // =========================================================================

    async fn handle_signal(&self, signal: TournamentSignal) {
        match signal {
            TournamentSignal::MatchResolved(report) => self.on_match_resolved(report).await,
            TournamentSignal::FillDeadline(id) => {
                let mut tournaments = self.tournaments.write().await;
                let Some(t) = tournaments.get_mut(&id) else {
                    return;
                };
                if t.status == TournamentStatus::Waiting {
                    let added = t.backfill_bots();
                    info!(tournament_id = %id, bots = added, "Fill window elapsed");
                    self.begin(t).await;
                }
            }
            TournamentSignal::LaunchRound { tournament_id, round } => {
                let mut tournaments = self.tournaments.write().await;
                let Some(t) = tournaments.get_mut(&tournament_id) else {
                    return;
                };
                if t.status == TournamentStatus::Running && round > t.current_round {
                    self.launch_round(t, round).await;
                }
            }
            TournamentSignal::Evict(id) => {
                let mut tournaments = self.tournaments.write().await;
                if tournaments.get(&id).is_some_and(|t| t.status == TournamentStatus::Completed) {
                    tournaments.remove(&id);
                    info!(tournament_id = %id, "Completed tournament evicted");
                }
            }
        }
    }

    async fn begin(&self, t: &mut Tournament) {
        if let Some(timer) = t.fill_timer.take() {
            timer.abort();
        }
        t.status = TournamentStatus::Running;
        let bracket = Bracket::build(t.participants.len());
        info!(
            tournament_id = %t.id,
            participants = t.participants.len(),
            bracket = bracket.size(),
            byes = bracket.bye_count(),
            "Tournament started"
        );
        t.bracket = Some(bracket);
        self.launch_round(t, 0).await;
    }

    /// Resolve byes and launch every playable match of `round`. A round of
    /// only byes advances straight to the next one.
    async fn launch_round(&self, t: &mut Tournament, mut round: usize) {
        loop {
            let Some(bracket) = t.bracket.as_mut() else {
                return;
            };
            bracket.resolve_byes(round);
            let playable = bracket.playable(round);
            let is_final = bracket.is_final(round);
            t.current_round = round;

            if playable.is_empty() {
                if is_final {
                    self.finalize(t).await;
                    return;
                }
                round += 1;
                continue;
            }

            t.resolved_in_round = 0;
            t.playable_in_round = playable.len();
            info!(tournament_id = %t.id, round, matches = playable.len(), "Tournament round launched");
            for index in playable {
                self.launch_match(t, round, index).await;
            }
            self.publish(t).await;
            return;
        }
    }

    async fn launch_match(&self, t: &mut Tournament, round: usize, index: usize) {
        let Some(m) = t.bracket.as_ref().and_then(|b| b.get(round, index)) else {
            return;
        };
        let (Some(a), Some(b)) = (m.p1.participant(), m.p2.participant()) else {
            return;
        };

        let left = self.occupant(&t.participants[a]).await;
        let right = self.occupant(&t.participants[b]).await;
        let (left, right) = match (left, right) {
            (Some(left), Some(right)) => (left, right),
            (left, right) => {
                let winner = if left.is_none() && right.is_some() { Side::Right } else { Side::Left };
                info!(tournament_id = %t.id, round, index, ?winner, "Participant absent at launch, forfeiting");
                self.forfeit_unplayed(t, round, index, winner);
                return;
            }
        };

        let config = &self.rooms.services().config;
        let deadline = if left.is_bot() && right.is_bot() {
            config.bot_match_ceiling
        } else {
            t.duration.unwrap_or(config.human_match_ceiling)
        };
        let seated: Vec<(Side, String)> = [(Side::Left, &left), (Side::Right, &right)]
            .into_iter()
            .filter_map(|(side, slot)| slot.username().map(|name| (side, name.to_string())))
            .collect();

        let spec = RoomSpec {
            room_id: Uuid::new_v4(),
            slots: [left, right],
            settings: t.settings,
            target_score: t.target_score,
            deadline: Some(deadline),
            tournament: Some(TournamentLink {
                tournament_id: t.id,
                round,
                index,
                reporter: self.signals.clone(),
            }),
        };

        match self.rooms.spawn(spec).await {
            Ok(handle) => {
                if let Some(bracket) = t.bracket.as_mut() {
                    bracket.mark_playing(round, index, Some(handle.room_id));
                }
                for (side, username) in seated {
                    self.presence()
                        .notify_user(
                            &username,
                            ServerMessage::TournamentMatchStarting {
                                tournament_id: t.id,
                                round,
                                match_index: index,
                                room_id: handle.room_id,
                                side,
                                opponent: handle.aliases[side.opponent().index()].clone(),
                            },
                        )
                        .await;
                }
            }
            Err(e) => {
                // A participant still seated elsewhere cannot play this match
                let mut winner = Side::Left;
                for (side, username) in &seated {
                    if self.rooms.is_seated(username).await {
                        winner = side.opponent();
                        break;
                    }
                }
                warn!(tournament_id = %t.id, round, index, error = %e, "Bracket room not started, forfeiting");
                self.forfeit_unplayed(t, round, index, winner);
            }
        }
    }

    /// Slot occupant for a participant, or `None` if a human has no live
    /// connection (or withdrew).
    async fn occupant(&self, p: &Participant) -> Option<SlotOccupant> {
        let Some(username) = &p.username else {
            return Some(SlotOccupant::Bot { alias: p.alias.clone() });
        };
        if p.withdrawn {
            return None;
        }
        let (connection, sender) = self.presence().primary_connection(username).await?;
        Some(SlotOccupant::Human {
            username: username.clone(),
            alias: p.alias.clone(),
            connection,
            sender,
        })
    }

    /// Resolve a match that never got a room through the normal result path.
    fn forfeit_unplayed(&self, t: &mut Tournament, round: usize, index: usize, winner: Side) {
        if let Some(bracket) = t.bracket.as_mut() {
            bracket.mark_playing(round, index, None);
        }
        let report = MatchReport {
            tournament_id: t.id,
            round,
            index,
            room_id: Uuid::nil(),
            winner,
            score: Score::default(),
            reason: EndReason::Forfeit,
        };
        if self.signals.send(TournamentSignal::MatchResolved(report)).is_err() {
            warn!(tournament_id = %t.id, "Tournament driver gone");
        }
    }

    async fn on_match_resolved(&self, report: MatchReport) {
        let mut tournaments = self.tournaments.write().await;
        let Some(t) = tournaments.get_mut(&report.tournament_id) else {
            return;
        };
        if t.status != TournamentStatus::Running || report.round != t.current_round {
            debug!(tournament_id = %t.id, round = report.round, "Stale match report");
            return;
        }
        let Some(bracket) = t.bracket.as_mut() else {
            return;
        };
        let Some((winner, loser)) = bracket.record(report.round, report.index, report.winner) else {
            debug!(tournament_id = %t.id, round = report.round, index = report.index, "Duplicate match report");
            return;
        };
        let is_final = bracket.is_final(report.round);

        t.participants[loser].eliminated = true;
        t.resolved_in_round += 1;
        info!(
            tournament_id = %t.id,
            round = report.round,
            index = report.index,
            winner = %t.participants[winner].alias,
            loser = %t.participants[loser].alias,
            reason = ?report.reason,
            "Bracket match resolved"
        );

        if t.resolved_in_round < t.playable_in_round {
            self.publish(t).await;
            return;
        }
        if is_final {
            self.finalize(t).await;
            return;
        }

        let cooldown = self.rooms.services().config.round_cooldown;
        info!(tournament_id = %t.id, round = report.round, "Tournament round complete");
        for username in t.usernames() {
            self.presence()
                .notify_user(
                    &username,
                    ServerMessage::TournamentRoundComplete {
                        tournament_id: t.id,
                        round: report.round,
                        next_round_in_ms: cooldown.as_millis() as u64,
                    },
                )
                .await;
        }
        self.publish(t).await;
        self.schedule(
            cooldown,
            TournamentSignal::LaunchRound {
                tournament_id: t.id,
                round: report.round + 1,
            },
        );
    }

    async fn finalize(&self, t: &mut Tournament) {
        if t.ranking.is_some() {
            return;
        }
        let placements = match &t.bracket {
            Some(bracket) => bracket.ranking(t.participants.len()),
            None => return,
        };
        let ranking: Vec<Standing> = placements
            .into_iter()
            .map(|(place, who)| t.standing(place, who))
            .collect();

        t.status = TournamentStatus::Completed;
        t.ranking = Some(ranking.clone());
        info!(
            tournament_id = %t.id,
            champion = ranking.first().map(|s| s.alias.as_str()).unwrap_or_default(),
            "Tournament finished"
        );

        for username in t.usernames() {
            self.presence()
                .notify_user(
                    &username,
                    ServerMessage::TournamentFinished {
                        tournament_id: t.id,
                        ranking: ranking.clone(),
                    },
                )
                .await;
        }
        self.publish(t).await;

        let retention = self.rooms.services().config.tournament_retention;
        self.schedule(retention, TournamentSignal::Evict(t.id));
    }

    /// Send the current state to every enrolled user.
    async fn publish(&self, t: &Tournament) {
        let view = t.view();
        for username in t.usernames() {
            self.presence()
                .notify_user(&username, ServerMessage::TournamentStateUpdated(view.clone()))
                .await;
        }
    }

    fn schedule(&self, after: Duration, signal: TournamentSignal) -> JoinHandle<()> {
        let signals = self.signals.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = signals.send(signal);
        })
    }
}

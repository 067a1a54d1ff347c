//! Single-Elimination Bracket
//!
//! Pure bracket bookkeeping: construction with byes, bye resolution, result
//! recording with winner propagation, and the final ranking. Participants
//! are referenced by their roster index.

use serde::{Serialize, Deserialize};

use crate::game::state::Side;
use crate::network::protocol::RoomId;

/// One side of a bracket match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    /// Waiting for a winner from the previous round.
    Empty,
    /// No opponent.
    Bye,
    /// Roster index.
    Participant(usize),
}

impl Slot {
    /// Roster index, if a participant.
    pub fn participant(self) -> Option<usize> {
        match self {
            Slot::Participant(index) => Some(index),
            _ => None,
        }
    }
}

/// Bracket match progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BracketStatus {
    /// Not started.
    Pending,
    /// A room is running it.
    Playing,
    /// Resolved.
    Done,
}

impl BracketStatus {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            BracketStatus::Pending => "pending",
            BracketStatus::Playing => "playing",
            BracketStatus::Done => "done",
        }
    }
}

/// One match of the bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketMatch {
    /// Round index.
    pub round: usize,
    /// Index within the round.
    pub index: usize,
    /// First slot.
    pub p1: Slot,
    /// Second slot.
    pub p2: Slot,
    /// Progress.
    pub status: BracketStatus,
    /// Winning roster index.
    pub winner: Option<usize>,
    /// Losing roster index (absent for byes).
    pub loser: Option<usize>,
    /// Room playing this match.
    pub room_id: Option<RoomId>,
}

impl BracketMatch {
    fn new(round: usize, index: usize, p1: Slot, p2: Slot) -> Self {
        Self {
            round,
            index,
            p1,
            p2,
            status: BracketStatus::Pending,
            winner: None,
            loser: None,
            room_id: None,
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> String {
        format!("r{}m{}", self.round, self.index)
    }

    /// Slot for a side.
    pub fn slot(&self, side: Side) -> Slot {
        match side {
            Side::Left => self.p1,
            Side::Right => self.p2,
        }
    }

    /// Both slots hold participants.
    pub fn is_playable(&self) -> bool {
        matches!((self.p1, self.p2), (Slot::Participant(_), Slot::Participant(_)))
    }

    /// Either slot is a bye.
    pub fn has_bye(&self) -> bool {
        self.p1 == Slot::Bye || self.p2 == Slot::Bye
    }
}

/// Rounds of matches, first round first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    size: usize,
    rounds: Vec<Vec<BracketMatch>>,
}

impl Bracket {
    /// Build for `participants` entrants.
    ///
    /// The size is the smallest power of two that fits (at least 2); the
    /// missing first-round slots are byes. Later rounds start empty.
    pub fn build(participants: usize) -> Self {
        let size = participants.max(2).next_power_of_two();
        let round_count = size.trailing_zeros() as usize;
        let seat = |position: usize| {
            if position < participants {
                Slot::Participant(position)
            } else {
                Slot::Bye
            }
        };

        let mut rounds = Vec::with_capacity(round_count);
        rounds.push(
            (0..size / 2)
                .map(|i| BracketMatch::new(0, i, seat(2 * i), seat(2 * i + 1)))
                .collect(),
        );
        for round in 1..round_count {
            let matches = size >> (round + 1);
            rounds.push(
                (0..matches)
                    .map(|i| BracketMatch::new(round, i, Slot::Empty, Slot::Empty))
                    .collect(),
            );
        }

        Self { size, rounds }
    }

    /// Bracket size (power of two).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of rounds.
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    /// Is `round` the final?
    pub fn is_final(&self, round: usize) -> bool {
        round + 1 == self.rounds.len()
    }

    /// All rounds.
    pub fn rounds(&self) -> &[Vec<BracketMatch>] {
        &self.rounds
    }

    /// Matches of a round.
    pub fn round(&self, round: usize) -> &[BracketMatch] {
        self.rounds.get(round).map_or(&[], Vec::as_slice)
    }

    /// One match.
    pub fn get(&self, round: usize, index: usize) -> Option<&BracketMatch> {
        self.rounds.get(round)?.get(index)
    }

    /// Number of byes among first-round slots.
    pub fn bye_count(&self) -> usize {
        self.round(0)
            .iter()
            .flat_map(|m| [m.p1, m.p2])
            .filter(|slot| *slot == Slot::Bye)
            .count()
    }

    /// Resolve every pending match of `round` that contains a bye.
    ///
    /// A participant facing a bye advances without play; bye against bye
    /// advances nobody. Winners propagate immediately. Returns the indexes
    /// resolved.
    pub fn resolve_byes(&mut self, round: usize) -> Vec<usize> {
        let Some(matches) = self.rounds.get_mut(round) else {
            return Vec::new();
        };

        let mut resolved = Vec::new();
        for m in matches.iter_mut() {
            if m.status != BracketStatus::Done && m.has_bye() {
                m.winner = m.p1.participant().or(m.p2.participant());
                m.status = BracketStatus::Done;
                resolved.push(m.index);
            }
        }
        for index in &resolved {
            self.propagate(round, *index);
        }
        resolved
    }

    /// Indexes of pending matches in `round` with two participants.
    pub fn playable(&self, round: usize) -> Vec<usize> {
        self.round(round)
            .iter()
            .filter(|m| m.status == BracketStatus::Pending && m.is_playable())
            .map(|m| m.index)
            .collect()
    }

    /// Mark a match as running in a room.
    pub fn mark_playing(&mut self, round: usize, index: usize, room_id: Option<RoomId>) {
        if let Some(m) = self.rounds.get_mut(round).and_then(|r| r.get_mut(index)) {
            if m.status == BracketStatus::Pending {
                m.status = BracketStatus::Playing;
                m.room_id = room_id;
            }
        }
    }

    /// Record the winning side of a match and propagate.
    ///
    /// Returns `(winner, loser)` roster indexes, or `None` if the match is
    /// unknown, not playable, or already resolved.
    pub fn record(&mut self, round: usize, index: usize, winner: Side) -> Option<(usize, usize)> {
        let m = self.rounds.get_mut(round)?.get_mut(index)?;
        if m.status == BracketStatus::Done || !m.is_playable() {
            return None;
        }
        let won = m.slot(winner).participant()?;
        let lost = m.slot(winner.opponent()).participant()?;
        m.winner = Some(won);
        m.loser = Some(lost);
        m.status = BracketStatus::Done;
        self.propagate(round, index);
        Some((won, lost))
    }

    /// Is every match of `round` resolved?
    pub fn is_round_complete(&self, round: usize) -> bool {
        self.round(round).iter().all(|m| m.status == BracketStatus::Done)
    }

    /// Final winner.
    pub fn champion(&self) -> Option<usize> {
        self.rounds.last()?.first()?.winner
    }

    /// Placements as `(place, roster index)`, best first.
    ///
    /// Champion 1st, final loser 2nd, semifinal losers share 3rd, everyone
    /// else shares the next place.
    pub fn ranking(&self, participants: usize) -> Vec<(u32, usize)> {
        let mut placed: Vec<(u32, usize)> = Vec::with_capacity(participants);
        let mut seen = vec![false; participants];
        let mut place = |placed: &mut Vec<(u32, usize)>, at: u32, who: usize| {
            if who < participants && !seen[who] {
                seen[who] = true;
                placed.push((at, who));
            }
        };

        if let Some(last) = self.rounds.last().and_then(|r| r.first()) {
            if let Some(w) = last.winner {
                place(&mut placed, 1, w);
            }
            if let Some(l) = last.loser {
                place(&mut placed, 2, l);
            }
        }
        if self.rounds.len() >= 2 {
            for m in &self.rounds[self.rounds.len() - 2] {
                if let Some(l) = m.loser {
                    place(&mut placed, 3, l);
                }
            }
        }

        let rest = placed.len() as u32 + 1;
        for who in 0..participants {
            place(&mut placed, rest, who);
        }
        placed.sort_by_key(|(at, who)| (*at, *who));
        placed
    }

    fn propagate(&mut self, round: usize, index: usize) {
        let Some(winner) = self.get(round, index).map(|m| m.winner) else {
            return;
        };
        let Some(next) = self.rounds.get_mut(round + 1).and_then(|r| r.get_mut(index / 2)) else {
            return;
        };
        let slot = winner.map_or(Slot::Bye, Slot::Participant);
        if index % 2 == 0 {
            next.p1 = slot;
        } else {
            next.p2 = slot;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    /// Drive a bracket to completion, resolving byes and picking winners
    /// with `pick`. Returns the number of matches actually played.
    fn play_out(bracket: &mut Bracket, mut pick: impl FnMut() -> Side) -> usize {
        let mut played = 0;
        for round in 0..bracket.round_count() {
            bracket.resolve_byes(round);
            for index in bracket.playable(round) {
                assert!(bracket.record(round, index, pick()).is_some());
                played += 1;
            }
            assert!(bracket.is_round_complete(round));
        }
        played
    }

    #[test]
    fn test_five_players_three_byes() {
        let mut bracket = Bracket::build(5);
        assert_eq!(bracket.size(), 8);
        assert_eq!(bracket.round_count(), 3);
        assert_eq!(bracket.bye_count(), 3);

        let resolved = bracket.resolve_byes(0);
        assert_eq!(resolved, vec![2, 3]);

        // Participant 4 advanced against a bye; bye-vs-bye advanced nobody
        let next = &bracket.round(1)[1];
        assert_eq!(next.p1, Slot::Participant(4));
        assert_eq!(next.p2, Slot::Bye);
        assert_eq!(bracket.playable(0), vec![0, 1]);
    }

    #[test]
    fn test_propagation_slots() {
        let mut bracket = Bracket::build(4);
        assert_eq!(bracket.record(0, 0, Side::Right), Some((1, 0)));
        assert_eq!(bracket.record(0, 1, Side::Left), Some((2, 3)));
        let final_match = &bracket.round(1)[0];
        assert_eq!(final_match.p1, Slot::Participant(1));
        assert_eq!(final_match.p2, Slot::Participant(2));
    }

    #[test]
    fn test_record_is_idempotent() {
        let mut bracket = Bracket::build(2);
        assert_eq!(bracket.record(0, 0, Side::Left), Some((0, 1)));
        assert_eq!(bracket.record(0, 0, Side::Right), None);
        assert_eq!(bracket.champion(), Some(0));
    }

    #[test]
    fn test_record_rejects_unfilled_match() {
        let mut bracket = Bracket::build(4);
        assert_eq!(bracket.record(1, 0, Side::Left), None);
        assert_eq!(bracket.record(7, 0, Side::Left), None);
    }

    #[test]
    fn test_ranking_four() {
        let mut bracket = Bracket::build(4);
        bracket.record(0, 0, Side::Left);
        bracket.record(0, 1, Side::Left);
        bracket.record(1, 0, Side::Right);

        assert_eq!(bracket.ranking(4), vec![(1, 2), (2, 0), (3, 1), (3, 3)]);
    }

    #[test]
    fn test_ranking_shared_lower_place() {
        let mut bracket = Bracket::build(8);
        play_out(&mut bracket, || Side::Left);
        let ranking = bracket.ranking(8);
        assert_eq!(ranking.iter().filter(|(p, _)| *p == 5).count(), 4);
        assert_eq!(ranking[0], (1, 0));
    }

    #[test]
    fn test_mark_playing_only_pending() {
        let mut bracket = Bracket::build(2);
        let room = uuid::Uuid::new_v4();
        bracket.mark_playing(0, 0, Some(room));
        assert_eq!(bracket.round(0)[0].status, BracketStatus::Playing);
        assert_eq!(bracket.round(0)[0].room_id, Some(room));
        bracket.record(0, 0, Side::Left);
        bracket.mark_playing(0, 0, None);
        assert_eq!(bracket.round(0)[0].status, BracketStatus::Done);
    }

    #[test]
    fn test_randomized_brackets_complete() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.gen_range(2..=16);
            let mut bracket = Bracket::build(n);
            let played = play_out(&mut bracket, || if rng.gen_bool(0.5) { Side::Left } else { Side::Right });
            // Single elimination: one loss per non-champion
            assert_eq!(played, n - 1);
            assert!(bracket.champion().is_some());
        }
    }

    proptest! {
        #[test]
        fn prop_size_and_byes(n in 1usize..=64) {
            let bracket = Bracket::build(n);
            prop_assert!(bracket.size().is_power_of_two());
            prop_assert!(bracket.size() >= n.max(2));
            prop_assert!(bracket.size() < 2 * n.max(2));
            prop_assert_eq!(bracket.bye_count(), bracket.size() - n);
        }

        #[test]
        fn prop_winner_lands_in_parent_slot(n in 2usize..=32, picks in proptest::collection::vec(any::<bool>(), 64)) {
            let mut bracket = Bracket::build(n);
            let mut picks = picks.into_iter().cycle();
            for round in 0..bracket.round_count().saturating_sub(1) {
                bracket.resolve_byes(round);
                for index in bracket.playable(round) {
                    let side = if picks.next().unwrap_or(true) { Side::Left } else { Side::Right };
                    let (winner, _) = bracket.record(round, index, side).unwrap();
                    let parent = &bracket.round(round + 1)[index / 2];
                    let slot = if index % 2 == 0 { parent.p1 } else { parent.p2 };
                    prop_assert_eq!(slot, Slot::Participant(winner));
                }
                prop_assert!(bracket.is_round_complete(round));
            }
        }

        #[test]
        fn prop_ranking_covers_everyone_once(n in 2usize..=16, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut bracket = Bracket::build(n);
            play_out(&mut bracket, || if rng.gen_bool(0.5) { Side::Left } else { Side::Right });
            let ranking = bracket.ranking(n);
            prop_assert_eq!(ranking.len(), n);
            prop_assert_eq!(ranking.iter().filter(|(p, _)| *p == 1).count(), 1);
            let mut who: Vec<_> = ranking.iter().map(|(_, w)| *w).collect();
            who.sort();
            prop_assert_eq!(who, (0..n).collect::<Vec<_>>());
        }
    }
}

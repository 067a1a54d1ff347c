//! Challenge Broker
//!
//! Direct user-to-user match invitations. A challenge is pending until the
//! target accepts or declines it or the proposer withdraws it; every outcome
//! removes it from the pending set. Accepting spawns exactly one room.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ArenaError, ArenaResult, ConflictReason};
use crate::game::settings::MatchSettings;
use crate::network::presence::PresenceRegistry;
use crate::network::protocol::{ChallengeId, RoomId, ServerMessage};
use crate::room::{RoomRegistry, RoomSpec, SlotOccupant};

/// Options carried by a challenge, already validated and defaulted.
#[derive(Debug, Clone)]
pub struct ChallengeOptions {
    /// Points needed to win.
    pub target_score: u32,
    /// Resolve by score after this long in play.
    pub duration: Option<Duration>,
    /// Match settings.
    pub settings: MatchSettings,
}

#[derive(Debug, Clone)]
struct Challenge {
    id: ChallengeId,
    from: String,
    to: String,
    options: ChallengeOptions,
}

impl Challenge {
    fn incoming(&self) -> ServerMessage {
        ServerMessage::ChallengeIncoming {
            challenge_id: self.id,
            from: self.from.clone(),
            target_score: self.options.target_score,
            duration_secs: self.options.duration.map(|d| d.as_secs()),
            settings: self.options.settings,
        }
    }
}

/// Pending challenges.
pub struct ChallengeBroker {
    pending: RwLock<HashMap<ChallengeId, Challenge>>,
    rooms: Arc<RoomRegistry>,
}

impl ChallengeBroker {
    /// Create an empty broker.
    pub fn new(rooms: Arc<RoomRegistry>) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            rooms,
        }
    }

    fn presence(&self) -> &PresenceRegistry {
        &self.rooms.services().presence
    }

    /// Number of pending challenges.
    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }

    /// `challengeIncoming` events for every challenge still waiting on
    /// `username`, so a user who connects late can answer them.
    pub async fn pending_for(&self, username: &str) -> Vec<ServerMessage> {
        self.pending
            .read()
            .await
            .values()
            .filter(|c| c.to == username)
            .map(Challenge::incoming)
            .collect()
    }

    /// Challenge `to` on behalf of `from`.
    pub async fn propose(&self, from: &str, to: &str, options: ChallengeOptions) -> ArenaResult<ChallengeId> {
        if from == to {
            return Err(ArenaError::Conflict(ConflictReason::SelfChallenge));
        }
        let store = &self.rooms.services().store;
        for name in [from, to] {
            if let Err(e) = store.find_user_id_by_username(name).await {
                warn!(username = name, error = %e, "Challenge user lookup failed");
                return Err(ArenaError::not_found(format!("user {}", name)));
            }
        }

        let challenge = Challenge {
            id: Uuid::new_v4(),
            from: from.to_string(),
            to: to.to_string(),
            options,
        };
        let id = challenge.id;

        let presence = self.presence();
        presence
            .notify_user(
                to,
                ServerMessage::Notification {
                    kind: "challenge".into(),
                    message: format!("{} challenged you to a match", from),
                },
            )
            .await;
        presence.notify_user(to, challenge.incoming()).await;
        presence
            .notify_user(from, ServerMessage::ChallengeSent { challenge_id: id, to: to.to_string() })
            .await;

        info!(challenge_id = %id, from, to, "Challenge proposed");
        self.pending.write().await.insert(id, challenge);
        Ok(id)
    }

    /// Accept or decline a challenge addressed to `username`.
    ///
    /// Accepting returns the new room. If either user has no live
    /// connection the challenge is dropped with `PlayerOffline`.
    pub async fn respond(&self, challenge_id: ChallengeId, username: &str, accept: bool) -> ArenaResult<Option<RoomId>> {
        let challenge = {
            let mut pending = self.pending.write().await;
            let challenge = pending
                .get(&challenge_id)
                .ok_or_else(|| ArenaError::not_found("challenge"))?;
            if challenge.to != username {
                return Err(ArenaError::Unauthorized("challenge is addressed to another user".into()));
            }
            pending
                .remove(&challenge_id)
                .ok_or_else(|| ArenaError::not_found("challenge"))?
        };
        let presence = self.presence();

        if !accept {
            info!(challenge_id = %challenge_id, by = username, "Challenge declined");
            let declined = ServerMessage::ChallengeDeclined {
                challenge_id,
                by: username.to_string(),
            };
            presence.notify_user(&challenge.from, declined.clone()).await;
            presence.notify_user(&challenge.to, declined).await;
            return Ok(None);
        }

        let from_conn = presence.primary_connection(&challenge.from).await;
        let to_conn = presence.primary_connection(&challenge.to).await;
        let ((from_id, from_tx), (to_id, to_tx)) = match (from_conn, to_conn) {
            (Some(from), Some(to)) => (from, to),
            (from, _) => {
                let offline = if from.is_none() { &challenge.from } else { &challenge.to };
                info!(challenge_id = %challenge_id, offline = %offline, "Challenge dropped, player offline");
                let canceled = ServerMessage::ChallengeCanceled {
                    challenge_id,
                    reason: format!("{} is offline", offline),
                };
                presence.notify_user(&challenge.from, canceled.clone()).await;
                presence.notify_user(&challenge.to, canceled).await;
                return Err(ArenaError::PlayerOffline(offline.clone()));
            }
        };

        let mut spec = RoomSpec::new(
            [
                SlotOccupant::human(&challenge.from, from_id, from_tx),
                SlotOccupant::human(&challenge.to, to_id, to_tx),
            ],
            challenge.options.settings,
            challenge.options.target_score,
        );
        spec.deadline = challenge.options.duration;
        let handle = self.rooms.spawn(spec).await?;

        info!(challenge_id = %challenge_id, room_id = %handle.room_id, "Challenge accepted");
        let accepted = ServerMessage::ChallengeAccepted {
            challenge_id,
            room_id: handle.room_id,
        };
        presence.notify_user(&challenge.from, accepted.clone()).await;
        presence.notify_user(&challenge.to, accepted).await;
        Ok(Some(handle.room_id))
    }

    /// Withdraw a challenge. Only its proposer may.
    pub async fn cancel(&self, challenge_id: ChallengeId, username: &str) -> ArenaResult<()> {
        let challenge = {
            let mut pending = self.pending.write().await;
            let challenge = pending
                .get(&challenge_id)
                .ok_or_else(|| ArenaError::not_found("challenge"))?;
            if challenge.from != username {
                return Err(ArenaError::Unauthorized("only the proposer can cancel".into()));
            }
            pending
                .remove(&challenge_id)
                .ok_or_else(|| ArenaError::not_found("challenge"))?
        };

        info!(challenge_id = %challenge_id, from = username, "Challenge canceled");
        self.presence()
            .notify_user(
                &challenge.to,
                ServerMessage::ChallengeCanceled {
                    challenge_id,
                    reason: "withdrawn".into(),
                },
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArenaConfig;
    use crate::room::RoomServices;
    use crate::services::store::MemoryResultStore;
    use tokio::sync::mpsc::{self, Receiver};

    fn broker() -> ChallengeBroker {
        let rooms = Arc::new(RoomRegistry::new(RoomServices {
            presence: Arc::new(PresenceRegistry::new()),
            store: Arc::new(MemoryResultStore::with_users(["ada", "bob"])),
            config: Arc::new(ArenaConfig::default()),
        }));
        ChallengeBroker::new(rooms)
    }

    async fn online(broker: &ChallengeBroker, connection: u64, name: &str) -> Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(1024);
        broker.presence().register(connection, name, tx).await;
        rx
    }

    fn options() -> ChallengeOptions {
        ChallengeOptions {
            target_score: 3,
            duration: Some(Duration::from_secs(90)),
            settings: MatchSettings::default(),
        }
    }

    fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_propose_validation() {
        let broker = broker();
        assert_eq!(
            broker.propose("ada", "ada", options()).await,
            Err(ArenaError::Conflict(ConflictReason::SelfChallenge))
        );
        assert!(matches!(
            broker.propose("ada", "nobody", options()).await,
            Err(ArenaError::NotFound(_))
        ));
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_propose_notifies_both() {
        let broker = broker();
        let mut ada = online(&broker, 1, "ada").await;
        let mut bob = online(&broker, 2, "bob").await;
        drain(&mut ada);

        let id = broker.propose("ada", "bob", options()).await.unwrap();
        let to_bob = drain(&mut bob);
        assert!(to_bob.iter().any(|m| matches!(m, ServerMessage::Notification { .. })));
        assert!(to_bob.iter().any(|m| matches!(
            m,
            ServerMessage::ChallengeIncoming { challenge_id, from, duration_secs: Some(90), .. }
                if *challenge_id == id && from == "ada"
        )));
        assert!(drain(&mut ada)
            .iter()
            .any(|m| matches!(m, ServerMessage::ChallengeSent { challenge_id, .. } if *challenge_id == id)));
    }

    #[tokio::test]
    async fn test_pending_for_lists_only_addressed_challenges() {
        let broker = broker();
        let id = broker.propose("ada", "bob", options()).await.unwrap();

        let for_bob = broker.pending_for("bob").await;
        assert_eq!(for_bob.len(), 1);
        assert!(matches!(
            &for_bob[0],
            ServerMessage::ChallengeIncoming { challenge_id, from, target_score: 3, .. }
                if *challenge_id == id && from == "ada"
        ));
        assert!(broker.pending_for("ada").await.is_empty());

        broker.cancel(id, "ada").await.unwrap();
        assert!(broker.pending_for("bob").await.is_empty());
    }

    #[tokio::test]
    async fn test_decline_is_terminal() {
        let broker = broker();
        let mut ada = online(&broker, 1, "ada").await;
        let _bob = online(&broker, 2, "bob").await;
        let id = broker.propose("ada", "bob", options()).await.unwrap();

        assert!(matches!(broker.respond(id, "ada", false).await, Err(ArenaError::Unauthorized(_))));
        assert_eq!(broker.respond(id, "bob", false).await, Ok(None));
        assert!(drain(&mut ada)
            .iter()
            .any(|m| matches!(m, ServerMessage::ChallengeDeclined { by, .. } if by == "bob")));
        assert!(matches!(broker.respond(id, "bob", true).await, Err(ArenaError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_cancel_only_by_proposer() {
        let broker = broker();
        let _ada = online(&broker, 1, "ada").await;
        let mut bob = online(&broker, 2, "bob").await;
        let id = broker.propose("ada", "bob", options()).await.unwrap();

        assert!(matches!(broker.cancel(id, "bob").await, Err(ArenaError::Unauthorized(_))));
        broker.cancel(id, "ada").await.unwrap();
        assert!(drain(&mut bob)
            .iter()
            .any(|m| matches!(m, ServerMessage::ChallengeCanceled { .. })));
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_accept_with_offline_proposer() {
        let broker = broker();
        let mut bob = online(&broker, 2, "bob").await;
        let id = broker.propose("ada", "bob", options()).await.unwrap();

        assert_eq!(
            broker.respond(id, "bob", true).await,
            Err(ArenaError::PlayerOffline("ada".into()))
        );
        assert_eq!(broker.pending_count().await, 0);
        assert!(drain(&mut bob)
            .iter()
            .any(|m| matches!(m, ServerMessage::ChallengeCanceled { .. })));
        assert_eq!(broker.rooms.count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_spawns_one_room() {
        let broker = broker();
        let mut ada = online(&broker, 1, "ada").await;
        let mut bob = online(&broker, 2, "bob").await;
        let id = broker.propose("ada", "bob", options()).await.unwrap();

        let room_id = broker.respond(id, "bob", true).await.unwrap().unwrap();
        assert_eq!(broker.rooms.count().await, 1);
        assert_eq!(broker.rooms.room_for_player("ada").await.map(|r| r.room_id), Some(room_id));

        for rx in [&mut ada, &mut bob] {
            let seen = drain(rx);
            assert!(seen
                .iter()
                .any(|m| matches!(m, ServerMessage::ChallengeAccepted { room_id: r, .. } if *r == room_id)));
        }
    }
}

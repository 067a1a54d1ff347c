//! Result Store
//!
//! Persists finished match outcomes and resolves usernames to account ids.
//! The in-memory backend is the default; a database backend implements the
//! same trait.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// Account identifier.
pub type UserId = u64;

/// Store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No account with that username.
    #[error("user not found: {0}")]
    UserNotFound(String),
    /// Backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// One persisted result row pair, seen from the winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResultRow {
    /// Winning account.
    pub winner_id: UserId,
    /// Losing account.
    pub loser_id: UserId,
    /// Winner's points.
    pub winner_score: u32,
    /// Loser's points.
    pub loser_score: u32,
    /// When the result was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Result persistence and account lookup.
#[async_trait::async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist a win/loss pair.
    async fn record_match_result(
        &self,
        winner_id: UserId,
        loser_id: UserId,
        winner_score: u32,
        loser_score: u32,
    ) -> Result<(), StoreError>;

    /// Look up an account id.
    async fn find_user_id_by_username(&self, username: &str) -> Result<UserId, StoreError>;

    /// Has `blocker` blocked `blocked`? Not consulted by the match core.
    async fn is_blocked(&self, blocker: &str, blocked: &str) -> Result<bool, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<String, UserId>,
    next_id: UserId,
    results: Vec<MatchResultRow>,
    blocks: HashSet<(String, String)>,
}

/// In-memory result store.
#[derive(Default)]
pub struct MemoryResultStore {
    inner: RwLock<MemoryInner>,
    /// Create accounts on first lookup.
    open_registration: bool,
    /// Make every write fail.
    fail_writes: AtomicBool,
}

impl MemoryResultStore {
    /// Empty store; only registered users resolve.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that creates an account for any username on first lookup.
    pub fn with_open_registration() -> Self {
        Self {
            open_registration: true,
            ..Self::default()
        }
    }

    /// Store pre-populated with accounts.
    pub fn with_users<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut inner = MemoryInner::default();
        for name in names {
            inner.next_id += 1;
            inner.users.insert(name.to_string(), inner.next_id);
        }
        Self {
            inner: RwLock::new(inner),
            ..Self::default()
        }
    }

    /// Register an account, returning its id.
    pub async fn register_user(&self, username: &str) -> UserId {
        let mut inner = self.inner.write().await;
        if let Some(id) = inner.users.get(username) {
            return *id;
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.users.insert(username.to_string(), id);
        id
    }

    /// Record a block.
    pub async fn block(&self, blocker: &str, blocked: &str) {
        self.inner
            .write()
            .await
            .blocks
            .insert((blocker.to_string(), blocked.to_string()));
    }

    /// Every recorded result, oldest first.
    pub async fn results(&self) -> Vec<MatchResultRow> {
        self.inner.read().await.results.clone()
    }

    /// Toggle write failures.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ResultStore for MemoryResultStore {
    async fn record_match_result(
        &self,
        winner_id: UserId,
        loser_id: UserId,
        winner_score: u32,
        loser_score: u32,
    ) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".into()));
        }

        self.inner.write().await.results.push(MatchResultRow {
            winner_id,
            loser_id,
            winner_score,
            loser_score,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    async fn find_user_id_by_username(&self, username: &str) -> Result<UserId, StoreError> {
        if let Some(id) = self.inner.read().await.users.get(username) {
            return Ok(*id);
        }
        if self.open_registration {
            return Ok(self.register_user(username).await);
        }
        Err(StoreError::UserNotFound(username.to_string()))
    }

    async fn is_blocked(&self, blocker: &str, blocked: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .blocks
            .contains(&(blocker.to_string(), blocked.to_string())))
    }
}

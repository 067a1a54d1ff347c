//! Arena Errors
//!
//! Failures of lobby, challenge, room and tournament operations. Each one is
//! reported to the requesting connection as an `error` event; none of them
//! stop the server.

use thiserror::Error;

use crate::network::protocol::{ErrorCode, ServerError, ServerMessage};

/// Why a request conflicts with current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The user is already a member.
    AlreadyMember,
    /// No free slot left.
    Full,
    /// Password missing or wrong.
    WrongPassword,
    /// The tournament has already started.
    AlreadyRunning,
    /// A user cannot challenge themselves.
    SelfChallenge,
    /// The user is already seated in an active match.
    AlreadyPlaying,
    /// Not enough participants to start.
    NotEnoughPlayers,
}

impl ConflictReason {
    /// Short machine-readable description.
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictReason::AlreadyMember => "already a member",
            ConflictReason::Full => "full",
            ConflictReason::WrongPassword => "wrong password",
            ConflictReason::AlreadyRunning => "already running",
            ConflictReason::SelfChallenge => "cannot challenge yourself",
            ConflictReason::AlreadyPlaying => "already playing",
            ConflictReason::NotEnoughPlayers => "not enough players",
        }
    }
}

impl std::fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arena operation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// The lobby, challenge, room, tournament or user does not exist.
    #[error("{0} not found")]
    NotFound(String),
    /// The caller may not perform this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The operation conflicts with current state.
    #[error("conflict: {0}")]
    Conflict(ConflictReason),
    /// A required user has no live connection.
    #[error("player offline: {0}")]
    PlayerOffline(String),
    /// The connection's token names no account.
    #[error("account missing")]
    AccountMissing,
    /// The connection has not identified yet.
    #[error("not authenticated")]
    NotAuthenticated,
    /// The request is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ArenaError {
    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ArenaError::NotFound(_) => ErrorCode::NotFound,
            ArenaError::Unauthorized(_) => ErrorCode::Unauthorized,
            ArenaError::Conflict(_) => ErrorCode::Conflict,
            ArenaError::PlayerOffline(_) => ErrorCode::PlayerOffline,
            ArenaError::AccountMissing => ErrorCode::AccountMissing,
            ArenaError::NotAuthenticated => ErrorCode::NotAuthenticated,
            ArenaError::InvalidInput(_) => ErrorCode::InvalidInput,
        }
    }

    /// Does this error end the connection?
    pub fn is_fatal(&self) -> bool {
        matches!(self, ArenaError::AccountMissing)
    }

    /// Build the `error` event for the requesting connection.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error(ServerError {
            code: self.code(),
            message: self.to_string(),
        })
    }

    /// Shorthand for a `NotFound` naming the missing entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        ArenaError::NotFound(what.into())
    }
}

/// Result alias for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;

//! Typed error taxonomy shared across the service core.
//!
//! Domain rejections are ordinary values returned to the caller with a
//! human-readable reason; only infrastructure faults (snapshot or rating
//! store I/O) travel through [`StorageError`].

use thiserror::Error;

use crate::rules::RuleError;

/// Rejections produced by game session operations.
///
/// Every variant leaves the game state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("game not found")]
    GameNotFound,
    #[error("unsupported board size {0}: expected 9, 13 or 19")]
    BadBoardSize(usize),
    #[error("invalid session credential")]
    InvalidSession,
    #[error("player is not part of this game")]
    NotAPlayer,
    #[error("not your turn")]
    NotYourTurn,
    #[error("game is not open for joining")]
    NotJoinable,
    #[error("player is already part of this game")]
    AlreadyJoined,
    #[error("game has not started yet")]
    NotStarted,
    #[error("game is already over")]
    GameFinished,
    #[error("chat message is empty")]
    EmptyChatMessage,
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error("game session coordinator is not running")]
    CoordinatorClosed,
}

/// Rejections produced by matchmaking operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchmakingError {
    #[error("player is already in the matchmaking queue")]
    AlreadyQueued,
    #[error("player already has a pending match offer")]
    OfferPending,
    #[error("player is not in the matchmaking queue")]
    NotQueued,
    #[error("match offer not found or no longer open")]
    OfferNotFound,
    #[error("player is not part of this match offer")]
    NotInOffer,
    #[error("player is not eligible for ranked play")]
    NotEligible,
    #[error("failed to start the ranked game: {0}")]
    GameCreation(String),
    #[error("matchmaking coordinator is not running")]
    CoordinatorClosed,
}

/// Infrastructure faults from the persistence seams.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}

//! Goban - Server Core for a Real-Time Go Service
//!
//! This crate hosts the authoritative game logic behind a two-player Go
//! service: the pure rules engine (captures, ko, suicide, scoring), a
//! heuristic computer opponent, the game session coordinator that owns all
//! in-flight games, the matchmaking coordinator that pairs rating-seeking
//! players, and the ELO rating calculator.
//!
//! Transport, identity resolution, and rendering live outside this crate;
//! callers drive the coordinators through their handles and poll for state.

pub mod ai;
pub mod config;
pub mod constants;
pub mod error;
pub mod matchmaking;
pub mod rating;
pub mod rules;
pub mod session;
pub mod store;

pub use config::ServiceConfig;
pub use error::{GameError, MatchmakingError, StorageError};
pub use rules::{Board, GoMove, RuleError, Stone};

//! Rating records persisted per player, plus ranked game history rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::INITIAL_RATING;
use crate::rules::Stone;

/// How a ranked game ended from one player's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameOutcome {
    Win,
    Draw,
    Loss,
}

impl GameOutcome {
    /// Actual score for the ELO formula.
    pub fn actual(self) -> f64 {
        match self {
            GameOutcome::Win => 1.0,
            GameOutcome::Draw => 0.5,
            GameOutcome::Loss => 0.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            GameOutcome::Win => GameOutcome::Loss,
            GameOutcome::Draw => GameOutcome::Draw,
            GameOutcome::Loss => GameOutcome::Win,
        }
    }
}

/// A player's persisted rating row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRating {
    pub user_id: String,
    pub rating: i32,
    pub wins: u32,
    pub losses: u32,
    /// Highest rating ever held.
    pub peak: i32,
    /// Consecutive wins right now; resets on anything but a win.
    pub streak: u32,
    pub best_streak: u32,
    pub total_games: u32,
    pub last_game_at: Option<DateTime<Utc>>,
}

impl PlayerRating {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            rating: INITIAL_RATING,
            wins: 0,
            losses: 0,
            peak: INITIAL_RATING,
            streak: 0,
            best_streak: 0,
            total_games: 0,
            last_game_at: None,
        }
    }
}

/// One row of ranked game history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedGameRecord {
    pub game_id: Uuid,
    pub match_id: Uuid,
    pub black_user: String,
    pub white_user: String,
    pub black_pre: i32,
    pub white_pre: i32,
    pub black_post: i32,
    pub white_post: i32,
    /// `None` records a drawn game.
    pub winner: Option<Stone>,
    pub finished_at: DateTime<Utc>,
}

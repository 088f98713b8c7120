//! ELO update math.
//!
//! Both players' new ratings are computed from each other's pre-game
//! ratings, so the two updates are order-independent; the session
//! coordinator captures both pre values before applying either side.

use chrono::{DateTime, Utc};

use super::types::{GameOutcome, PlayerRating};
use crate::constants::ELO_K;

/// Expected score of a player against an opponent:
/// `1 / (1 + 10^((opponent - rating) / 400))`.
pub fn expected_score(rating: i32, opponent: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) as f64 / 400.0))
}

/// New rating after one game, K=32, rounded to the nearest point.
pub fn updated_rating(rating: i32, opponent: i32, outcome: GameOutcome) -> i32 {
    let expected = expected_score(rating, opponent);
    rating + (ELO_K * (outcome.actual() - expected)).round() as i32
}

/// Fold one ranked result into a player's persisted row. `opponent_pre`
/// must be the opponent's rating as it was before the game.
pub fn apply_outcome(
    row: &mut PlayerRating,
    opponent_pre: i32,
    outcome: GameOutcome,
    finished_at: DateTime<Utc>,
) {
    row.rating = updated_rating(row.rating, opponent_pre, outcome);
    match outcome {
        GameOutcome::Win => {
            row.wins += 1;
            row.streak += 1;
            row.best_streak = row.best_streak.max(row.streak);
        }
        GameOutcome::Loss => {
            row.losses += 1;
            row.streak = 0;
        }
        GameOutcome::Draw => {
            row.streak = 0;
        }
    }
    row.peak = row.peak.max(row.rating);
    row.total_games += 1;
    row.last_game_at = Some(finished_at);
}

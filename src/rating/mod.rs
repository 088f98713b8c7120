//! ELO rating math and ranked bookkeeping.

pub mod logic;
pub mod types;

pub use logic::{apply_outcome, expected_score, updated_rating};
pub use types::{GameOutcome, PlayerRating, RankedGameRecord};

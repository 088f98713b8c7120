//! Heuristic computer opponent.

pub mod heuristics;

pub use heuristics::{choose_move, rank_moves, ScoredMove};

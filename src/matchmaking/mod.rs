//! Matchmaking: the rating-gated queue, timed match offers, and the
//! bridge into ranked game creation.

pub mod coordinator;
pub mod types;

pub use coordinator::MatchmakingHandle;
pub use types::{
    AcceptOutcome, JoinOutcome, MatchOffer, MatchOfferView, MatchmakingStatus, QueueEntry,
};

//! Queue and offer data structures plus the payloads matchmaking reports
//! back to polling clients.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{MatchId, RankedGameCreated};

/// A player waiting in the open queue.
///
/// An entry lives in exactly one place at a time: the open queue or a
/// pending [`MatchOffer`]. Its search range only ever widens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: String,
    pub display_name: String,
    pub rating: i32,
    pub joined_at: DateTime<Utc>,
    /// Half-width of the acceptable rating gap. Starts at the configured
    /// initial range and grows on a timer up to the cap.
    pub range: i32,
    /// Queue-episode counter used to invalidate timers scheduled for an
    /// earlier stint in the queue.
    pub epoch: u64,
}

impl QueueEntry {
    /// Two entries can be offered a match only when the rating gap fits
    /// within **both** players' current ranges.
    pub fn compatible_with(&self, other: &QueueEntry) -> bool {
        let gap = (self.rating - other.rating).abs();
        gap <= self.range && gap <= other.range
    }

    pub fn rating_gap(&self, other: &QueueEntry) -> i32 {
        (self.rating - other.rating).abs()
    }
}

/// A time-boxed offer between two players pulled out of the open queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOffer {
    pub id: MatchId,
    pub entries: [QueueEntry; 2],
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// User ids that have accepted so far.
    pub accepted: HashSet<String>,
}

impl MatchOffer {
    pub fn involves(&self, user_id: &str) -> bool {
        self.entries.iter().any(|e| e.user_id == user_id)
    }

    pub fn opponent_of(&self, user_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.user_id != user_id)
    }

    pub fn both_accepted(&self) -> bool {
        self.accepted.len() == 2
    }

    /// The offer as one participant sees it.
    pub fn view_for(&self, user_id: &str) -> MatchOfferView {
        let opponent = self.opponent_of(user_id);
        MatchOfferView {
            match_id: self.id,
            opponent_name: opponent.map(|e| e.display_name.clone()).unwrap_or_default(),
            opponent_rating: opponent.map(|e| e.rating).unwrap_or_default(),
            expires_at: self.expires_at,
            accepted_by_you: self.accepted.contains(user_id),
        }
    }
}

/// A pending offer from one participant's perspective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOfferView {
    pub match_id: MatchId,
    pub opponent_name: String,
    pub opponent_rating: i32,
    pub expires_at: DateTime<Utc>,
    pub accepted_by_you: bool,
}

/// What `status` reports for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchmakingStatus {
    /// Still waiting in the open queue.
    Queued {
        /// Join-order rank, 1-based.
        position: usize,
        queue_size: usize,
        waited_secs: i64,
        range: i32,
    },
    /// A match offer is pending for this user.
    Offered(MatchOfferView),
    /// The match completed while the user was away; consumed on read.
    Ready(RankedGameCreated),
}

/// Result of a join call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Queued {
        position: usize,
        queue_size: usize,
        range: i32,
    },
    /// An opponent was available immediately.
    Offered(MatchOfferView),
}

/// Result of an accept call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Recorded; the other participant has not accepted yet.
    WaitingForOpponent,
    /// Both sides accepted; the ranked game is live.
    Ready(RankedGameCreated),
}

/// Everything the coordinator persists for restart recovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchmakingSnapshot {
    pub queue: Vec<QueueEntry>,
    pub offers: Vec<MatchOffer>,
    pub ready: Vec<(String, RankedGameCreated)>,
}

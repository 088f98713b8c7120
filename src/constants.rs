//! Game balance and service tuning constants.

/// Board sizes the service accepts.
pub const BOARD_SIZES: [usize; 3] = [9, 13, 19];

/// Default board size for casual games.
pub const DEFAULT_BOARD_SIZE: usize = 9;

/// Board size used for ranked games.
pub const RANKED_BOARD_SIZE: usize = 19;

/// Compensation points awarded to White for moving second (area scoring).
pub const DEFAULT_KOMI: f64 = 7.5;

/// ELO K-factor for ranked rating updates.
pub const ELO_K: f64 = 32.0;

/// Rating assigned to players with no ranked history.
pub const INITIAL_RATING: i32 = 1200;

/// Starting half-width of the matchmaking search window (rating points).
pub const INITIAL_SEARCH_RANGE: i32 = 100;

/// How much the search window widens per expansion step.
pub const SEARCH_RANGE_STEP: i32 = 50;

/// Hard cap on the search window half-width.
pub const MAX_SEARCH_RANGE: i32 = 300;

/// Seconds between search-range expansions for a queued player.
pub const RANGE_EXPAND_INTERVAL_SECS: u64 = 30;

/// Seconds a match offer stays open before it expires.
pub const OFFER_TTL_SECS: u64 = 30;

/// Seconds an unmatched player may sit in the queue before eviction.
pub const QUEUE_EVICTION_SECS: u64 = 300;

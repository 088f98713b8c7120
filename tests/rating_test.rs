//! ELO rating scenarios checked end to end against known values.

use chrono::Utc;

use goban::rating::{apply_outcome, expected_score, updated_rating, GameOutcome, PlayerRating};

#[test]
fn test_underdog_upset_scenario() {
    // A at 1200 beats B at 1400: expectation ~0.24, both move 24 points.
    let expected = expected_score(1200, 1400);
    assert!((expected - 0.24).abs() < 0.01);

    assert_eq!(updated_rating(1200, 1400, GameOutcome::Win), 1224);
    assert_eq!(updated_rating(1400, 1200, GameOutcome::Loss), 1376);
}

#[test]
fn test_zero_sum_at_equal_ratings() {
    let winner = updated_rating(1200, 1200, GameOutcome::Win);
    let loser = updated_rating(1200, 1200, GameOutcome::Loss);
    assert_eq!(winner - 1200, 1200 - loser);
}

#[test]
fn test_updates_are_order_independent() {
    // Both sides are computed from the same pre-game pair, so applying
    // them in either order gives the same totals.
    let (a_pre, b_pre) = (1312, 1187);
    let a_new = updated_rating(a_pre, b_pre, GameOutcome::Loss);
    let b_new = updated_rating(b_pre, a_pre, GameOutcome::Win);
    assert_eq!(a_new + b_new, a_pre + b_pre);
}

#[test]
fn test_favorite_gains_little_from_expected_win() {
    let new = updated_rating(1400, 1200, GameOutcome::Win);
    assert_eq!(new, 1408);
}

#[test]
fn test_draw_splits_the_difference() {
    let low = updated_rating(1200, 1400, GameOutcome::Draw);
    let high = updated_rating(1400, 1200, GameOutcome::Draw);
    assert_eq!(low, 1208);
    assert_eq!(high, 1392);
}

#[test]
fn test_full_bookkeeping_over_a_losing_streak() {
    let mut row = PlayerRating::new("streaky");
    let now = Utc::now();

    apply_outcome(&mut row, 1200, GameOutcome::Win, now);
    apply_outcome(&mut row, 1200, GameOutcome::Win, now);
    apply_outcome(&mut row, 1200, GameOutcome::Win, now);
    let peak = row.rating;
    assert_eq!(row.streak, 3);
    assert_eq!(row.best_streak, 3);
    assert_eq!(row.peak, peak);

    apply_outcome(&mut row, 1200, GameOutcome::Loss, now);
    apply_outcome(&mut row, 1200, GameOutcome::Loss, now);
    assert_eq!(row.streak, 0);
    assert_eq!(row.best_streak, 3);
    assert_eq!(row.peak, peak);
    assert_eq!(row.wins, 3);
    assert_eq!(row.losses, 2);
    assert_eq!(row.total_games, 5);
    assert_eq!(row.last_game_at, Some(now));
}

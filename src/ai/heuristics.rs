//! Single-ply heuristic move selection for the computer opponent.
//!
//! Every legal candidate (occupied, ko and suicide filtered through the
//! rules engine) is scored in isolation and the best one is played. There
//! is deliberately no search tree: one ply bounds the engine's strength and
//! keeps its choices cheap and reproducible. Scoring priority, highest
//! first: stones captured, rescuing an own group in atari, putting an
//! opponent group in atari, avoiding self-atari, then a small positional
//! tiebreak. Candidates are ordered by (score, row, col) so equal positions
//! always produce the same move.

use std::collections::HashSet;

use crate::rules::logic::{count_liberties, find_group, try_place};
use crate::rules::types::{Board, GoMove, Stone};

const CAPTURE_BASE: f64 = 50.0;
const CAPTURE_PER_STONE: f64 = 10.0;
const RESCUE_BASE: f64 = 40.0;
const RESCUE_PER_STONE: f64 = 8.0;
const ATARI_THREAT: f64 = 15.0;
const SELF_ATARI_PENALTY: f64 = -25.0;

/// A legal candidate move and its heuristic score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredMove {
    pub row: usize,
    pub col: usize,
    pub score: f64,
}

/// Score every legal placement for `stone`, best first.
///
/// `ko_guard` is the board position the simple-ko rule forbids recreating,
/// exactly as the rules engine expects it. Pure over its inputs so it can
/// be exercised without a coordinator.
pub fn rank_moves(board: &Board, stone: Stone, ko_guard: Option<&Board>) -> Vec<ScoredMove> {
    let mut scored: Vec<ScoredMove> = Vec::new();

    for (row, col) in board.points() {
        let Ok(placement) = try_place(board, row, col, stone, ko_guard) else {
            continue;
        };

        let mut score = placement.captured as f64 * CAPTURE_PER_STONE;
        if placement.captured > 0 {
            score += CAPTURE_BASE;
        }
        score += rescue_score(board, &placement.board, row, col, stone);
        score += atari_threat_score(&placement.board, row, col, stone);
        score += self_atari_score(&placement.board, row, col);
        score += position_value(board, row, col);

        scored.push(ScoredMove { row, col, score });
    }

    // Stable order: score descending, then row/col ascending. This is what
    // makes the opponent deterministic for a given position.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.row.cmp(&b.row))
            .then(a.col.cmp(&b.col))
    });
    scored
}

/// Pick the move to play: the top-ranked placement, or pass when no legal
/// placement exists.
pub fn choose_move(board: &Board, stone: Stone, ko_guard: Option<&Board>) -> GoMove {
    match rank_moves(board, stone, ko_guard).first() {
        Some(best) => GoMove::Place(best.row, best.col),
        None => GoMove::Pass,
    }
}

/// Bonus for saving an adjacent friendly group that was down to its last
/// liberty, judged on the post-placement board so captures are accounted.
fn rescue_score(before: &Board, after: &Board, row: usize, col: usize, stone: Stone) -> f64 {
    let mut score = 0.0;
    let mut seen: HashSet<(usize, usize)> = HashSet::new();

    for (nr, nc) in before.neighbors(row, col) {
        if before.get(nr, nc) != Some(stone) || seen.contains(&(nr, nc)) {
            continue;
        }
        let group_before = find_group(before, nr, nc);
        seen.extend(group_before.iter().copied());
        if count_liberties(before, &group_before) != 1 {
            continue;
        }
        // The group was in atari; did joining it actually help?
        let group_after = find_group(after, nr, nc);
        if count_liberties(after, &group_after) > 1 {
            score += RESCUE_BASE + group_before.len() as f64 * RESCUE_PER_STONE;
        }
    }
    score
}

/// Bonus for each opponent group this placement reduces to one liberty.
fn atari_threat_score(after: &Board, row: usize, col: usize, stone: Stone) -> f64 {
    let opponent = stone.opponent();
    let mut score = 0.0;
    let mut seen: HashSet<(usize, usize)> = HashSet::new();

    for (nr, nc) in after.neighbors(row, col) {
        if after.get(nr, nc) != Some(opponent) || seen.contains(&(nr, nc)) {
            continue;
        }
        let group = find_group(after, nr, nc);
        seen.extend(group.iter().copied());
        if count_liberties(after, &group) == 1 {
            score += ATARI_THREAT;
        }
    }
    score
}

/// Penalty when the placement leaves the mover's own group at one liberty.
fn self_atari_score(after: &Board, row: usize, col: usize) -> f64 {
    let group = find_group(after, row, col);
    if count_liberties(after, &group) == 1 {
        SELF_ATARI_PENALTY
    } else {
        0.0
    }
}

/// Small positional tiebreak: star points and the third/fourth line are
/// preferred early, fading once the board fills up.
fn position_value(board: &Board, row: usize, col: usize) -> f64 {
    let size = board.size();
    if board.stone_count() >= size * size / 4 {
        return 0.0;
    }

    if is_star_point(size, row, col) {
        return 3.0;
    }
    let from_edge = |x: usize| x.min(size - 1 - x);
    let line = from_edge(row).min(from_edge(col));
    match line {
        2 | 3 => 2.0,
        1 => 1.0,
        _ => 0.5,
    }
}

/// Star points for the supported board sizes: the 3-3 lines on 9x9 and the
/// 4-4 lines on 13x13 and 19x19, plus the midpoints.
fn is_star_point(size: usize, row: usize, col: usize) -> bool {
    let edge = if size >= 13 { 3 } else { 2 };
    let lines = [edge, size / 2, size - 1 - edge];
    lines.contains(&row) && lines.contains(&col)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place_all(board: &mut Board, points: &[(usize, usize)], stone: Stone) {
        for &(r, c) in points {
            board.set(r, c, Some(stone));
        }
    }

    #[test]
    fn test_capture_outranks_everything() {
        let mut board = Board::new(9);
        // Black (4,4) is in atari with its last liberty at (4,5).
        board.set(4, 4, Some(Stone::Black));
        place_all(&mut board, &[(3, 4), (5, 4), (4, 3)], Stone::White);

        let mv = choose_move(&board, Stone::White, None);
        assert_eq!(mv, GoMove::Place(4, 5));
    }

    #[test]
    fn test_rescue_own_atari_group() {
        let mut board = Board::new(9);
        // White (4,4) in atari, escape at (4,5).
        board.set(4, 4, Some(Stone::White));
        place_all(&mut board, &[(3, 4), (5, 4), (4, 3)], Stone::Black);

        let ranked = rank_moves(&board, Stone::White, None);
        assert_eq!((ranked[0].row, ranked[0].col), (4, 5));
    }

    #[test]
    fn test_suicide_and_occupied_filtered() {
        let mut board = Board::new(9);
        place_all(&mut board, &[(0, 1), (1, 0)], Stone::White);
        board.set(5, 5, Some(Stone::Black));

        let ranked = rank_moves(&board, Stone::Black, None);
        assert!(ranked.iter().all(|m| (m.row, m.col) != (0, 0)));
        assert!(ranked.iter().all(|m| (m.row, m.col) != (5, 5)));
    }

    #[test]
    fn test_ko_guard_respected() {
        let mut board = Board::new(9);
        place_all(&mut board, &[(1, 2), (2, 1), (3, 2)], Stone::Black);
        place_all(&mut board, &[(1, 3), (2, 4), (3, 3)], Stone::White);
        board.set(2, 3, Some(Stone::Black));
        // The board before Black's capture: White still sitting at (2,2).
        let mut guard = board.clone();
        guard.set(2, 3, None);
        guard.set(2, 2, Some(Stone::White));

        let ranked = rank_moves(&board, Stone::White, Some(&guard));
        assert!(ranked.iter().all(|m| (m.row, m.col) != (2, 2)));
    }

    #[test]
    fn test_no_legal_moves_passes() {
        // Black owns the whole board with two eyes; both remaining points
        // are suicide for White.
        let mut board = Board::new(9);
        for (row, col) in Board::new(9).points() {
            if (row, col) != (0, 0) && (row, col) != (8, 8) {
                board.set(row, col, Some(Stone::Black));
            }
        }
        assert_eq!(choose_move(&board, Stone::White, None), GoMove::Pass);
    }

    #[test]
    fn test_deterministic_choice() {
        let mut board = Board::new(9);
        place_all(&mut board, &[(2, 2), (6, 6)], Stone::Black);
        board.set(6, 2, Some(Stone::White));

        let first = choose_move(&board, Stone::White, None);
        for _ in 0..5 {
            assert_eq!(choose_move(&board, Stone::White, None), first);
        }
    }

    #[test]
    fn test_star_points_per_size() {
        assert!(is_star_point(9, 2, 2));
        assert!(is_star_point(9, 4, 4));
        assert!(!is_star_point(9, 3, 3));
        assert!(is_star_point(19, 3, 3));
        assert!(is_star_point(19, 9, 9));
        assert!(is_star_point(19, 15, 3));
        assert!(!is_star_point(19, 2, 2));
    }

    #[test]
    fn test_avoids_self_atari_when_alternative_exists() {
        let mut board = Board::new(9);
        // Connecting at (0,1) would leave the corner string a single
        // liberty; plenty of safe points exist, so the AI should not pick it.
        place_all(&mut board, &[(0, 2), (1, 1)], Stone::White);
        board.set(0, 0, Some(Stone::Black));

        let mv = choose_move(&board, Stone::Black, None);
        assert_ne!(mv, GoMove::Place(0, 1));
    }
}

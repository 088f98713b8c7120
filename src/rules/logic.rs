//! Move legality and execution: groups, liberties, captures, ko, suicide.

use std::collections::HashSet;

use super::types::{Board, GoMove, Position, RuleError, Stone};

/// All stones in the same group as the stone at (row, col), found by
/// orthogonal flood fill. Returns an empty set for an empty point.
pub fn find_group(board: &Board, row: usize, col: usize) -> HashSet<(usize, usize)> {
    let mut group = HashSet::new();
    let Some(stone) = board.get(row, col) else {
        return group;
    };

    let mut stack = vec![(row, col)];
    while let Some((r, c)) = stack.pop() {
        if !group.insert((r, c)) {
            continue;
        }
        for (nr, nc) in board.neighbors(r, c) {
            if board.get(nr, nc) == Some(stone) {
                stack.push((nr, nc));
            }
        }
    }
    group
}

/// Number of distinct empty points orthogonally adjacent to the group.
pub fn count_liberties(board: &Board, group: &HashSet<(usize, usize)>) -> usize {
    let mut liberties = HashSet::new();
    for &(row, col) in group {
        for (nr, nc) in board.neighbors(row, col) {
            if board.is_empty_at(nr, nc) {
                liberties.insert((nr, nc));
            }
        }
    }
    liberties.len()
}

/// Liberties of the group containing (row, col); 0 for an empty point.
pub fn liberties_at(board: &Board, row: usize, col: usize) -> usize {
    let group = find_group(board, row, col);
    count_liberties(board, &group)
}

/// The board produced by a legal placement, plus how many stones it took.
#[derive(Debug, Clone)]
pub struct Placement {
    pub board: Board,
    pub captured: u32,
}

/// Resolve a stone placement without touching the input board.
///
/// Ordering matters: adjacent opposing groups with no liberties are removed
/// first, and only then is the placed stone's own group checked for suicide,
/// so a capture can legalize an otherwise-suicidal move. `ko_guard` is the
/// position immediately preceding the opponent's last move; reproducing it
/// exactly is the simple-ko violation.
pub fn try_place(
    board: &Board,
    row: usize,
    col: usize,
    stone: Stone,
    ko_guard: Option<&Board>,
) -> Result<Placement, RuleError> {
    if !board.in_bounds(row, col) {
        return Err(RuleError::OutOfBounds(row, col));
    }
    if board.get(row, col).is_some() {
        return Err(RuleError::Occupied(row, col));
    }

    let mut next = board.clone();
    next.set(row, col, Some(stone));

    let opponent = stone.opponent();
    let mut captured = 0u32;
    for (nr, nc) in next.neighbors(row, col) {
        if next.get(nr, nc) != Some(opponent) {
            continue;
        }
        let group = find_group(&next, nr, nc);
        if count_liberties(&next, &group) == 0 {
            captured += group.len() as u32;
            for (r, c) in group {
                next.set(r, c, None);
            }
        }
    }

    if liberties_at(&next, row, col) == 0 {
        return Err(RuleError::Suicide);
    }

    if let Some(guard) = ko_guard {
        if next == *guard {
            return Err(RuleError::Ko);
        }
    }

    Ok(Placement {
        board: next,
        captured,
    })
}

/// Outcome of a committed move.
#[derive(Debug, Clone, Copy)]
pub struct MoveReport {
    pub captured: u32,
}

/// Play a stone for the player to move, committing the result: the prior
/// board is snapshotted into history, captures are credited, the turn flips.
/// On rejection the position is untouched.
pub fn apply_move(pos: &mut Position, row: usize, col: usize) -> Result<MoveReport, RuleError> {
    let stone = pos.to_move;
    let placement = try_place(&pos.board, row, col, stone, pos.history.last())?;

    let prior = std::mem::replace(&mut pos.board, placement.board);
    pos.history.push(prior);
    match stone {
        Stone::Black => pos.captures_black += placement.captured,
        Stone::White => pos.captures_white += placement.captured,
    }
    pos.to_move = stone.opponent();
    pos.turn += 1;
    pos.last_action = Some(GoMove::Place(row, col));

    Ok(MoveReport {
        captured: placement.captured,
    })
}

/// Pass for the player to move. Returns `true` when this is the second
/// consecutive pass, which ends the game; the caller runs scoring.
pub fn apply_pass(pos: &mut Position) -> bool {
    let terminal = matches!(pos.last_action, Some(GoMove::Pass));

    pos.history.push(pos.board.clone());
    pos.to_move = pos.to_move.opponent();
    pos.turn += 1;
    pos.last_action = Some(GoMove::Pass);

    terminal
}

//! End-of-game area scoring.
//!
//! Empty regions are flood filled; a region whose bordering stones are all
//! one color is that color's territory, while a region touching both colors
//! is dame and counts for neither. Final score is territory plus living
//! stones, with komi added to White. Runs once per game, when the second
//! consecutive pass arrives.

use serde::{Deserialize, Serialize};

use super::types::{Board, Stone};

/// Who an empty point ended up belonging to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerritoryOwner {
    Black,
    White,
    Dame,
}

/// Per-point territory classification; occupied points carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryMap {
    size: usize,
    cells: Vec<Option<TerritoryOwner>>,
}

impl TerritoryMap {
    fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<TerritoryOwner> {
        self.cells[row * self.size + col]
    }

    fn set(&mut self, row: usize, col: usize, owner: TerritoryOwner) {
        self.cells[row * self.size + col] = Some(owner);
    }

    pub fn count(&self, owner: TerritoryOwner) -> usize {
        self.cells.iter().filter(|c| **c == Some(owner)).count()
    }
}

/// Final scores under area counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub black: f64,
    pub white: f64,
    pub territory: TerritoryMap,
}

impl ScoreResult {
    /// Winner by points; `None` on a dead-equal score, which cannot happen
    /// with a fractional komi.
    pub fn winner(&self) -> Option<Stone> {
        if self.black > self.white {
            Some(Stone::Black)
        } else if self.white > self.black {
            Some(Stone::White)
        } else {
            None
        }
    }
}

/// Score a finished board.
pub fn score_game(board: &Board, komi: f64) -> ScoreResult {
    let size = board.size();
    let mut territory = TerritoryMap::new(size);
    let mut visited = vec![false; size * size];
    let mut black_territory = 0usize;
    let mut white_territory = 0usize;

    for (row, col) in board.points() {
        if visited[row * size + col] || board.get(row, col).is_some() {
            continue;
        }

        // Flood fill one empty region, collecting which colors border it.
        let mut region = Vec::new();
        let mut borders_black = false;
        let mut borders_white = false;
        let mut stack = vec![(row, col)];
        visited[row * size + col] = true;
        while let Some((r, c)) = stack.pop() {
            region.push((r, c));
            for (nr, nc) in board.neighbors(r, c) {
                match board.get(nr, nc) {
                    Some(Stone::Black) => borders_black = true,
                    Some(Stone::White) => borders_white = true,
                    None => {
                        if !visited[nr * size + nc] {
                            visited[nr * size + nc] = true;
                            stack.push((nr, nc));
                        }
                    }
                }
            }
        }

        let owner = match (borders_black, borders_white) {
            (true, false) => TerritoryOwner::Black,
            (false, true) => TerritoryOwner::White,
            // Mixed borders, or a region touching no stones at all.
            _ => TerritoryOwner::Dame,
        };
        match owner {
            TerritoryOwner::Black => black_territory += region.len(),
            TerritoryOwner::White => white_territory += region.len(),
            TerritoryOwner::Dame => {}
        }
        for (r, c) in region {
            territory.set(r, c, owner);
        }
    }

    ScoreResult {
        black: black_territory as f64 + board.count_of(Stone::Black) as f64,
        white: white_territory as f64 + board.count_of(Stone::White) as f64 + komi,
        territory,
    }
}

//! Square grid of marks with placement and win-line detection.
//!
//! This module contains:
//! - `Mark`, the content of a single cell
//! - `Grid`, a row-major NxN matrix with a configurable win length

use crate::game::GameError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest accepted board size and win length
pub const MIN_SIZE: usize = 3;

/// Largest accepted board size. Bounds the cell allocation of a single grid
/// regardless of what a transport layer enforces.
pub const MAX_SIZE: usize = 1024;

/// The four line orientations through a cell: horizontal, vertical,
/// diagonal and anti-diagonal.
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Content of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mark {
    #[default]
    Empty,
    X,
    O,
}

impl Mark {
    /// The mark of the other player. Empty has no opponent.
    pub fn opponent(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
            Mark::Empty => Mark::Empty,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Mark::Empty
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mark::Empty => " ",
            Mark::X => "X",
            Mark::O => "O",
        };
        f.write_str(s)
    }
}

/// A square board of marks.
///
/// Cells are stored row-major. Once a cell holds X or O it is never
/// overwritten: `set` on an occupied cell fails with `CellOccupied`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    size: usize,
    win_length: usize,
    cells: Vec<Mark>,
}

impl Grid {
    /// Create an empty grid.
    ///
    /// Fails with `InvalidBoardSize` when `size` is outside
    /// `[MIN_SIZE, MAX_SIZE]` and with `InvalidWinLength` when `win_length`
    /// is outside `[3, size]`.
    pub fn new(size: usize, win_length: usize) -> Result<Self, GameError> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
            return Err(GameError::InvalidBoardSize);
        }
        if win_length < MIN_SIZE || win_length > size {
            return Err(GameError::InvalidWinLength);
        }
        let area = size.checked_mul(size).ok_or(GameError::InvalidBoardSize)?;

        Ok(Self {
            size,
            win_length,
            cells: vec![Mark::Empty; area],
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn win_length(&self) -> usize {
        self.win_length
    }

    /// All cells, row-major
    pub fn cells(&self) -> &[Mark] {
        &self.cells
    }

    /// Iterate over the rows of the grid, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[Mark]> {
        self.cells.chunks(self.size)
    }

    /// Mark at `(row, col)`
    pub fn get(&self, row: usize, col: usize) -> Result<Mark, GameError> {
        self.index(row, col)
            .map(|idx| self.cells[idx])
            .ok_or(GameError::InvalidPosition)
    }

    /// Place `mark` at `(row, col)`
    pub fn set(&mut self, row: usize, col: usize, mark: Mark) -> Result<(), GameError> {
        let idx = self.index(row, col).ok_or(GameError::InvalidPosition)?;
        if !self.cells[idx].is_empty() {
            return Err(GameError::CellOccupied);
        }
        self.cells[idx] = mark;
        Ok(())
    }

    /// True when no empty cell remains
    pub fn is_full(&self) -> bool {
        self.cells.iter().all(|cell| !cell.is_empty())
    }

    /// Check whether the mark at `(row, col)` completes a line.
    ///
    /// Only the four lines through the given cell are inspected, so the
    /// cost is proportional to the win length rather than the board area.
    /// Anchor this at the most recent move: no other cell can have newly
    /// completed a line.
    pub fn check_winner(&self, row: usize, col: usize) -> Mark {
        let mark = match self.get(row, col) {
            Ok(mark) if !mark.is_empty() => mark,
            _ => return Mark::Empty,
        };

        for (d_row, d_col) in DIRECTIONS {
            let count = 1
                + self.count_in_direction(row, col, d_row, d_col, mark)
                + self.count_in_direction(row, col, -d_row, -d_col, mark);

            if count >= self.win_length {
                return mark;
            }
        }

        Mark::Empty
    }

    /// Count consecutive `mark`s stepping away from `(row, col)`, excluding
    /// the origin cell itself.
    fn count_in_direction(
        &self,
        row: usize,
        col: usize,
        d_row: isize,
        d_col: isize,
        mark: Mark,
    ) -> usize {
        let mut count = 0;
        let (mut r, mut c) = (row as isize + d_row, col as isize + d_col);

        while let Some(idx) = self.signed_index(r, c) {
            if self.cells[idx] != mark {
                break;
            }
            count += 1;
            // A full line never needs more than win_length - 1 neighbours
            if count + 1 >= self.win_length {
                break;
            }
            r += d_row;
            c += d_col;
        }

        count
    }

    fn index(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.size && col < self.size).then(|| row * self.size + col)
    }

    fn signed_index(&self, row: isize, col: isize) -> Option<usize> {
        if row < 0 || col < 0 {
            return None;
        }
        self.index(row as usize, col as usize)
    }
}

//! Grid model: the fixed-size array of cells behind a Minesweeper board.
//!
//! # Indexing
//!
//! Cells are stored row-major in a flat `Vec`.  A flat index `i` maps to
//! `(row, col) = (i / cols, i % cols)`.  The flat index is part of the wire
//! contract: peers and UI events both refer to cells by it, so it must never
//! change meaning.
//!
//! # Counters
//!
//! The grid keeps two running counters so callers never have to rescan the
//! board:
//!
//! - `unrevealed_safe` – safe cells not yet opened.  Always equal to
//!   `total_cells - mine_count - revealed_safe`.
//! - `unmarked_mines` – `mine_count` minus the number of marks placed.  Marks
//!   are not checked against the real layout, so this can go negative when
//!   the player places more flags than there are mines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Board presets ─────────────────────────────────────────────────────────────

/// The three board presets a game can be played on.
///
/// Board dimensions and mine counts form a closed set; a serialized board is
/// recognized purely by its cell count (81, 256, or 480).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardSize {
    /// 9×9 with 10 mines.
    #[default]
    Small,
    /// 16×16 with 40 mines.
    Medium,
    /// 16×30 with 99 mines.
    Large,
}

impl BoardSize {
    /// Every preset, smallest first.
    pub const ALL: [BoardSize; 3] = [BoardSize::Small, BoardSize::Medium, BoardSize::Large];

    pub const fn rows(self) -> usize {
        match self {
            BoardSize::Small => 9,
            BoardSize::Medium => 16,
            BoardSize::Large => 16,
        }
    }

    pub const fn cols(self) -> usize {
        match self {
            BoardSize::Small => 9,
            BoardSize::Medium => 16,
            BoardSize::Large => 30,
        }
    }

    /// Number of mines placed by a random reset of this preset.
    pub const fn mine_count(self) -> usize {
        match self {
            BoardSize::Small => 10,
            BoardSize::Medium => 40,
            BoardSize::Large => 99,
        }
    }

    pub const fn total_cells(self) -> usize {
        self.rows() * self.cols()
    }

    pub const fn safe_cell_count(self) -> usize {
        self.total_cells() - self.mine_count()
    }

    /// Returns the preset whose cell count is exactly `cells`, if any.
    pub fn from_cell_count(cells: usize) -> Option<BoardSize> {
        BoardSize::ALL
            .into_iter()
            .find(|size| size.total_cells() == cells)
    }

    /// Lowercase name used in configuration files and commands.
    pub const fn name(self) -> &'static str {
        match self {
            BoardSize::Small => "small",
            BoardSize::Medium => "medium",
            BoardSize::Large => "large",
        }
    }
}

impl fmt::Display for BoardSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, {} mines)",
            self.name(),
            self.rows(),
            self.cols(),
            self.mine_count()
        )
    }
}

/// Error returned when a preset name is not recognized.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown board size {0:?}; expected small, medium, or large")]
pub struct ParseBoardSizeError(pub String);

impl FromStr for BoardSize {
    type Err = ParseBoardSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" | "low" => Ok(BoardSize::Small),
            "medium" | "intermediate" => Ok(BoardSize::Medium),
            "large" | "high" => Ok(BoardSize::Large),
            _ => Err(ParseBoardSizeError(s.to_string())),
        }
    }
}

// ── Cells ─────────────────────────────────────────────────────────────────────

/// One grid position.
///
/// Invariant: a revealed cell is never marked.  `adjacent_mines` is fixed
/// when mines are placed and never recomputed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    index: usize,
    has_mine: bool,
    revealed: bool,
    marked: bool,
    adjacent_mines: u8,
}

impl Cell {
    fn new(index: usize) -> Self {
        Self {
            index,
            has_mine: false,
            revealed: false,
            marked: false,
            adjacent_mines: 0,
        }
    }

    /// Row-major flat index of this cell.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn has_mine(&self) -> bool {
        self.has_mine
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn is_marked(&self) -> bool {
        self.marked
    }

    /// Number of mines among the up-to-8 neighbors.
    pub fn adjacent_mines(&self) -> u8 {
        self.adjacent_mines
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

/// Fixed-size rectangular array of [`Cell`]s plus the running counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    size: BoardSize,
    cells: Vec<Cell>,
    mine_count: usize,
    unrevealed_safe: usize,
    unmarked_mines: i32,
}

impl Grid {
    /// Creates a grid for `size` with no mines, nothing revealed and nothing
    /// marked.
    pub fn empty(size: BoardSize) -> Self {
        let total = size.total_cells();
        Self {
            size,
            cells: (0..total).map(Cell::new).collect(),
            mine_count: 0,
            unrevealed_safe: total,
            unmarked_mines: 0,
        }
    }

    pub fn size(&self) -> BoardSize {
        self.size
    }

    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of mines actually placed on this grid.
    ///
    /// Equal to the preset's count after a random reset, but a board loaded
    /// from text carries however many mines the text marks.
    pub fn mine_count(&self) -> usize {
        self.mine_count
    }

    pub fn unrevealed_safe(&self) -> usize {
        self.unrevealed_safe
    }

    pub fn revealed_safe(&self) -> usize {
        self.total_cells() - self.mine_count - self.unrevealed_safe
    }

    pub fn unmarked_mines(&self) -> i32 {
        self.unmarked_mines
    }

    /// Number of marks currently placed, right or wrong.
    pub fn marked(&self) -> i32 {
        self.mine_count as i32 - self.unmarked_mines
    }

    /// Returns the cell at `index`, or `None` when out of bounds.
    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Converts a flat index into `(row, col)`.
    pub fn coords_of(&self, index: usize) -> (usize, usize) {
        (index / self.size.cols(), index % self.size.cols())
    }

    /// Iterates over the in-bounds neighbors of `index`.
    pub fn neighbors(&self, index: usize) -> NeighborIter {
        NeighborIter::new(self.coords_of(index), (self.size.rows(), self.size.cols()))
    }

    /// Places a mine at `index` and bumps the adjacency count of every
    /// neighbor.
    ///
    /// Returns `false` without changing anything when the cell already holds
    /// a mine or `index` is out of bounds.
    pub(crate) fn place_mine(&mut self, index: usize) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) if !cell.has_mine => cell.has_mine = true,
            _ => return false,
        }

        let neighbors: Vec<usize> = self.neighbors(index).collect();
        for neighbor in neighbors {
            self.cells[neighbor].adjacent_mines += 1;
        }

        self.mine_count += 1;
        self.unrevealed_safe -= 1;
        self.unmarked_mines += 1;
        true
    }

    /// Marks `index` revealed, decrementing `unrevealed_safe` for safe cells.
    ///
    /// Callers must have checked that the cell is neither revealed nor marked.
    pub(crate) fn reveal(&mut self, index: usize) {
        let cell = &mut self.cells[index];
        debug_assert!(!cell.revealed && !cell.marked);
        cell.revealed = true;
        if !cell.has_mine {
            self.unrevealed_safe -= 1;
        }
    }

    /// Toggles the mark on `index`, moving `unmarked_mines` by one.
    ///
    /// Callers must have checked that the cell is not revealed.
    pub(crate) fn toggle_mark(&mut self, index: usize) {
        let cell = &mut self.cells[index];
        debug_assert!(!cell.revealed);
        cell.marked = !cell.marked;
        self.unmarked_mines += if cell.marked { -1 } else { 1 };
    }
}

// ── Neighbor iteration ────────────────────────────────────────────────────────

const DISPLACEMENTS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Applies `delta` to `coords`, returning a value only when it stays in bounds.
fn apply_delta(
    coords: (usize, usize),
    delta: (isize, isize),
    bounds: (usize, usize),
) -> Option<(usize, usize)> {
    let row = coords.0.checked_add_signed(delta.0)?;
    if row >= bounds.0 {
        return None;
    }
    let col = coords.1.checked_add_signed(delta.1)?;
    if col >= bounds.1 {
        return None;
    }
    Some((row, col))
}

/// Iterator over the flat indices of a cell's in-bounds neighbors.
#[derive(Debug)]
pub struct NeighborIter {
    center: (usize, usize),
    bounds: (usize, usize),
    next: usize,
}

impl NeighborIter {
    fn new(center: (usize, usize), bounds: (usize, usize)) -> Self {
        Self {
            center,
            bounds,
            next: 0,
        }
    }
}

impl Iterator for NeighborIter {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < DISPLACEMENTS.len() {
            let delta = DISPLACEMENTS[self.next];
            self.next += 1;
            if let Some((row, col)) = apply_delta(self.center, delta, self.bounds) {
                return Some(row * self.bounds.1 + col);
            }
        }
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

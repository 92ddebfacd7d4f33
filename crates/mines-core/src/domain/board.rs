//! Board engine: the mutating operations of a Minesweeper round.
//!
//! A [`Board`] wraps a [`Grid`] with a round state.  Every operation is a
//! silent no-op unless the board is [`BoardState::Playing`], so a click that
//! arrives after the round has ended can never corrupt the grid or raise an
//! error.
//!
//! # Signals
//!
//! Win and loss are reported through the returned [`MoveOutcome`].  The board
//! leaves `Playing` in the same call that produces `Won` or `Lost`, so each
//! signal fires at most once per round.
//!
//! # Serialization
//!
//! [`Board::serialize`] emits one character per cell in row-major order,
//! `'1'` for a mine and `'0'` otherwise.  The host uses it to ship a freshly
//! generated layout to the guest, who loads it with [`Board::load_from_text`].

use std::collections::VecDeque;
use std::ops::BitOr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::grid::{BoardSize, Cell, Grid};

/// Errors raised while loading a board from its text form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// The text length matches none of the three presets.
    #[error("board text has {0} cells, which matches no known board size")]
    UnknownBoardLength(usize),

    /// The text contains something other than `'0'` and `'1'`.
    #[error("board text has invalid character {found:?} at cell {index}")]
    InvalidBoardCharacter { index: usize, found: char },
}

/// Round state of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoardState {
    /// The round is over (or has not been dealt); every move is ignored.
    #[default]
    Waiting,
    /// Moves are accepted.
    Playing,
}

/// Result of a single board operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Nothing changed (the move was not applicable).
    NoChange,
    /// At least one cell changed and the round continues.
    Changed,
    /// The last safe cell was opened.
    Won,
    /// A mine was opened, or a chord exposed a wrong mark.
    Lost,
}

impl MoveOutcome {
    /// Whether the caller should refresh its view.
    pub const fn has_update(self) -> bool {
        !matches!(self, MoveOutcome::NoChange)
    }

    /// Whether this outcome ended the round.
    pub const fn is_terminal(self) -> bool {
        matches!(self, MoveOutcome::Won | MoveOutcome::Lost)
    }
}

impl BitOr for MoveOutcome {
    type Output = MoveOutcome;

    fn bitor(self, rhs: Self) -> Self::Output {
        use MoveOutcome::*;
        match (self, rhs) {
            (Lost, _) | (_, Lost) => Lost,
            (Won, _) | (_, Won) => Won,
            (Changed, _) | (_, Changed) => Changed,
            (NoChange, NoChange) => NoChange,
        }
    }
}

/// What a player should currently see in one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellView {
    Hidden,
    Flagged,
    /// An opened safe cell with its adjacent-mine count.
    Revealed(u8),
    /// The mine that was hit, or any unmarked mine once the round is lost.
    Mine,
    /// A flagged safe cell that ended the round through a chord.
    WrongMark,
}

/// A Minesweeper board: grid plus round state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    grid: Grid,
    state: BoardState,
    mines_exposed: bool,
    wrong_mark: Option<usize>,
}

impl Board {
    /// Creates a board for `size` and deals a random layout.
    pub fn new(size: BoardSize) -> Self {
        let mut board = Self {
            grid: Grid::empty(size),
            state: BoardState::Waiting,
            mines_exposed: false,
            wrong_mark: None,
        };
        board.reset(size);
        board
    }

    /// Reallocates the grid for `size` and places the preset's mines at
    /// random.  The board is `Playing` afterwards.
    pub fn reset(&mut self, size: BoardSize) {
        self.reset_with_rng(size, &mut rand::thread_rng());
    }

    /// Same as [`reset`](Self::reset) with a caller-provided RNG.
    ///
    /// Mines are placed by rejection sampling: pick a uniformly random cell,
    /// retry if it already holds a mine.
    pub fn reset_with_rng<R: Rng + ?Sized>(&mut self, size: BoardSize, rng: &mut R) {
        let mut grid = Grid::empty(size);
        let total = size.total_cells();
        for _ in 0..size.mine_count() {
            while !grid.place_mine(rng.gen_range(0..total)) {}
        }
        self.install(grid);
        debug!("dealt a fresh {size} board");
    }

    /// Replaces the layout with the one encoded in `text`.
    ///
    /// The preset is inferred from the text length; the mine count is however
    /// many `'1'` characters the text holds.  On error the board is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::UnknownBoardLength`] when the length matches no
    /// preset and [`BoardError::InvalidBoardCharacter`] for any character
    /// other than `'0'` or `'1'`.
    pub fn load_from_text(&mut self, text: &str) -> Result<(), BoardError> {
        let cell_count = text.chars().count();
        let size =
            BoardSize::from_cell_count(cell_count).ok_or(BoardError::UnknownBoardLength(cell_count))?;

        if let Some((index, found)) = text.chars().enumerate().find(|(_, c)| !matches!(c, '0' | '1'))
        {
            return Err(BoardError::InvalidBoardCharacter { index, found });
        }

        let mut grid = Grid::empty(size);
        for (index, _) in text.chars().enumerate().filter(|&(_, c)| c == '1') {
            grid.place_mine(index);
        }
        debug!("loaded {size} board with {} mines", grid.mine_count());
        self.install(grid);
        Ok(())
    }

    /// Encodes the mine layout as one `'0'`/`'1'` character per cell.
    pub fn serialize(&self) -> String {
        self.grid
            .cells()
            .iter()
            .map(|cell| if cell.has_mine() { '1' } else { '0' })
            .collect()
    }

    /// Opens the cell at `index`.
    ///
    /// Opening a mine loses the round.  Opening a cell with no adjacent mines
    /// cascades to its whole connected zero region and the numbered cells on
    /// its border.  Each cell opens at most once.
    pub fn open(&mut self, index: usize) -> MoveOutcome {
        let Some(cell) = self.playable_cell(index) else {
            return MoveOutcome::NoChange;
        };
        if cell.is_revealed() || cell.is_marked() {
            return MoveOutcome::NoChange;
        }

        if cell.has_mine() {
            self.grid.reveal(index);
            self.end_with_loss();
            return MoveOutcome::Lost;
        }

        let mut to_visit = VecDeque::from([index]);
        while let Some(visit) = to_visit.pop_front() {
            let cell = self.grid.cells()[visit];
            if cell.is_revealed() || cell.is_marked() {
                continue;
            }

            self.grid.reveal(visit);
            if self.grid.unrevealed_safe() == 0 {
                self.state = BoardState::Waiting;
                return MoveOutcome::Won;
            }

            if cell.adjacent_mines() == 0 {
                let cells = self.grid.cells();
                to_visit.extend(
                    self.grid
                        .neighbors(visit)
                        .filter(|&n| !cells[n].is_revealed() && !cells[n].is_marked()),
                );
            }
        }

        MoveOutcome::Changed
    }

    /// Toggles the mark on an unrevealed cell.
    ///
    /// Marks are not checked against the layout; the unmarked-mine counter
    /// tracks marks, not correctness.
    pub fn mark(&mut self, index: usize) -> MoveOutcome {
        match self.playable_cell(index) {
            Some(cell) if !cell.is_revealed() => {
                self.grid.toggle_mark(index);
                MoveOutcome::Changed
            }
            _ => MoveOutcome::NoChange,
        }
    }

    /// Chord on a revealed cell: opens every unrevealed neighbor when all
    /// neighboring mines are marked.
    ///
    /// Two independent checks run over the unrevealed neighbors.  Any
    /// unmarked mine makes the chord unsafe, so nothing opens.  Any marked
    /// safe cell is a wrong mark and loses the round immediately.
    pub fn explore(&mut self, index: usize) -> MoveOutcome {
        match self.playable_cell(index) {
            Some(cell) if cell.is_revealed() => {}
            _ => return MoveOutcome::NoChange,
        }

        let neighbors: Vec<usize> = self.grid.neighbors(index).collect();
        let mut safe = true;
        let mut wrong_mark = None;
        for &neighbor in &neighbors {
            let cell = self.grid.cells()[neighbor];
            if cell.is_revealed() {
                continue;
            }
            if cell.has_mine() && !cell.is_marked() {
                safe = false;
            }
            if cell.is_marked() && !cell.has_mine() {
                wrong_mark = Some(neighbor);
            }
        }

        if let Some(wrong) = wrong_mark {
            self.wrong_mark = Some(wrong);
            self.end_with_loss();
            return MoveOutcome::Lost;
        }
        if !safe {
            return MoveOutcome::NoChange;
        }

        neighbors
            .into_iter()
            .map(|neighbor| self.open(neighbor))
            .fold(MoveOutcome::NoChange, BitOr::bitor)
    }

    // ── Read-only view ────────────────────────────────────────────────────────

    pub fn size(&self) -> BoardSize {
        self.grid.size()
    }

    pub fn state(&self) -> BoardState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == BoardState::Playing
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.grid.cell(index)
    }

    pub fn total_cells(&self) -> usize {
        self.grid.total_cells()
    }

    pub fn mine_count(&self) -> usize {
        self.grid.mine_count()
    }

    pub fn unrevealed_safe_count(&self) -> usize {
        self.grid.unrevealed_safe()
    }

    pub fn revealed_safe_count(&self) -> usize {
        self.grid.revealed_safe()
    }

    pub fn unmarked_mine_count(&self) -> i32 {
        self.grid.unmarked_mines()
    }

    pub fn marked_count(&self) -> i32 {
        self.grid.marked()
    }

    /// What the player should see at `index`, or `None` when out of bounds.
    pub fn cell_view(&self, index: usize) -> Option<CellView> {
        let cell = self.grid.cell(index)?;
        let view = if self.wrong_mark == Some(index) {
            CellView::WrongMark
        } else if cell.is_marked() {
            CellView::Flagged
        } else if cell.is_revealed() && cell.has_mine() {
            CellView::Mine
        } else if cell.is_revealed() {
            CellView::Revealed(cell.adjacent_mines())
        } else if self.mines_exposed && cell.has_mine() {
            CellView::Mine
        } else {
            CellView::Hidden
        };
        Some(view)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn install(&mut self, grid: Grid) {
        self.grid = grid;
        self.state = BoardState::Playing;
        self.mines_exposed = false;
        self.wrong_mark = None;
    }

    /// Returns a copy of the cell when the board is playing and `index` is in
    /// bounds.
    fn playable_cell(&self, index: usize) -> Option<Cell> {
        if !self.is_playing() {
            return None;
        }
        let cell = self.grid.cell(index).copied();
        if cell.is_none() {
            debug!("ignoring move on out-of-bounds cell {index}");
        }
        cell
    }

    fn end_with_loss(&mut self) {
        self.state = BoardState::Waiting;
        self.mines_exposed = true;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

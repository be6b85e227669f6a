//! Big Road placement.
//!
//! Same-side runs stack downward in one column; a change of side opens a new
//! column. Once a run reaches the bottom row it continues sideways along that
//! row (the dragon tail). Ties never take a cell: they mark the most recent
//! placement of the side that was placed last.

use std::collections::{BTreeSet, HashMap};

use crate::outcome::{Outcome, Side};

/// Fixed row ceiling of the road.
pub const ROWS: usize = 6;

/// Default column ceiling; placements past it are dropped.
pub const DEFAULT_GRID_COLS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub side: Side,
    /// Ties that followed this placement before the next P/B round.
    pub ties: u32,
    /// The round at this cell was the target of a confirmed recommendation.
    pub correct: bool,
}

impl Cell {
    fn new(side: Side, correct: bool) -> Self {
        Self { side, ties: 0, correct }
    }

    pub fn has_tie(&self) -> bool {
        self.ties > 0
    }
}

/// One column of the road, top row first.
pub type Column = [Option<Cell>; ROWS];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    columns: Vec<Column>,
}

impl Grid {
    pub fn new(cols: usize) -> Self {
        Self { columns: vec![[None; ROWS]; cols] }
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.columns.get(col).and_then(|c| c.get(row)).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.columns
            .get_mut(col)
            .and_then(|c| c.get_mut(row))
            .and_then(Option::as_mut)
    }

    /// Copy of `width` columns starting at `start`. Columns past the ceiling
    /// come back empty so a page is always full width.
    pub fn window(&self, start: usize, width: usize) -> Vec<Column> {
        (start..start.saturating_add(width))
            .map(|c| self.columns.get(c).copied().unwrap_or([None; ROWS]))
            .collect()
    }

    #[cfg(test)]
    fn occupied(&self) -> usize {
        self.columns.iter().flatten().filter(|c| c.is_some()).count()
    }
}

/// Encoder output: the grid plus the cursor facts the paginator needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRoad {
    pub grid: Grid,
    /// Final column of the cursor, `None` when no P/B round was placed.
    /// May lie beyond the grid ceiling.
    pub highest_column: Option<usize>,
    /// Number of P/B rounds seen; valid correctness indices are `0..placed`.
    pub placed: usize,
}

impl EncodedRoad {
    /// Columns the history spans, i.e. `highest_column + 1`.
    pub fn columns_used(&self) -> usize {
        self.highest_column.map_or(0, |c| c + 1)
    }
}

/// Lay `history` out on a road `grid_cols` wide.
///
/// `correct` holds indices into the P/B-only subsequence of `history`.
pub fn encode(history: &[Outcome], correct: &BTreeSet<usize>, grid_cols: usize) -> EncodedRoad {
    let mut grid = Grid::new(grid_cols);
    let mut col: Option<usize> = None;
    let mut row = 0usize;
    let mut last: Option<Side> = None;
    let mut last_position: HashMap<Side, (usize, usize)> = HashMap::new();
    let mut placed = 0usize;

    for outcome in history {
        let side = match outcome.side() {
            Some(side) => side,
            None => {
                let target = last.and_then(|s| last_position.get(&s).copied());
                if let Some((r, c)) = target {
                    if let Some(cell) = grid.get_mut(r, c) {
                        cell.ties += 1;
                    }
                }
                continue;
            }
        };

        let pb_index = placed;
        placed += 1;

        if last != Some(side) {
            col = Some(col.map_or(0, |c| c + 1));
            row = 0;
        } else {
            row += 1;
        }
        let mut c = col.unwrap_or(0);
        if row >= ROWS {
            c += 1;
            row = ROWS - 1;
            col = Some(c);
        }

        if c < grid_cols {
            grid.columns[c][row] = Some(Cell::new(side, correct.contains(&pb_index)));
            last_position.insert(side, (row, c));
        }
        last = Some(side);
    }

    EncodedRoad { grid, highest_column: col, placed }
}

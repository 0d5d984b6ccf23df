use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

pub const MIN_SIDE: usize = 5;
pub const MAX_SIDE: usize = 50;

/// One grid position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub mine: bool,
    pub revealed: bool,
    pub flagged: bool,
    pub count: u8,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Rectangular grid of cells stored row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    rows: usize,
    cols: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Create a board of cleared cells.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            cells: vec![Cell::default(); rows * cols],
        }
    }

    /// Rebuild a board from nested rows, as carried by a `state` message.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != width) {
            return Err(GameError::InvalidBoardShape);
        }

        Ok(Self {
            rows: height,
            cols: width,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    pub fn get(&self, pos: Pos) -> Option<&Cell> {
        if self.contains(pos) {
            self.cells.get(pos.row * self.cols + pos.col)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, pos: Pos) -> Option<&mut Cell> {
        if self.contains(pos) {
            self.cells.get_mut(pos.row * self.cols + pos.col)
        } else {
            None
        }
    }

    /// The up-to-8 in-bounds neighbors of `pos`, in row-major order.
    pub fn neighbors(&self, pos: Pos) -> impl Iterator<Item = Pos> + use<> {
        let (rows, cols) = (self.rows as isize, self.cols as isize);
        let (row, col) = (pos.row as isize, pos.col as isize);

        (-1..=1)
            .flat_map(move |dr| (-1..=1).map(move |dc| (dr, dc)))
            .filter(|&(dr, dc)| dr != 0 || dc != 0)
            .map(move |(dr, dc)| (row + dr, col + dc))
            .filter(move |&(r, c)| r >= 0 && r < rows && c >= 0 && c < cols)
            .map(|(r, c)| Pos::new(r as usize, c as usize))
    }

    pub fn positions(&self) -> impl Iterator<Item = Pos> + use<> {
        let cols = self.cols;
        (0..self.rows).flat_map(move |row| (0..cols).map(move |col| Pos::new(row, col)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pos, &Cell)> {
        self.positions().zip(self.cells.iter())
    }

    pub fn count_neighbors(&self, pos: Pos, predicate: impl Fn(&Cell) -> bool) -> usize {
        self.neighbors(pos)
            .filter_map(|neighbor| self.get(neighbor))
            .filter(|cell| predicate(cell))
            .count()
    }

    /// Neighbors a chord on `pos` would open, or `None` when `pos` is not a
    /// revealed number whose flag count matches it.
    pub fn chord_targets(&self, pos: Pos) -> Option<Vec<Pos>> {
        let cell = self.get(pos)?;
        if !cell.revealed || cell.mine {
            return None;
        }
        if self.count_neighbors(pos, |n| n.flagged) != usize::from(cell.count) {
            return None;
        }

        Some(
            self.neighbors(pos)
                .filter(|&n| self.get(n).is_some_and(|c| !c.flagged && !c.revealed))
                .collect(),
        )
    }

    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        if self.cols == 0 {
            return vec![Vec::new(); self.rows];
        }
        self.cells.chunks(self.cols).map(<[Cell]>::to_vec).collect()
    }
}

/// Board dimensions and mine count for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct GameParams {
    pub rows: usize,
    pub cols: usize,
    pub mines: usize,
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            rows: 10,
            cols: 10,
            mines: 15,
        }
    }
}

impl GameParams {
    /// Validate user-supplied dimensions: sides in `[5, 50]`, mines in `[1, rows*cols)`.
    pub fn custom(rows: usize, cols: usize, mines: usize) -> Result<Self> {
        if !(MIN_SIDE..=MAX_SIDE).contains(&rows) || !(MIN_SIDE..=MAX_SIDE).contains(&cols) {
            return Err(GameError::InvalidDimensions { rows, cols });
        }
        let cells = rows * cols;
        if mines == 0 || mines >= cells {
            return Err(GameError::InvalidMineCount { mines, cells });
        }

        Ok(Self { rows, cols, mines })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Custom {
        rows: usize,
        cols: usize,
        mines: usize,
    },
}

impl Difficulty {
    /// Resolve the preset. Custom values are validated by [`GameParams::custom`].
    pub fn params(self) -> Result<GameParams> {
        match self {
            Difficulty::Easy => Ok(GameParams {
                rows: 8,
                cols: 8,
                mines: 10,
            }),
            Difficulty::Medium => Ok(GameParams::default()),
            Difficulty::Hard => Ok(GameParams {
                rows: 20,
                cols: 20,
                mines: 60,
            }),
            Difficulty::Custom { rows, cols, mines } => GameParams::custom(rows, cols, mines),
        }
    }
}

impl FromStr for Difficulty {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(GameError::UnknownDifficulty(other.to_string())),
        }
    }
}

/// A cell value paired with its position, sent as part of a `reveal` delta.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellUpdate {
    pub row: usize,
    pub col: usize,
    pub cell: Cell,
}

impl CellUpdate {
    pub fn pos(&self) -> Pos {
        Pos::new(self.row, self.col)
    }
}

/// Full board snapshot plus scalars, carried by the `state` message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub rows: usize,
    pub cols: usize,
    pub mines: usize,
    pub board: Vec<Vec<Cell>>,
    pub flags_placed: usize,
    pub game_over: bool,
    pub timer: u64,
    pub is_first_click: bool,
}

/// Lobby information about a hosted session.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub rows: usize,
    pub cols: usize,
    pub mines: usize,
    pub players: usize,
}

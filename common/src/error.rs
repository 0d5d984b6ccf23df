use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Invalid board dimensions {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },
    #[error("Invalid mine count {mines} for {cells} cells")]
    InvalidMineCount { mines: usize, cells: usize },
    #[error("Unknown difficulty: {0}")]
    UnknownDifficulty(String),
    #[error("Board rows have different lengths")]
    InvalidBoardShape,
    #[error("Position ({row}, {col}) is outside the board")]
    OutOfBounds { row: usize, col: usize },
}

pub type Result<T> = std::result::Result<T, GameError>;

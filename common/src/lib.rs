//! Types shared by coopsweeper hosts and guests: the board model, the peer
//! message vocabulary and the deduction engine used by the assist overlay.

pub mod error;
pub mod models;
pub mod protocol;
pub mod solver;

pub use error::{GameError, Result};

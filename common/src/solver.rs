//! Deduction engine behind the assist overlay.
//!
//! Works on a private copy of the board and only ever flags or reveals cells
//! in that copy, so the two rules below are confluent: running them to a
//! fixed point gives the same answer whatever order they fire in.
//!
//! On the authoritative board every count is real, so cells deduced safe
//! are opened in the copy and their numbers feed later rounds, the same
//! information a player would get by clicking them. A mirrored board only
//! knows the numbers it has been sent; there, deduced-safe cells leave the
//! unknown sets but never become constraints themselves.

use std::collections::BTreeSet;

use crate::models::{Board, Pos};

/// Cells proven safe or proven mined from visible information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deductions {
    pub safe: BTreeSet<Pos>,
    pub mines: BTreeSet<Pos>,
}

/// Mines still missing around one revealed number.
struct Constraint {
    unknown: BTreeSet<Pos>,
    remaining: usize,
}

impl Constraint {
    fn at(board: &Board, pos: Pos) -> Option<Self> {
        let cell = board.get(pos)?;
        if !cell.revealed || cell.mine {
            return None;
        }

        let unknown: BTreeSet<Pos> = board
            .neighbors(pos)
            .filter(|&neighbor| {
                board
                    .get(neighbor)
                    .is_some_and(|n| !n.revealed && !n.flagged)
            })
            .collect();
        let flagged = board.count_neighbors(pos, |n| n.flagged);

        // A number contradicted by the flags around it tells us nothing.
        let remaining = usize::from(cell.count).checked_sub(flagged)?;
        if remaining > unknown.len() {
            return None;
        }

        Some(Self { unknown, remaining })
    }
}

/// How much of the board's `count` data can be believed.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Counts {
    /// Every cell carries its real count.
    All,
    /// Only counts of cells revealed in the input are real.
    Revealed,
}

struct Scratch {
    board: Board,
    found: Deductions,
    counts: Counts,
}

impl Scratch {
    /// Constraint around `pos`, if its number is known.
    fn constraint(&self, pos: Pos) -> Option<Constraint> {
        if self.counts == Counts::Revealed && self.found.safe.contains(&pos) {
            return None;
        }
        Constraint::at(&self.board, pos)
    }

    fn mark_safe(&mut self, cells: impl IntoIterator<Item = Pos>) {
        for pos in cells {
            if let Some(cell) = self.board.get_mut(pos) {
                cell.revealed = true;
                self.found.safe.insert(pos);
            }
        }
    }

    fn mark_mines(&mut self, cells: impl IntoIterator<Item = Pos>) {
        for pos in cells {
            if let Some(cell) = self.board.get_mut(pos) {
                cell.flagged = true;
                self.found.mines.insert(pos);
            }
        }
    }

    /// Single-constraint rule. Returns whether anything was decided.
    fn apply_single(&mut self) -> bool {
        let mut progressed = false;
        for pos in self.board.positions() {
            let Some(constraint) = self.constraint(pos) else {
                continue;
            };
            if constraint.unknown.is_empty() {
                continue;
            }

            if constraint.remaining == constraint.unknown.len() {
                self.mark_mines(constraint.unknown);
                progressed = true;
            } else if constraint.remaining == 0 {
                self.mark_safe(constraint.unknown);
                progressed = true;
            }
        }
        progressed
    }

    /// Subset rule over pairs of neighbouring numbers.
    fn apply_subsets(&mut self) -> bool {
        let mut progressed = false;
        for pos in self.board.positions() {
            let Some(inner) = self.constraint(pos) else {
                continue;
            };

            for neighbor in self.board.neighbors(pos) {
                let Some(outer) = self.constraint(neighbor) else {
                    continue;
                };
                if inner.unknown.len() >= outer.unknown.len()
                    || !inner.unknown.is_subset(&outer.unknown)
                {
                    continue;
                }

                let rest: Vec<Pos> = outer.unknown.difference(&inner.unknown).copied().collect();
                if inner.remaining == outer.remaining {
                    self.mark_safe(rest);
                    progressed = true;
                } else if outer.remaining.checked_sub(inner.remaining) == Some(rest.len()) {
                    self.mark_mines(rest);
                    progressed = true;
                }
            }
        }
        progressed
    }
}

fn settle(board: &Board, counts: Counts) -> Scratch {
    let mut scratch = Scratch {
        board: board.clone(),
        found: Deductions::default(),
        counts,
    };

    loop {
        let single = scratch.apply_single();
        let subsets = scratch.apply_subsets();
        if !single && !subsets {
            break;
        }
    }

    scratch
}

/// Run both rules to a fixed point on an authoritative board.
pub fn deduce(board: &Board) -> Deductions {
    settle(board, Counts::All).found
}

/// Run both rules using only what is on show: revealed numbers and flags.
/// Hidden cells' `mine` and `count` fields are never read.
pub fn deduce_visible(board: &Board) -> Deductions {
    settle(board, Counts::Revealed).found
}

/// Safe cells that no deduction reaches: opening them takes a guess.
///
/// Reads the ground-truth `mine` bit and hidden counts, so only the host
/// can call this.
pub fn guessing_cells(board: &Board) -> BTreeSet<Pos> {
    let settled = settle(board, Counts::All).board;
    settled
        .iter()
        .filter(|(_, cell)| !cell.revealed && !cell.flagged && !cell.mine)
        .map(|(pos, _)| pos)
        .collect()
}

/// Hidden, unflagged cells that visible information cannot decide either
/// way. Always a superset of [`guessing_cells`] for the same game.
pub fn undetermined_cells(board: &Board) -> BTreeSet<Pos> {
    let found = deduce_visible(board);
    board
        .iter()
        .filter(|(pos, cell)| {
            !cell.revealed
                && !cell.flagged
                && !found.safe.contains(pos)
                && !found.mines.contains(pos)
        })
        .map(|(pos, _)| pos)
        .collect()
}

use coopsweeper_common::models::{Board, CellUpdate, GameParams, GameSnapshot, Pos};
use rand::Rng;
use tracing::{debug, info, warn};

/// Cells kept mine-free around the first reveal.
const FIRST_CLICK_AREA: usize = 9;

/// Something a player action did to the board, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Revealed(Vec<CellUpdate>),
    Flagged {
        pos: Pos,
        flagged: bool,
        flags_placed: usize,
    },
    /// The first reveal landed; the game clock should start.
    Started,
    Ended {
        win: bool,
        loser: Option<String>,
    },
}

/// Authoritative board plus the scalars that travel with it.
#[derive(Debug, Clone)]
pub struct Field {
    board: Board,
    mines: usize,
    flags_placed: usize,
    timer: u64,
    is_first_click: bool,
    game_over: bool,
    won: bool,
    revealed_safe: usize,
}

impl Field {
    /// Fresh board with no mines yet; they are placed on the first reveal.
    pub fn new(params: GameParams) -> Self {
        let cells = params.rows * params.cols;
        let placeable = cells.saturating_sub(FIRST_CLICK_AREA);
        let mines = if params.mines > placeable {
            warn!(
                "{} mines do not fit a {}x{} board, using {}",
                params.mines, params.rows, params.cols, placeable
            );
            placeable
        } else {
            params.mines
        };

        Self {
            board: Board::new(params.rows, params.cols),
            mines,
            flags_placed: 0,
            timer: 0,
            is_first_click: true,
            game_over: false,
            won: false,
            revealed_safe: 0,
        }
    }

    /// Board with a fixed mine layout, as if the first reveal already
    /// happened somewhere that opened nothing.
    pub fn from_layout(rows: usize, cols: usize, mines: &[Pos]) -> Self {
        let mut board = Board::new(rows, cols);
        for &pos in mines {
            if let Some(cell) = board.get_mut(pos) {
                cell.mine = true;
            }
        }
        let mines = board.iter().filter(|(_, cell)| cell.mine).count();

        let mut field = Self {
            board,
            mines,
            flags_placed: 0,
            timer: 0,
            is_first_click: false,
            game_over: false,
            won: false,
            revealed_safe: 0,
        };
        field.compute_counts();
        field
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn params(&self) -> GameParams {
        GameParams {
            rows: self.board.rows(),
            cols: self.board.cols(),
            mines: self.mines,
        }
    }

    pub fn flags_placed(&self) -> usize {
        self.flags_placed
    }

    pub fn timer(&self) -> u64 {
        self.timer
    }

    pub fn is_first_click(&self) -> bool {
        self.is_first_click
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn is_won(&self) -> bool {
        self.won
    }

    /// Value copy of everything a guest needs to rebuild its mirror.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            rows: self.board.rows(),
            cols: self.board.cols(),
            mines: self.mines,
            board: self.board.to_rows(),
            flags_placed: self.flags_placed,
            game_over: self.game_over,
            timer: self.timer,
            is_first_click: self.is_first_click,
        }
    }

    /// Scatter the mines uniformly over every cell outside the 3x3 block
    /// around `exclude`, sampling without replacement.
    pub fn place_mines<R: Rng + ?Sized>(&mut self, exclude: Pos, rng: &mut R) {
        let eligible: Vec<Pos> = self
            .board
            .positions()
            .filter(|pos| pos.row.abs_diff(exclude.row) > 1 || pos.col.abs_diff(exclude.col) > 1)
            .filter(|&pos| self.board.get(pos).is_some_and(|cell| !cell.mine))
            .collect();

        let amount = self.mines.min(eligible.len());
        if amount < self.mines {
            warn!(
                "Only {} cells eligible for {} mines, placing {}",
                eligible.len(),
                self.mines,
                amount
            );
            self.mines = amount;
        }

        for index in rand::seq::index::sample(rng, eligible.len(), amount) {
            if let Some(cell) = self.board.get_mut(eligible[index]) {
                cell.mine = true;
            }
        }
        debug!("Placed {} mines away from {}", amount, exclude);
    }

    pub fn compute_counts(&mut self) {
        for pos in self.board.positions() {
            let count = self.board.count_neighbors(pos, |cell| cell.mine) as u8;
            if let Some(cell) = self.board.get_mut(pos) {
                cell.count = if cell.mine { 0 } else { count };
            }
        }
    }

    /// Flood-fill reveal starting at `start`.
    ///
    /// Returns the newly revealed cells in depth-first visiting order: a
    /// zero cell opens each neighbor in row-major order, finishing one
    /// neighbor's region before the next.
    pub fn reveal(&mut self, start: Pos) -> Vec<CellUpdate> {
        let mut revealed = Vec::new();
        let mut pending = vec![start];

        while let Some(pos) = pending.pop() {
            let Some(cell) = self.board.get_mut(pos) else {
                continue;
            };
            if cell.revealed || cell.flagged {
                continue;
            }

            cell.revealed = true;
            let cell = *cell;
            if !cell.mine {
                self.revealed_safe += 1;
            }
            revealed.push(CellUpdate {
                row: pos.row,
                col: pos.col,
                cell,
            });

            if !cell.mine && cell.count == 0 {
                let neighbors: Vec<Pos> = self.board.neighbors(pos).collect();
                pending.extend(neighbors.into_iter().rev());
            }
        }

        revealed
    }

    /// Apply a reveal intent from `actor`.
    pub fn process_reveal<R: Rng + ?Sized>(
        &mut self,
        pos: Pos,
        actor: &str,
        rng: &mut R,
    ) -> Vec<Change> {
        let mut changes = Vec::new();
        self.reveal_intent(pos, actor, rng, &mut changes);
        changes
    }

    fn reveal_intent<R: Rng + ?Sized>(
        &mut self,
        pos: Pos,
        actor: &str,
        rng: &mut R,
        changes: &mut Vec<Change>,
    ) {
        if self.game_over {
            return;
        }
        let Some(cell) = self.board.get(pos).copied() else {
            return;
        };

        if cell.revealed {
            let Some(targets) = self.board.chord_targets(pos) else {
                return;
            };
            debug!("{} chords {} over {} cells", actor, pos, targets.len());
            for target in targets {
                if self
                    .board
                    .get(target)
                    .is_some_and(|c| !c.flagged && !c.revealed)
                {
                    self.reveal_intent(target, actor, rng, changes);
                }
            }
            return;
        }

        if cell.flagged {
            return;
        }

        if self.is_first_click {
            self.is_first_click = false;
            self.place_mines(pos, rng);
            self.compute_counts();
            changes.push(Change::Revealed(self.reveal(pos)));
            changes.push(Change::Started);
            self.check_win_condition(changes);
            return;
        }

        if cell.mine {
            self.end_game(false, Some(actor.to_string()), changes);
        } else {
            changes.push(Change::Revealed(self.reveal(pos)));
            self.check_win_condition(changes);
        }
    }

    pub fn toggle_flag(&mut self, pos: Pos) -> Option<Change> {
        if self.game_over || self.is_first_click {
            return None;
        }

        let cell = self.board.get_mut(pos)?;
        if cell.revealed {
            return None;
        }

        cell.flagged = !cell.flagged;
        if cell.flagged {
            self.flags_placed += 1;
        } else {
            self.flags_placed -= 1;
        }

        Some(Change::Flagged {
            pos,
            flagged: cell.flagged,
            flags_placed: self.flags_placed,
        })
    }

    fn check_win_condition(&mut self, changes: &mut Vec<Change>) {
        if self.revealed_safe == self.board.len() - self.mines {
            self.end_game(true, None, changes);
        }
    }

    /// Enter the terminal state. A second call is ignored.
    fn end_game(&mut self, win: bool, loser: Option<String>, changes: &mut Vec<Change>) {
        if self.game_over {
            return;
        }
        self.game_over = true;
        self.won = win;

        if win {
            info!("Board cleared after {}s", self.timer);
        } else {
            // Flagged mines keep their flag so no cell is both flagged and revealed.
            for pos in self.board.positions() {
                if let Some(cell) = self.board.get_mut(pos)
                    && cell.mine
                    && !cell.flagged
                {
                    cell.revealed = true;
                }
            }
            info!(
                "{} hit a mine after {}s",
                loser.as_deref().unwrap_or("Someone"),
                self.timer
            );
        }

        changes.push(Change::Ended { win, loser });
    }

    /// Advance the clock by one second while a game is running.
    pub fn tick(&mut self) -> Option<u64> {
        if self.game_over || self.is_first_click {
            return None;
        }
        self.timer += 1;
        Some(self.timer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn params(rows: usize, cols: usize, mines: usize) -> GameParams {
        GameParams { rows, cols, mines }
    }

    fn revealed(changes: &[Change]) -> Vec<Pos> {
        changes
            .iter()
            .filter_map(|change| match change {
                Change::Revealed(cells) => Some(cells.iter().map(CellUpdate::pos)),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn assert_no_flagged_reveals(field: &Field) {
        for (pos, cell) in field.board().iter() {
            assert!(!(cell.revealed && cell.flagged), "{} is flagged and revealed", pos);
        }
    }

    #[test]
    fn first_click_scenario() {
        let mut field = Field::new(params(8, 8, 10));
        let changes = field.process_reveal(Pos::new(4, 4), "Host", &mut rng());

        assert!(!field.is_first_click());
        for row in 3..=5 {
            for col in 3..=5 {
                assert!(!field.board().get(Pos::new(row, col)).unwrap().mine);
            }
        }
        assert!(field.board().get(Pos::new(4, 4)).unwrap().revealed);
        assert!(changes.contains(&Change::Started));
        assert_eq!(field.board().iter().filter(|(_, c)| c.mine).count(), 10);
    }

    #[test]
    fn flag_before_first_reveal_is_ignored() {
        let mut field = Field::new(params(8, 8, 10));
        assert_eq!(field.toggle_flag(Pos::new(0, 0)), None);
        assert_eq!(field.flags_placed(), 0);
        assert!(!field.board().get(Pos::new(0, 0)).unwrap().flagged);
    }

    #[test]
    fn counts_match_brute_force() {
        let mut field = Field::new(params(12, 9, 30));
        field.process_reveal(Pos::new(0, 0), "Host", &mut rng());

        let board = field.board();
        for (pos, cell) in board.iter() {
            if cell.mine {
                continue;
            }
            let mut expected = 0;
            for row in pos.row.saturating_sub(1)..=(pos.row + 1).min(board.rows() - 1) {
                for col in pos.col.saturating_sub(1)..=(pos.col + 1).min(board.cols() - 1) {
                    if (row, col) != (pos.row, pos.col) && board.get(Pos::new(row, col)).unwrap().mine
                    {
                        expected += 1;
                    }
                }
            }
            assert_eq!(cell.count, expected, "count at {}", pos);
        }
    }

    #[test]
    fn flood_fill_opens_zero_region_and_its_border() {
        // Mine column at col 3 splits a 4x5 board.
        let mines: Vec<Pos> = (0..4).map(|row| Pos::new(row, 3)).collect();
        let mut field = Field::from_layout(4, 5, &mines);

        let cells = field.reveal(Pos::new(0, 0));
        let opened: Vec<Pos> = cells.iter().map(CellUpdate::pos).collect();

        assert_eq!(opened.len(), 12);
        assert_eq!(opened[0], Pos::new(0, 0));
        assert!(opened.iter().all(|pos| pos.col < 3));
        assert!(opened.iter().all(|pos| !field.board().get(*pos).unwrap().mine));
        assert!(!field.board().get(Pos::new(0, 4)).unwrap().revealed);
    }

    #[test]
    fn flood_fill_order_is_depth_first() {
        let mut field = Field::from_layout(3, 3, &[Pos::new(2, 2)]);
        let order: Vec<Pos> = field
            .reveal(Pos::new(0, 0))
            .iter()
            .map(CellUpdate::pos)
            .collect();

        assert_eq!(
            order,
            vec![
                Pos::new(0, 0),
                Pos::new(0, 1),
                Pos::new(0, 2),
                Pos::new(1, 1),
                Pos::new(1, 2),
                Pos::new(1, 0),
                Pos::new(2, 0),
                Pos::new(2, 1),
            ]
        );
    }

    #[test]
    fn numbered_cell_opens_alone() {
        let mut field = Field::from_layout(3, 3, &[Pos::new(0, 0)]);
        let cells = field.reveal(Pos::new(1, 1));
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].cell.count, 1);
    }

    #[test]
    fn revealing_every_safe_cell_wins() {
        let mines = [Pos::new(0, 0), Pos::new(4, 4)];
        let mut field = Field::from_layout(5, 5, &mines);

        let mut last = Vec::new();
        for pos in field.board().positions().collect::<Vec<_>>() {
            if mines.contains(&pos) || field.board().get(pos).unwrap().revealed {
                continue;
            }
            assert!(!field.is_game_over());
            last = field.process_reveal(pos, "Host", &mut rng());
        }

        assert!(field.is_game_over());
        assert!(field.is_won());
        assert_eq!(
            last.last(),
            Some(&Change::Ended {
                win: true,
                loser: None
            })
        );
        assert!(!field.board().get(Pos::new(0, 0)).unwrap().revealed);
    }

    #[test]
    fn hitting_a_mine_reveals_unflagged_mines() {
        let mines = [Pos::new(0, 0), Pos::new(0, 4), Pos::new(4, 0)];
        let mut field = Field::from_layout(5, 5, &mines);
        field.toggle_flag(Pos::new(0, 4));

        let changes = field.process_reveal(Pos::new(0, 0), "Player42", &mut rng());

        assert_eq!(
            changes,
            vec![Change::Ended {
                win: false,
                loser: Some("Player42".to_string())
            }]
        );
        assert!(field.board().get(Pos::new(0, 0)).unwrap().revealed);
        assert!(field.board().get(Pos::new(4, 0)).unwrap().revealed);
        let flagged = field.board().get(Pos::new(0, 4)).unwrap();
        assert!(flagged.flagged && !flagged.revealed);
        assert!(!field.is_won());
    }

    #[test]
    fn finished_game_ignores_input() {
        let mut field = Field::from_layout(5, 5, &[Pos::new(0, 0)]);
        field.process_reveal(Pos::new(0, 0), "Host", &mut rng());
        assert!(field.is_game_over());

        let before = field.snapshot();
        assert!(field.process_reveal(Pos::new(4, 4), "Host", &mut rng()).is_empty());
        assert_eq!(field.toggle_flag(Pos::new(3, 3)), None);
        assert_eq!(field.tick(), None);
        assert_eq!(field.snapshot(), before);
    }

    #[test]
    fn chord_with_wrong_flag_count_does_nothing() {
        let mut field = Field::from_layout(3, 3, &[Pos::new(0, 0), Pos::new(0, 2)]);
        field.reveal(Pos::new(1, 1));
        field.toggle_flag(Pos::new(0, 0));

        let before = field.snapshot();
        let changes = field.process_reveal(Pos::new(1, 1), "Host", &mut rng());
        assert!(changes.is_empty());
        assert_eq!(field.snapshot(), before);
    }

    #[test]
    fn satisfied_chord_opens_the_rest() {
        let mut field = Field::from_layout(3, 3, &[Pos::new(0, 0)]);
        field.reveal(Pos::new(1, 1));
        field.toggle_flag(Pos::new(0, 0));

        let changes = field.process_reveal(Pos::new(1, 1), "Host", &mut rng());
        let mut opened = revealed(&changes);
        opened.sort();
        assert_eq!(opened.len(), 7);
        assert!(!opened.contains(&Pos::new(0, 0)));
        assert!(field.is_won());
    }

    #[test]
    fn chord_over_a_misplaced_flag_loses() {
        let mut field = Field::from_layout(3, 3, &[Pos::new(0, 0)]);
        field.reveal(Pos::new(1, 1));
        field.toggle_flag(Pos::new(2, 2));

        let changes = field.process_reveal(Pos::new(1, 1), "Guest", &mut rng());
        assert!(changes.contains(&Change::Ended {
            win: false,
            loser: Some("Guest".to_string())
        }));
        assert!(field.is_game_over());
    }

    #[test]
    fn flag_toggles_and_counts() {
        let mut field = Field::from_layout(5, 5, &[Pos::new(0, 0)]);
        assert_eq!(
            field.toggle_flag(Pos::new(0, 0)),
            Some(Change::Flagged {
                pos: Pos::new(0, 0),
                flagged: true,
                flags_placed: 1
            })
        );
        assert_eq!(
            field.toggle_flag(Pos::new(0, 0)),
            Some(Change::Flagged {
                pos: Pos::new(0, 0),
                flagged: false,
                flags_placed: 0
            })
        );

        field.reveal(Pos::new(4, 4));
        assert_eq!(field.toggle_flag(Pos::new(4, 4)), None);
        assert_eq!(field.toggle_flag(Pos::new(9, 9)), None);
    }

    #[test]
    fn flagged_cells_block_reveal() {
        let mut field = Field::from_layout(5, 5, &[Pos::new(0, 0)]);
        field.toggle_flag(Pos::new(4, 4));
        assert!(field.process_reveal(Pos::new(4, 4), "Host", &mut rng()).is_empty());
        assert!(!field.board().get(Pos::new(4, 4)).unwrap().revealed);
    }

    #[test]
    fn out_of_bounds_reveal_is_a_no_op() {
        let mut field = Field::new(params(8, 8, 10));
        assert!(field.process_reveal(Pos::new(8, 0), "Host", &mut rng()).is_empty());
        assert!(field.is_first_click());
    }

    #[test]
    fn oversized_mine_count_is_clamped() {
        let mut field = Field::new(params(5, 5, 24));
        assert_eq!(field.params().mines, 16);

        field.process_reveal(Pos::new(2, 2), "Host", &mut rng());
        assert_eq!(field.board().iter().filter(|(_, c)| c.mine).count(), 16);
        assert!(field.is_won());
    }

    #[test]
    fn clock_runs_only_mid_game() {
        let mut field = Field::new(params(8, 8, 10));
        assert_eq!(field.tick(), None);
        field.process_reveal(Pos::new(0, 0), "Host", &mut rng());
        if !field.is_game_over() {
            assert_eq!(field.tick(), Some(1));
            assert_eq!(field.tick(), Some(2));
            assert_eq!(field.snapshot().timer, 2);
        }
    }

    proptest! {
        #[test]
        fn first_reveal_is_always_safe(
            rows in 5usize..30,
            cols in 5usize..30,
            mine_ratio in 0.0f64..1.0,
            row in 0usize..30,
            col in 0usize..30,
            seed in any::<u64>(),
        ) {
            let mines = 1 + ((rows * cols - 10) as f64 * mine_ratio) as usize;
            let click = Pos::new(row % rows, col % cols);
            let mut field = Field::new(params(rows, cols, mines));
            field.process_reveal(click, "Host", &mut StdRng::seed_from_u64(seed));

            let board = field.board();
            prop_assert!(!board.get(click).unwrap().mine);
            prop_assert!(board.get(click).unwrap().revealed);
            for neighbor in board.neighbors(click) {
                prop_assert!(!board.get(neighbor).unwrap().mine);
            }
            prop_assert_eq!(board.iter().filter(|(_, c)| c.mine).count(), mines);
        }

        #[test]
        fn flags_and_reveals_never_overlap(
            actions in proptest::collection::vec((any::<bool>(), 0usize..8, 0usize..8), 1..80),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut field = Field::new(params(8, 8, 10));
            for (flag, row, col) in actions {
                let pos = Pos::new(row, col);
                if flag {
                    field.toggle_flag(pos);
                } else {
                    field.process_reveal(pos, "Host", &mut rng);
                }
                assert_no_flagged_reveals(&field);
                let flags = field.board().iter().filter(|(_, c)| c.flagged).count();
                prop_assert_eq!(flags, field.flags_placed());
            }
        }
    }
}

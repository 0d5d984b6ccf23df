use coopsweeper_common::{
    GameError,
    models::{Board, CellUpdate, GameSnapshot, Pos},
    protocol::{Message, MessageHandler, PeerId},
};
use tracing::{debug, info, warn};

/// Events emitted while applying host messages, for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// A full snapshot replaced the board
    Initialized { rows: usize, cols: usize, mines: usize },
    /// Cells changed through a reveal delta
    BoardUpdated { changed: Vec<Pos> },
    /// One flag changed on the board
    FlagChanged { pos: Pos, flagged: bool },
    TimerTick { time: u64 },
    GameOver { win: bool, loser_name: Option<String> },
    Chat { sender: String, message: String },
}

/// Local copy of the host's game, as far as the host has told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub mines: usize,
    pub board: Board,
    pub flags_placed: usize,
    pub timer: u64,
    pub is_first_click: bool,
    pub game_over: bool,
    pub won: bool,
    pub loser_name: Option<String>,
}

impl GameState {
    pub fn from_snapshot(snapshot: GameSnapshot) -> Option<Self> {
        let board = match Board::from_rows(snapshot.board) {
            Ok(board) => board,
            Err(e) => {
                warn!("Rejecting snapshot: {}", e);
                return None;
            }
        };
        if board.rows() != snapshot.rows || board.cols() != snapshot.cols {
            warn!(
                "Rejecting snapshot: header says {}x{}, board is {}x{}",
                snapshot.rows,
                snapshot.cols,
                board.rows(),
                board.cols()
            );
            return None;
        }

        Some(Self {
            mines: snapshot.mines,
            board,
            flags_placed: snapshot.flags_placed,
            timer: snapshot.timer,
            is_first_click: snapshot.is_first_click,
            game_over: snapshot.game_over,
            won: false,
            loser_name: None,
        })
    }

    pub fn rows(&self) -> usize {
        self.board.rows()
    }

    pub fn cols(&self) -> usize {
        self.board.cols()
    }

    /// Mines minus flags; negative when the team over-flags.
    pub fn mines_left(&self) -> i64 {
        self.mines as i64 - self.flags_placed as i64
    }

    /// Apply a reveal delta. All-or-nothing: one out-of-range cell rejects
    /// the whole delta.
    fn apply_reveal(&mut self, cells: &[CellUpdate]) -> Result<Vec<Pos>, GameError> {
        if let Some(bad) = cells.iter().find(|update| !self.board.contains(update.pos())) {
            return Err(GameError::OutOfBounds {
                row: bad.row,
                col: bad.col,
            });
        }

        let mut changed = Vec::with_capacity(cells.len());
        for update in cells {
            if let Some(cell) = self.board.get_mut(update.pos()) {
                *cell = update.cell;
                changed.push(update.pos());
            }
        }
        if !changed.is_empty() {
            self.is_first_click = false;
        }
        Ok(changed)
    }

    fn apply_flag(&mut self, pos: Pos, flagged: bool, flags_placed: usize) -> Result<(), GameError> {
        let cell = self.board.get_mut(pos).ok_or(GameError::OutOfBounds {
            row: pos.row,
            col: pos.col,
        })?;
        cell.flagged = flagged;
        self.flags_placed = flags_placed;
        Ok(())
    }
}

/// Guest-side receiver: keeps a [`GameState`] in step with the host and
/// queues a [`GameEvent`] for every visible change.
#[derive(Debug, Default)]
pub struct Mirror {
    state: Option<GameState>,
    events: Vec<GameEvent>,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; `None` until the first `state` message arrives.
    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Apply one host message.
    pub fn apply(&mut self, message: Message) {
        match message {
            Message::State { state } => self.replace(state),
            Message::Chat {
                message,
                sender_username,
            } => self.events.push(GameEvent::Chat {
                sender: sender_username,
                message,
            }),
            delta => self.apply_delta(delta),
        }
    }

    fn replace(&mut self, snapshot: GameSnapshot) {
        let Some(state) = GameState::from_snapshot(snapshot) else {
            return;
        };
        info!(
            "Board replaced: {}x{} with {} mines",
            state.rows(),
            state.cols(),
            state.mines
        );
        self.events.push(GameEvent::Initialized {
            rows: state.rows(),
            cols: state.cols(),
            mines: state.mines,
        });
        self.state = Some(state);
    }

    fn apply_delta(&mut self, message: Message) {
        let Some(state) = self.state.as_mut() else {
            debug!("Ignoring {} before the first state", message.kind());
            return;
        };

        match message {
            Message::Reveal { cells } => match state.apply_reveal(&cells) {
                Ok(changed) => self.events.push(GameEvent::BoardUpdated { changed }),
                Err(e) => warn!("Rejecting reveal delta: {}", e),
            },
            Message::Flag {
                row,
                col,
                flagged,
                flags_placed,
            } => {
                let pos = Pos::new(row, col);
                match state.apply_flag(pos, flagged, flags_placed) {
                    Ok(()) => self.events.push(GameEvent::FlagChanged { pos, flagged }),
                    Err(e) => warn!("Ignoring flag: {}", e),
                }
            }
            Message::Timer { time } => {
                state.timer = time;
                self.events.push(GameEvent::TimerTick { time });
            }
            Message::GameOver { win, loser_name } => {
                state.game_over = true;
                state.won = win;
                state.loser_name = loser_name.clone();
                self.events.push(GameEvent::GameOver { win, loser_name });
            }
            other => debug!("Ignoring {} message from host", other.kind()),
        }
    }
}

impl MessageHandler for Mirror {
    fn handle_message(&mut self, _from: PeerId, message: Message) {
        self.apply(message);
    }
}

//! Terminal presentation: draws the mirrored board on stdout and turns typed
//! commands into intents.

use std::{collections::BTreeSet, fmt::Write as _, str::FromStr};

use coopsweeper_client::{GameEvent, GameState, Mirror};
use coopsweeper_common::{
    GameError,
    models::{Difficulty, Pos},
    protocol::Message,
    solver,
};
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc::UnboundedReceiver,
};
use tracing::{debug, info, warn};

use crate::{
    config::resolve_params,
    session::{Intent, Role, Session},
};

const HELP: &str = "\
Commands:
  r ROW COL        reveal a cell
  f ROW COL        toggle a flag
  c ROW COL        preview what a chord on a number would open
  say TEXT         chat with the other players
  new [DIFFICULTY] start over (host only): easy, medium, hard or custom ROWS COLS MINES
  assist           toggle the assist overlay
  help             show this list
  quit             leave the game";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reveal(Pos),
    Flag(Pos),
    Chord(Pos),
    Say(String),
    New(Option<Difficulty>),
    Assist,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}', type 'help' for the list")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error(transparent)]
    Difficulty(#[from] GameError),
}

fn number(word: &str) -> Result<usize, ParseError> {
    word.parse()
        .map_err(|_| ParseError::NotANumber(word.to_string()))
}

fn position<'a>(
    mut args: impl Iterator<Item = &'a str>,
    usage: &'static str,
) -> Result<Pos, ParseError> {
    match (args.next(), args.next(), args.next()) {
        (Some(row), Some(col), None) => Ok(Pos::new(number(row)?, number(col)?)),
        _ => Err(ParseError::Usage(usage)),
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, ParseError> {
        let line = line.trim();
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let args = rest.split_whitespace();

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "r" | "reveal" => position(args, "r ROW COL").map(Command::Reveal),
            "f" | "flag" => position(args, "f ROW COL").map(Command::Flag),
            "c" | "chord" => position(args, "c ROW COL").map(Command::Chord),
            "say" => match rest.trim() {
                "" => Err(ParseError::Usage("say TEXT")),
                text => Ok(Command::Say(text.to_string())),
            },
            "new" => {
                let words: Vec<&str> = args.collect();
                match words.as_slice() {
                    [] => Ok(Command::New(None)),
                    [name] if name.eq_ignore_ascii_case("custom") => {
                        Err(ParseError::Usage("new custom ROWS COLS MINES"))
                    }
                    [name] => Ok(Command::New(Some(name.parse()?))),
                    [name, rows, cols, mines] if name.eq_ignore_ascii_case("custom") => {
                        Ok(Command::New(Some(Difficulty::Custom {
                            rows: number(rows)?,
                            cols: number(cols)?,
                            mines: number(mines)?,
                        })))
                    }
                    _ => Err(ParseError::Usage("new [DIFFICULTY]")),
                }
            }
            "assist" => Ok(Command::Assist),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// Extra marks drawn over the board.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub assist: bool,
    /// Known mine locations; only the host has these before the game ends.
    pub mines: BTreeSet<Pos>,
    /// Guessing cells from the authoritative board. Without them the
    /// overlay falls back to what the mirror alone can decide.
    pub guessing: Option<BTreeSet<Pos>>,
    pub preview: BTreeSet<Pos>,
}

fn symbol(state: &GameState, pos: Pos, overlay: &Overlay, guessing: &BTreeSet<Pos>) -> char {
    let Some(cell) = state.board.get(pos) else {
        return ' ';
    };

    if cell.revealed {
        return match cell.count {
            _ if cell.mine => '*',
            0 => '.',
            n => char::from_digit(u32::from(n), 10).unwrap_or('?'),
        };
    }
    if overlay.preview.contains(&pos) {
        return '+';
    }
    if cell.flagged {
        return 'F';
    }
    if state.game_over && cell.mine {
        return '*';
    }
    if overlay.assist && overlay.mines.contains(&pos) {
        return 'x';
    }
    if overlay.assist && guessing.contains(&pos) {
        return '?';
    }
    '#'
}

fn status(state: &GameState) -> String {
    match (state.game_over, state.won, &state.loser_name) {
        (false, _, _) if state.is_first_click => "Reveal any cell to start".to_string(),
        (false, _, _) => "Playing".to_string(),
        (true, true, _) => "Cleared! Everyone wins".to_string(),
        (true, false, Some(loser)) => format!("{} hit a mine. Game over", loser),
        (true, false, None) => "Game over".to_string(),
    }
}

/// Draw the board with a header line and row/column labels.
pub fn render(state: &GameState, overlay: &Overlay) -> String {
    let guessing = match &overlay.guessing {
        _ if !overlay.assist || state.game_over => BTreeSet::new(),
        Some(guessing) => guessing.clone(),
        None => solver::undetermined_cells(&state.board),
    };

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Mines left: {}   Time: {}s   {}",
        state.mines_left(),
        state.timer,
        status(state)
    );

    out.push_str("   ");
    for col in 0..state.cols() {
        let _ = write!(out, "{:>3}", col);
    }
    out.push('\n');

    for row in 0..state.rows() {
        let _ = write!(out, "{:>3}", row);
        for col in 0..state.cols() {
            let _ = write!(out, "{:>3}", symbol(state, Pos::new(row, col), overlay, &guessing));
        }
        out.push('\n');
    }
    out
}

enum Flow {
    Continue,
    Redraw,
    Quit,
}

/// Terminal front end for either role.
pub struct Console {
    session: Session,
    mirror: Mirror,
    overlay: Overlay,
    default_difficulty: Difficulty,
}

impl Console {
    pub fn new(session: Session, default_difficulty: Difficulty) -> Self {
        Self {
            session,
            mirror: Mirror::new(),
            overlay: Overlay::default(),
            default_difficulty,
        }
    }

    pub fn state(&self) -> Option<&GameState> {
        self.mirror.state()
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Read commands from stdin and host messages from `updates` until the
    /// player quits or the link to the game closes.
    pub async fn run(mut self, mut updates: UnboundedReceiver<Message>) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("{}", HELP);

        loop {
            tokio::select! {
                message = updates.recv() => {
                    let Some(message) = message else {
                        println!("Disconnected from the game");
                        break;
                    };
                    let redraw = self.receive(message);
                    if redraw {
                        self.draw().await;
                    }
                }
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Failed to read from stdin: {}", e);
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let command = match line.parse::<Command>() {
                        Ok(command) => command,
                        Err(e) => {
                            println!("{}", e);
                            continue;
                        }
                    };
                    match self.execute(command) {
                        Ok(Flow::Quit) => break,
                        Ok(Flow::Redraw) => self.draw().await,
                        Ok(Flow::Continue) => {}
                        Err(message) => println!("{}", message),
                    }
                }
            }
        }
        info!("{} left the game", self.session.username());
    }

    /// Apply one host message. Returns whether the board needs redrawing.
    fn receive(&mut self, message: Message) -> bool {
        self.mirror.apply(message);
        let mut redraw = false;
        for event in self.mirror.take_events() {
            debug!("{:?}", event);
            match event {
                GameEvent::Chat { sender, message } => println!("<{}> {}", sender, message),
                GameEvent::GameOver { win: true, .. } => {
                    println!("All safe cells are open. You win!");
                    redraw = true;
                }
                GameEvent::GameOver {
                    win: false,
                    loser_name,
                } => {
                    match loser_name {
                        Some(name) => println!("{} revealed a mine.", name),
                        None => println!("A mine went off."),
                    }
                    redraw = true;
                }
                GameEvent::Initialized { .. } => {
                    self.overlay.preview.clear();
                    self.overlay.mines.clear();
                    self.overlay.guessing = None;
                    redraw = true;
                }
                GameEvent::BoardUpdated { .. } | GameEvent::FlagChanged { .. } => {
                    self.overlay.preview.clear();
                    redraw = true;
                }
                GameEvent::TimerTick { .. } => {}
            }
        }
        redraw
    }

    fn execute(&mut self, command: Command) -> Result<Flow, String> {
        let intent = match command {
            Command::Reveal(pos) => Intent::Reveal(pos),
            Command::Flag(pos) => Intent::ToggleFlag(pos),
            Command::Say(text) => Intent::Chat(text),
            Command::New(difficulty) => {
                Intent::Restart(resolve_params(difficulty.unwrap_or(self.default_difficulty)))
            }
            Command::Chord(pos) => {
                let state = self.mirror.state().ok_or("No board yet")?;
                let targets = state.board.chord_targets(pos).unwrap_or_default();
                if targets.is_empty() {
                    println!("A chord on {} would open nothing", pos);
                }
                self.overlay.preview = targets.into_iter().collect();
                self.print();
                return Ok(Flow::Continue);
            }
            Command::Assist => {
                self.overlay.assist = !self.overlay.assist;
                println!(
                    "Assist overlay {}",
                    if self.overlay.assist { "on" } else { "off" }
                );
                return Ok(Flow::Redraw);
            }
            Command::Help => {
                println!("{}", HELP);
                return Ok(Flow::Continue);
            }
            Command::Quit => return Ok(Flow::Quit),
        };

        self.session.submit(intent).map_err(|e| e.to_string())?;
        Ok(Flow::Continue)
    }

    async fn draw(&mut self) {
        if self.overlay.assist
            && let Role::Hosting(handle) = self.session.role()
            && let Some(assist) = handle.assist().await
        {
            self.overlay.mines = assist.mines;
            self.overlay.guessing = Some(assist.guessing);
        }
        self.print();
    }

    fn print(&self) {
        if let Some(state) = self.mirror.state() {
            println!("{}", render(state, &self.overlay));
        }
    }
}

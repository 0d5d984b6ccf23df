use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use coopsweeper::{
    config::{Settings, resolve_params},
    console::Console,
    routes::{Sessions, register_session, session_info, websocket_handler},
    session::{Session, host::HostSession},
};
use coopsweeper_client::{GuestWebSocket, Result, SessionClient};
use coopsweeper_common::models::{Difficulty, GameParams};
use dashmap::DashMap;
use rocket::routes;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "coopsweeper", version, about = "Cooperative minesweeper over the network")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Clone, Copy, ValueEnum)]
enum Level {
    Easy,
    Medium,
    Hard,
    Custom,
}

#[derive(Subcommand)]
enum Mode {
    /// Host a new game and wait for guests
    Host {
        #[arg(long, value_enum)]
        difficulty: Option<Level>,
        /// Board height for a custom game
        #[arg(long)]
        rows: Option<usize>,
        /// Board width for a custom game
        #[arg(long)]
        cols: Option<usize>,
        /// Mine count for a custom game
        #[arg(long)]
        mines: Option<usize>,
        #[arg(long)]
        username: Option<String>,
    },
    /// Join a game someone else is hosting
    Join {
        /// Host address, e.g. http://192.168.1.20:8000
        url: String,
        /// Session code shown by the host
        session: String,
        #[arg(long)]
        username: Option<String>,
    },
}

fn difficulty(
    level: Option<Level>,
    rows: Option<usize>,
    cols: Option<usize>,
    mines: Option<usize>,
    fallback: Difficulty,
) -> Difficulty {
    let custom = || {
        let defaults = GameParams::default();
        Difficulty::Custom {
            rows: rows.unwrap_or(defaults.rows),
            cols: cols.unwrap_or(defaults.cols),
            mines: mines.unwrap_or(defaults.mines),
        }
    };

    match level {
        Some(Level::Easy) => Difficulty::Easy,
        Some(Level::Medium) => Difficulty::Medium,
        Some(Level::Hard) => Difficulty::Hard,
        Some(Level::Custom) => custom(),
        None if rows.is_some() || cols.is_some() || mines.is_some() => custom(),
        None => fallback,
    }
}

fn username(given: Option<String>) -> String {
    given
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Player{}", rand::random_range(0..1000)))
}

async fn host(username: String, params: GameParams, settings: Settings) -> Result<()> {
    let sessions: Sessions = Arc::new(DashMap::new());

    let mut spawned = None;
    let id = register_session(&sessions, settings.session_id_length, |id| {
        let (handle, view) = HostSession::spawn(id, username.clone(), params, settings.clone());
        spawned = Some((handle.clone(), view));
        handle
    });
    let Some((handle, view)) = spawned else {
        return Err("Session failed to start".into());
    };

    let mut session = Session::new(username);
    session.host(handle)?;

    let rocket = rocket::build()
        .manage(sessions)
        .mount("/", routes![session_info, websocket_handler])
        .ignite()
        .await
        .map_err(|e| e.to_string())?;

    let config = rocket.config();
    println!(
        "Hosting session {} on http://{}:{} ({}x{}, {} mines)",
        id, config.address, config.port, params.rows, params.cols, params.mines
    );

    let shutdown = rocket.shutdown();
    let console = Console::new(session, settings.default_difficulty);
    tokio::spawn(async move {
        console.run(view).await;
        shutdown.notify();
    });

    rocket.launch().await.map_err(|e| e.to_string())?;
    info!("Session {} closed", id);
    Ok(())
}

async fn join(url: String, session_id: String, username: String, settings: Settings) -> Result<()> {
    let client = SessionClient::new(&url)?;
    let info = client.lookup(&session_id).await?;
    println!(
        "Joining session {}: {}x{} with {} mines, {} player(s) already in",
        info.id, info.rows, info.cols, info.mines, info.players
    );

    let ws = GuestWebSocket::connect(&client.websocket_url(&session_id, &username)?).await?;
    let (link, updates) = ws.into_channels();

    let mut session = Session::new(username);
    session.join(link)?;
    Console::new(session, settings.default_difficulty)
        .run(updates)
        .await;
    Ok(())
}

#[rocket::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match cli.mode {
        Mode::Host {
            difficulty: level,
            rows,
            cols,
            mines,
            username: name,
        } => {
            let params = resolve_params(difficulty(
                level,
                rows,
                cols,
                mines,
                settings.default_difficulty,
            ));
            host(username(name), params, settings).await
        }
        Mode::Join {
            url,
            session,
            username: name,
        } => join(url, session, username(name), settings).await,
    }
}

use coopsweeper_client::{GameEvent, GuestWebSocket, Message, Mirror, Pos, SessionClient};

/// Join a hosted session, open the top-left corner and print what happens.
///
/// Usage: cargo run -p coopsweeper-client --example follow_session -- http://localhost:8000 K7QX2
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let url = args.next().unwrap_or_else(|| "http://localhost:8000".to_string());
    let session_id = args.next().ok_or("missing session code")?;

    let client = SessionClient::new(&url)?;
    let info = client.lookup(&session_id).await?;
    println!(
        "Session {}: {}x{} with {} mines, {} player(s)",
        info.id, info.rows, info.cols, info.mines, info.players
    );

    let ws = GuestWebSocket::connect(&client.websocket_url(&session_id, "Watcher")?).await?;
    let (to_host, mut from_host) = ws.into_channels();
    let mut mirror = Mirror::new();
    let mut clicked = false;

    while let Some(message) = from_host.recv().await {
        mirror.apply(message);
        for event in mirror.take_events() {
            match event {
                GameEvent::Initialized { rows, cols, mines } => {
                    println!("Board {}x{} with {} mines", rows, cols, mines);
                    if !clicked {
                        to_host.send(Message::click(Pos::new(0, 0)))?;
                        clicked = true;
                    }
                }
                GameEvent::BoardUpdated { changed } => {
                    println!("{} cell(s) opened", changed.len());
                }
                GameEvent::FlagChanged { pos, flagged } => {
                    println!("Flag at {} is now {}", pos, if flagged { "set" } else { "cleared" });
                }
                GameEvent::TimerTick { time } => println!("{}s", time),
                GameEvent::Chat { sender, message } => println!("<{}> {}", sender, message),
                GameEvent::GameOver { win, loser_name } => {
                    match (win, loser_name) {
                        (true, _) => println!("Board cleared"),
                        (false, Some(name)) => println!("{} hit a mine", name),
                        (false, None) => println!("Game over"),
                    }
                    return Ok(());
                }
            }
        }
    }

    println!("Host closed the connection");
    Ok(())
}

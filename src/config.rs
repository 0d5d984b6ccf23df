use std::{env, time::Duration};

use coopsweeper_common::models::{Difficulty, GameParams};
use tracing::warn;

/// Runtime knobs read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tick_interval: Duration,
    pub session_id_length: usize,
    pub default_difficulty: Difficulty,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(1000),
            session_id_length: 5,
            default_difficulty: Difficulty::Medium,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let tick_millis: u64 = env::var("COOP_TICK_MILLIS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .unwrap_or(1000);

        let session_id_length: usize = env::var("COOP_SESSION_ID_LENGTH")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let default_difficulty = env::var("COOP_DEFAULT_DIFFICULTY")
            .ok()
            .and_then(|value| match value.parse() {
                Ok(difficulty) => Some(difficulty),
                Err(e) => {
                    warn!("Ignoring COOP_DEFAULT_DIFFICULTY: {}", e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            tick_interval: Duration::from_millis(tick_millis.max(1)),
            session_id_length: session_id_length.max(1),
            default_difficulty,
        }
    }
}

/// Resolve a difficulty, falling back to the default board when custom
/// values are out of range.
pub fn resolve_params(difficulty: Difficulty) -> GameParams {
    difficulty.params().unwrap_or_else(|e| {
        let fallback = GameParams::default();
        warn!(
            "{}, falling back to {}x{} with {} mines",
            e, fallback.rows, fallback.cols, fallback.mines
        );
        fallback
    })
}

use std::time::Duration;

use tokio::{
    sync::mpsc::WeakUnboundedSender,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::debug;

use crate::session::host::HostEvent;

/// Once-per-period game clock for one board generation.
///
/// Dropping the clock stops it. Ticks already queued carry their
/// generation so the session can discard them after a re-init.
pub struct GameClock {
    generation: u64,
    task: JoinHandle<()>,
}

impl GameClock {
    pub fn start(
        generation: u64,
        period: Duration,
        events: WeakUnboundedSender<HostEvent>,
    ) -> Self {
        debug!("Starting game clock for generation {}", generation);
        let mut interval = time::interval_at(Instant::now() + period, period);

        let task = tokio::spawn(async move {
            loop {
                interval.tick().await;
                let Some(events) = events.upgrade() else {
                    break;
                };
                if events.send(HostEvent::Tick { generation }).is_err() {
                    break;
                }
            }
        });

        Self { generation, task }
    }
}

impl Drop for GameClock {
    fn drop(&mut self) {
        debug!("Stopping game clock for generation {}", self.generation);
        self.task.abort();
    }
}

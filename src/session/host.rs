use std::collections::BTreeSet;

use coopsweeper_common::{
    models::{GameParams, Pos, SessionInfo},
    protocol::{Message, MessageHandler, PeerId},
    solver,
};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
    oneshot,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::GameClock,
    config::Settings,
    logic::{Change, Field},
    session::{Intent, peers::ConnectionSet},
};

/// Name used for losses when the actor is unknown.
const UNKNOWN_PLAYER: &str = "Someone";

/// Everything that can happen to a hosted session.
#[derive(Debug)]
pub enum HostEvent {
    Connected {
        peer: PeerId,
        username: String,
        outbox: UnboundedSender<Message>,
    },
    Closed {
        peer: PeerId,
    },
    Data {
        peer: PeerId,
        message: Message,
    },
    Local(Intent),
    Tick {
        generation: u64,
    },
    Describe {
        reply: oneshot::Sender<SessionInfo>,
    },
    Assist {
        reply: oneshot::Sender<AssistView>,
    },
}

/// Overlay data only the authoritative board can provide.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistView {
    pub mines: BTreeSet<Pos>,
    pub guessing: BTreeSet<Pos>,
}

/// Cloneable way into a running session's event loop.
#[derive(Debug, Clone)]
pub struct HostHandle {
    id: String,
    events: UnboundedSender<HostEvent>,
}

impl HostHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }

    pub fn connect(&self, peer: PeerId, username: String, outbox: UnboundedSender<Message>) -> bool {
        self.events
            .send(HostEvent::Connected {
                peer,
                username,
                outbox,
            })
            .is_ok()
    }

    pub fn deliver(&self, peer: PeerId, message: Message) -> bool {
        self.events.send(HostEvent::Data { peer, message }).is_ok()
    }

    pub fn disconnect(&self, peer: PeerId) {
        let _ = self.events.send(HostEvent::Closed { peer });
    }

    pub fn submit(&self, intent: Intent) -> bool {
        self.events.send(HostEvent::Local(intent)).is_ok()
    }

    pub async fn describe(&self) -> Option<SessionInfo> {
        let (reply, response) = oneshot::channel();
        self.events.send(HostEvent::Describe { reply }).ok()?;
        response.await.ok()
    }

    pub async fn assist(&self) -> Option<AssistView> {
        let (reply, response) = oneshot::channel();
        self.events.send(HostEvent::Assist { reply }).ok()?;
        response.await.ok()
    }
}

/// Owner of the authoritative board for one hosted game.
///
/// Runs inside a single task and reacts to one [`HostEvent`] at a time, so
/// every mutation and the broadcast it causes happen in the same order
/// guests observe them.
pub struct HostSession {
    id: String,
    username: String,
    field: Field,
    peers: ConnectionSet,
    viewer: Option<UnboundedSender<Message>>,
    clock: Option<GameClock>,
    generation: u64,
    settings: Settings,
    events: WeakUnboundedSender<HostEvent>,
}

impl HostSession {
    pub fn new(
        id: String,
        username: String,
        params: GameParams,
        settings: Settings,
        events: WeakUnboundedSender<HostEvent>,
    ) -> Self {
        info!(
            "Creating session {}: {}x{} with {} mines",
            id, params.rows, params.cols, params.mines
        );
        Self {
            id,
            username,
            field: Field::new(params),
            peers: ConnectionSet::new(),
            viewer: None,
            clock: None,
            generation: 0,
            settings,
            events,
        }
    }

    /// Spawn the event loop. The returned receiver gets every broadcast,
    /// starting with the initial `state`, for the host's own view.
    pub fn spawn(
        id: String,
        username: String,
        params: GameParams,
        settings: Settings,
    ) -> (HostHandle, UnboundedReceiver<Message>) {
        let (events, inbox) = mpsc::unbounded_channel();
        let (viewer, view) = mpsc::unbounded_channel();

        let mut session = HostSession::new(id.clone(), username, params, settings, events.downgrade());
        session.attach_viewer(viewer);
        tokio::spawn(session.run(inbox));

        (HostHandle { id, events }, view)
    }

    pub fn attach_viewer(&mut self, viewer: UnboundedSender<Message>) {
        let _ = viewer.send(Message::State {
            state: self.field.snapshot(),
        });
        self.viewer = Some(viewer);
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn info(&self) -> SessionInfo {
        let params = self.field.params();
        SessionInfo {
            id: self.id.clone(),
            rows: params.rows,
            cols: params.cols,
            mines: params.mines,
            players: self.peers.len() + 1,
        }
    }

    /// Mine locations and guessing cells of the live board.
    pub fn assist(&self) -> AssistView {
        let board = self.field.board();
        AssistView {
            mines: board
                .iter()
                .filter(|(_, cell)| cell.mine)
                .map(|(pos, _)| pos)
                .collect(),
            guessing: solver::guessing_cells(board),
        }
    }

    pub async fn run(mut self, mut events: UnboundedReceiver<HostEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        info!("Session {} closed", self.id);
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Connected {
                peer,
                username,
                outbox,
            } => self.add_peer(peer, username, outbox),
            HostEvent::Closed { peer } => {
                self.peers.remove(&peer);
            }
            HostEvent::Data { peer, message } => self.handle_message(peer, message),
            HostEvent::Local(intent) => {
                let actor = self.username.clone();
                self.apply_intent(intent, &actor, None);
            }
            HostEvent::Tick { generation } => self.tick(generation),
            HostEvent::Describe { reply } => {
                let _ = reply.send(self.info());
            }
            HostEvent::Assist { reply } => {
                let _ = reply.send(self.assist());
            }
        }
    }

    #[instrument(level = "trace", skip(self, outbox))]
    fn add_peer(&mut self, peer: PeerId, username: String, outbox: UnboundedSender<Message>) {
        info!("{} joined session {} as peer {}", username, self.id, peer);
        self.peers.insert(peer, username, outbox);
        self.peers.send_to(
            &peer,
            Message::State {
                state: self.field.snapshot(),
            },
        );
    }

    fn apply_intent(&mut self, intent: Intent, actor: &str, source: Option<&PeerId>) {
        match intent {
            Intent::Reveal(pos) => self.reveal(pos, actor),
            Intent::ToggleFlag(pos) => self.flag(pos),
            Intent::Chat(message) => self.chat(message, actor, source),
            Intent::Restart(params) => self.restart(params),
        }
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    fn reveal(&mut self, pos: Pos, actor: &str) {
        if !self.field.board().contains(pos) {
            warn!("Invalid reveal position {} from {}", pos, actor);
            return;
        }
        if self.field.is_game_over() {
            debug!("Ignoring reveal at {} on finished game", pos);
            return;
        }

        let changes = self.field.process_reveal(pos, actor, &mut rand::rng());
        self.publish(changes);
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    fn flag(&mut self, pos: Pos) {
        match self.field.toggle_flag(pos) {
            Some(change) => self.publish(vec![change]),
            None => debug!("Ignoring flag at {}", pos),
        }
    }

    fn chat(&mut self, message: String, sender: &str, source: Option<&PeerId>) {
        debug!("{} says: {}", sender, message);
        let chat = Message::Chat {
            message,
            sender_username: sender.to_string(),
        };
        self.peers.broadcast_except(source, &chat);
        self.show(chat);
    }

    #[instrument(level = "trace", skip(self))]
    fn restart(&mut self, params: GameParams) {
        info!(
            "Restarting session {}: {}x{} with {} mines",
            self.id, params.rows, params.cols, params.mines
        );
        self.clock = None;
        self.generation += 1;
        self.field = Field::new(params);
        self.broadcast(Message::State {
            state: self.field.snapshot(),
        });
        info!("Board re-initialized and sent to {} guests", self.peers.len());
    }

    fn tick(&mut self, generation: u64) {
        if generation != self.generation {
            debug!(
                "Dropping tick from generation {} (current {})",
                generation, self.generation
            );
            return;
        }
        if let Some(time) = self.field.tick() {
            self.broadcast(Message::Timer { time });
        }
    }

    /// Turn engine changes into messages, in the order they happened.
    fn publish(&mut self, changes: Vec<Change>) {
        for change in changes {
            match change {
                Change::Revealed(cells) => {
                    if !cells.is_empty() {
                        debug!("Revealed {} cells", cells.len());
                        self.broadcast(Message::Reveal { cells });
                    }
                }
                Change::Flagged {
                    pos,
                    flagged,
                    flags_placed,
                } => self.broadcast(Message::Flag {
                    row: pos.row,
                    col: pos.col,
                    flagged,
                    flags_placed,
                }),
                Change::Started => {
                    self.clock = Some(GameClock::start(
                        self.generation,
                        self.settings.tick_interval,
                        self.events.clone(),
                    ));
                }
                Change::Ended { win, loser } => {
                    self.clock = None;
                    if !win {
                        self.broadcast(Message::State {
                            state: self.field.snapshot(),
                        });
                    }
                    self.broadcast(Message::GameOver {
                        win,
                        loser_name: loser,
                    });
                }
            }
        }
    }

    fn broadcast(&mut self, message: Message) {
        self.peers.broadcast(&message);
        self.show(message);
    }

    fn show(&mut self, message: Message) {
        if let Some(viewer) = &self.viewer
            && viewer.send(message).is_err()
        {
            debug!("Host view closed");
            self.viewer = None;
        }
    }
}

impl MessageHandler for HostSession {
    fn handle_message(&mut self, from: PeerId, message: Message) {
        let Some(username) = self.peers.username(&from).map(str::to_string) else {
            warn!("Message from unknown peer {}", from);
            return;
        };

        match message {
            Message::Click { row, col } => {
                debug!("{} reveals ({}, {})", username, row, col);
                self.apply_intent(Intent::Reveal(Pos::new(row, col)), &username, Some(&from));
            }
            Message::Flag { row, col, .. } => {
                debug!("{} flags ({}, {})", username, row, col);
                self.apply_intent(Intent::ToggleFlag(Pos::new(row, col)), &username, Some(&from));
            }
            Message::Chat { message, .. } => {
                self.apply_intent(Intent::Chat(message), &username, Some(&from));
            }
            other => {
                debug!("Ignoring {} message from guest {}", other.kind(), username);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coopsweeper_common::models::CellUpdate;
    use uuid::Uuid;

    struct Harness {
        session: HostSession,
        view: UnboundedReceiver<Message>,
        _events: UnboundedSender<HostEvent>,
        events_rx: UnboundedReceiver<HostEvent>,
    }

    fn harness(params: GameParams) -> Harness {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (viewer, view) = mpsc::unbounded_channel();
        let mut session = HostSession::new(
            "ABCDE".to_string(),
            "Host".to_string(),
            params,
            Settings::default(),
            events.downgrade(),
        );
        session.attach_viewer(viewer);
        Harness {
            session,
            view,
            _events: events,
            events_rx,
        }
    }

    fn join(session: &mut HostSession, name: &str) -> (PeerId, UnboundedReceiver<Message>) {
        let peer = Uuid::new_v4();
        let (outbox, inbox) = mpsc::unbounded_channel();
        session.handle_event(HostEvent::Connected {
            peer,
            username: name.to_string(),
            outbox,
        });
        (peer, inbox)
    }

    fn drain(rx: &mut UnboundedReceiver<Message>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn easy() -> GameParams {
        GameParams {
            rows: 8,
            cols: 8,
            mines: 10,
        }
    }

    #[tokio::test]
    async fn new_guest_gets_full_state() {
        let mut h = harness(easy());
        let (_, mut inbox) = join(&mut h.session, "Ana");

        match drain(&mut inbox).as_slice() {
            [Message::State { state }] => {
                assert_eq!((state.rows, state.cols, state.mines), (8, 8, 10));
                assert!(state.is_first_click);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
        assert!(matches!(drain(&mut h.view).as_slice(), [Message::State { .. }]));
        assert_eq!(h.session.info().players, 2);
    }

    #[tokio::test]
    async fn guest_click_is_applied_and_broadcast() {
        let mut h = harness(easy());
        let (ana, mut ana_inbox) = join(&mut h.session, "Ana");
        let (_, mut bo_inbox) = join(&mut h.session, "Bo");
        drain(&mut ana_inbox);
        drain(&mut bo_inbox);
        drain(&mut h.view);

        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::Click { row: 4, col: 4 },
        });

        assert!(!h.session.field().is_first_click());
        for inbox in [&mut ana_inbox, &mut bo_inbox, &mut h.view] {
            let messages = drain(inbox);
            match messages.first() {
                Some(Message::Reveal { cells }) => {
                    assert_eq!(cells[0].pos(), Pos::new(4, 4));
                    assert!(cells.iter().all(|update| update.cell.revealed));
                }
                other => panic!("expected reveal, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn flag_request_is_echoed_with_count() {
        let mut h = harness(easy());
        h.session.field = Field::from_layout(5, 5, &[Pos::new(0, 0)]);
        let (ana, mut inbox) = join(&mut h.session, "Ana");
        drain(&mut inbox);

        let target = Pos::new(0, 0);
        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::flag_request(target),
        });

        assert_eq!(
            drain(&mut inbox),
            vec![Message::Flag {
                row: target.row,
                col: target.col,
                flagged: true,
                flags_placed: 1
            }]
        );
    }

    #[tokio::test]
    async fn flag_before_first_reveal_sends_nothing() {
        let mut h = harness(easy());
        let (ana, mut inbox) = join(&mut h.session, "Ana");
        drain(&mut inbox);

        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::flag_request(Pos::new(0, 0)),
        });
        assert!(drain(&mut inbox).is_empty());
        assert_eq!(h.session.field().flags_placed(), 0);
    }

    #[tokio::test]
    async fn loss_sends_state_then_game_over() {
        let mut h = harness(easy());
        h.session.field = Field::from_layout(5, 5, &[Pos::new(0, 0)]);
        let (ana, mut inbox) = join(&mut h.session, "Ana");
        drain(&mut inbox);

        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::Click { row: 0, col: 0 },
        });

        match drain(&mut inbox).as_slice() {
            [Message::State { state }, Message::GameOver { win, loser_name }] => {
                assert!(state.game_over);
                assert!(state.board[0][0].revealed);
                assert!(!win);
                assert_eq!(loser_name.as_deref(), Some("Ana"));
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test]
    async fn win_sends_reveal_then_game_over() {
        let mut h = harness(easy());
        h.session.field = Field::from_layout(5, 5, &[Pos::new(0, 0)]);
        let (_, mut inbox) = join(&mut h.session, "Ana");
        drain(&mut inbox);

        h.session
            .handle_event(HostEvent::Local(Intent::Reveal(Pos::new(4, 4))));

        match drain(&mut inbox).as_slice() {
            [Message::Reveal { cells }, Message::GameOver { win, loser_name }] => {
                assert_eq!(cells.len(), 24);
                assert!(*win);
                assert_eq!(*loser_name, None);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test]
    async fn ticks_follow_the_current_generation() {
        let mut h = harness(easy());
        let (_, mut inbox) = join(&mut h.session, "Ana");
        h.session.handle_event(HostEvent::Tick { generation: 0 });
        assert_eq!(drain(&mut inbox).len(), 1, "no ticks before the first reveal");

        h.session
            .handle_event(HostEvent::Local(Intent::Reveal(Pos::new(4, 4))));
        drain(&mut inbox);
        if h.session.field().is_game_over() {
            return;
        }

        h.session.handle_event(HostEvent::Tick { generation: 0 });
        assert_eq!(drain(&mut inbox), vec![Message::Timer { time: 1 }]);

        h.session
            .handle_event(HostEvent::Local(Intent::Restart(easy())));
        assert_eq!(h.session.generation(), 1);
        drain(&mut inbox);

        h.session.handle_event(HostEvent::Tick { generation: 0 });
        assert!(drain(&mut inbox).is_empty());
        assert_eq!(h.session.field().timer(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_posts_ticks_after_first_reveal() {
        let mut h = harness(easy());
        h.session
            .handle_event(HostEvent::Local(Intent::Reveal(Pos::new(4, 4))));
        if h.session.field().is_game_over() {
            return;
        }

        match h.events_rx.recv().await {
            Some(HostEvent::Tick { generation }) => {
                h.session.handle_event(HostEvent::Tick { generation });
            }
            other => panic!("expected tick, got {:?}", other),
        }
        assert_eq!(h.session.field().timer(), 1);
        assert!(drain(&mut h.view).contains(&Message::Timer { time: 1 }));
    }

    #[tokio::test]
    async fn chat_is_relayed_to_everyone_else() {
        let mut h = harness(easy());
        let (ana, mut ana_inbox) = join(&mut h.session, "Ana");
        let (_, mut bo_inbox) = join(&mut h.session, "Bo");
        drain(&mut ana_inbox);
        drain(&mut bo_inbox);
        drain(&mut h.view);

        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::Chat {
                message: "left side is clear".to_string(),
                sender_username: "Mallory".to_string(),
            },
        });

        let expected = Message::Chat {
            message: "left side is clear".to_string(),
            sender_username: "Ana".to_string(),
        };
        assert!(drain(&mut ana_inbox).is_empty());
        assert_eq!(drain(&mut bo_inbox), vec![expected.clone()]);
        assert_eq!(drain(&mut h.view), vec![expected]);
    }

    #[tokio::test]
    async fn host_only_messages_from_guests_are_ignored() {
        let mut h = harness(easy());
        let (ana, mut inbox) = join(&mut h.session, "Ana");
        drain(&mut inbox);

        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::Reveal {
                cells: vec![CellUpdate {
                    row: 0,
                    col: 0,
                    cell: Default::default(),
                }],
            },
        });
        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::Timer { time: 99 },
        });

        assert!(drain(&mut inbox).is_empty());
        assert_eq!(h.session.field().timer(), 0);
        assert!(h.session.field().is_first_click());
    }

    #[tokio::test]
    async fn closed_peer_stops_receiving() {
        let mut h = harness(easy());
        let (ana, mut inbox) = join(&mut h.session, "Ana");
        drain(&mut inbox);

        h.session.handle_event(HostEvent::Closed { peer: ana });
        h.session
            .handle_event(HostEvent::Local(Intent::Reveal(Pos::new(4, 4))));

        assert!(drain(&mut inbox).is_empty());
        assert_eq!(h.session.info().players, 1);

        h.session.handle_event(HostEvent::Data {
            peer: ana,
            message: Message::Click { row: 0, col: 0 },
        });
    }

    #[tokio::test]
    async fn close_after_failed_send_is_quiet() {
        let mut h = harness(easy());
        let (ana, inbox) = join(&mut h.session, "Ana");
        drop(inbox);

        h.session
            .handle_event(HostEvent::Local(Intent::Reveal(Pos::new(4, 4))));
        assert_eq!(h.session.info().players, 1);

        h.session.handle_event(HostEvent::Closed { peer: ana });
        assert_eq!(h.session.info().players, 1);
    }

    #[tokio::test]
    async fn restart_broadcasts_fresh_state() {
        let mut h = harness(easy());
        let (_, mut inbox) = join(&mut h.session, "Ana");
        h.session
            .handle_event(HostEvent::Local(Intent::Reveal(Pos::new(4, 4))));
        drain(&mut inbox);

        let hard = GameParams {
            rows: 20,
            cols: 20,
            mines: 60,
        };
        h.session.handle_event(HostEvent::Local(Intent::Restart(hard)));

        match drain(&mut inbox).as_slice() {
            [Message::State { state }] => {
                assert_eq!((state.rows, state.cols, state.mines), (20, 20, 60));
                assert!(state.is_first_click);
                assert!(!state.game_over);
                assert!(state.board.iter().flatten().all(|cell| !cell.revealed));
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[tokio::test]
    async fn handle_answers_describe_requests() {
        let (handle, mut view) = HostSession::spawn(
            "QWERT".to_string(),
            "Host".to_string(),
            easy(),
            Settings::default(),
        );
        assert!(matches!(view.recv().await, Some(Message::State { .. })));

        let info = handle.describe().await.unwrap();
        assert_eq!(info.id, "QWERT");
        assert_eq!((info.rows, info.mines, info.players), (8, 10, 1));

        assert!(handle.submit(Intent::Reveal(Pos::new(0, 0))));
        assert!(matches!(view.recv().await, Some(Message::Reveal { .. })));
    }

    #[tokio::test]
    async fn assist_reads_the_live_board() {
        let (handle, mut view) = HostSession::spawn(
            "MINES".to_string(),
            "Host".to_string(),
            easy(),
            Settings::default(),
        );
        assert!(matches!(view.recv().await, Some(Message::State { .. })));
        assert!(handle.assist().await.unwrap().mines.is_empty());

        handle.submit(Intent::Reveal(Pos::new(0, 0)));
        let assist = handle.assist().await.unwrap();
        assert_eq!(assist.mines.len(), 10);
        assert!(assist.mines.iter().all(|pos| pos.row > 1 || pos.col > 1));
        assert!(assist.guessing.is_disjoint(&assist.mines));
    }
}

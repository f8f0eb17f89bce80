use crate::lobby::{RoomManager, MAX_ROOM_CAPACITY, MIN_ROOM_CAPACITY};
use crate::player::Player;
use crate::protocol::{self, MsgKind};
use hashbrown::HashMap;
use keel::logging::{self, Logger};
use spindle::frame::{Header, HEADER_SIZE};
use spindle::{IoEngine, NetEvent, NetResult, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Replies produced by one handled event, in send order.
pub type Outbound = Vec<(SessionId, Vec<u8>)>;

/// All lobby state owned by the game-logic thread: the player table and the
/// room manager. Handlers take decoded events and return reply bytes, so the
/// whole request surface is exercisable without a socket in sight.
pub struct LobbyState {
    players: HashMap<SessionId, Player>,
    rooms: RoomManager,
    log: Logger,
}

impl LobbyState {
    pub fn new(log: &Logger) -> LobbyState {
        LobbyState {
            players: HashMap::new(),
            rooms: RoomManager::new(log),
            log: log.new(logging::o!("layer" => "game")),
        }
    }

    pub fn handle_event(&mut self, event: NetEvent) -> Outbound {
        match event {
            NetEvent::Connected(id) => self.on_connected(id),
            NetEvent::Disconnected(id) => self.on_disconnected(id),
            NetEvent::Received(id, bytes) => self.on_received(id, &bytes),
        }
    }

    /// Periodic hook, room timers and game simulation land here.
    pub fn tick(&mut self) {}

    #[inline]
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    #[inline]
    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    fn on_connected(&mut self, id: SessionId) -> Outbound {
        logging::debug!(self.log, "player joined lobby"; "session_id" => %id);
        self.players.insert(id, Player::new(id));
        Vec::new()
    }

    fn on_disconnected(&mut self, id: SessionId) -> Outbound {
        if self.players.remove(&id).is_some() {
            self.rooms.leave(id);
            logging::debug!(self.log, "player left lobby"; "session_id" => %id);
        }
        Vec::new()
    }

    fn on_received(&mut self, id: SessionId, bytes: &[u8]) -> Outbound {
        if bytes.len() < HEADER_SIZE {
            logging::warn!(self.log, "dropping undersized message"; "session_id" => %id, "bytes" => bytes.len());
            return Vec::new();
        }

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = Header::decode_array(&raw);

        if header.size as usize != bytes.len() {
            logging::warn!(self.log, "dropping message with inconsistent size";
                           "session_id" => %id, "declared" => header.size, "actual" => bytes.len());
            return Vec::new();
        }

        if !self.players.contains_key(&id) {
            logging::warn!(self.log, "dropping message from unknown player"; "session_id" => %id);
            return Vec::new();
        }

        let payload = &bytes[HEADER_SIZE..];

        match MsgKind::from_wire(header.kind) {
            Some(MsgKind::RequestRoomList) => self.handle_room_list(id),
            Some(MsgKind::CreateRoom) => self.handle_create_room(id, payload),
            Some(MsgKind::JoinRoom) => self.handle_join_room(id, payload),
            Some(MsgKind::LeaveRoom) => self.handle_leave_room(id),
            _ => {
                logging::warn!(self.log, "dropping unexpected message kind";
                               "session_id" => %id, "kind" => header.kind);
                Vec::new()
            }
        }
    }

    fn handle_room_list(&mut self, id: SessionId) -> Outbound {
        vec![(id, protocol::room_list(&self.rooms.snapshot()))]
    }

    fn handle_create_room(&mut self, id: SessionId, payload: &[u8]) -> Outbound {
        let msg = match protocol::decode_create_room(payload) {
            Ok(msg) => msg,
            Err(err) => {
                logging::warn!(self.log, "dropping malformed create request"; "session_id" => %id, "error" => ?err);
                return Vec::new();
            }
        };

        if msg.title.is_empty()
            || msg.max_players < MIN_ROOM_CAPACITY
            || msg.max_players > MAX_ROOM_CAPACITY
        {
            return vec![
                (id, protocol::room_created(-1, false)),
                (id, protocol::error_message("Invalid room parameters")),
            ];
        }

        if self.rooms.find_by_title(&msg.title).is_some() {
            return vec![
                (id, protocol::room_created(-1, false)),
                (id, protocol::error_message("Room title already exists")),
            ];
        }

        let room_id = self.rooms.create(&msg.title, msg.max_players);

        // The creator takes the room; if it cannot (already seated somewhere),
        // the newborn room must not linger empty in the listing.
        let joined = self.rooms.join(room_id, id);
        if !joined {
            self.rooms.discard_if_empty(room_id);
        }

        vec![(id, protocol::room_created(room_id, joined))]
    }

    fn handle_join_room(&mut self, id: SessionId, payload: &[u8]) -> Outbound {
        let room_id = match protocol::decode_join_room(payload) {
            Ok(room_id) => room_id,
            Err(err) => {
                logging::warn!(self.log, "dropping malformed join request"; "session_id" => %id, "error" => ?err);
                return Vec::new();
            }
        };

        if self.rooms.join(room_id, id) {
            vec![(id, protocol::room_joined(room_id, true))]
        } else {
            vec![
                (id, protocol::room_joined(room_id, false)),
                (id, protocol::error_message("Failed to join room")),
            ]
        }
    }

    fn handle_leave_room(&mut self, id: SessionId) -> Outbound {
        let left = self.rooms.leave(id);
        vec![(id, protocol::room_left(left))]
    }
}

/// The single game-logic thread: drains the engine's event queue in FIFO
/// order, runs the handlers, pushes replies back through `request_send` and
/// sleeps out the remainder of each tick.
pub struct GameServer {
    engine: Arc<IoEngine>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    tick_ms: i64,
    log: Logger,
}

impl GameServer {
    pub fn new(engine: Arc<IoEngine>, tick_ms: i64, log: &Logger) -> GameServer {
        GameServer {
            engine,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            tick_ms,
            log: log.new(logging::o!()),
        }
    }

    pub fn start(&mut self) -> NetResult<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);

        let engine = Arc::clone(&self.engine);
        let running = Arc::clone(&self.running);
        let tick_ms = self.tick_ms;
        let mut state = LobbyState::new(&self.log);

        self.thread = Some(
            thread::Builder::new()
                .name("tavern-game".to_string())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        while let Some(event) = engine.pop_event() {
                            for (target, message) in state.handle_event(event) {
                                engine.request_send(target, &message);
                            }
                        }

                        state.tick();

                        if tick_ms >= 0 {
                            thread::sleep(Duration::from_millis(tick_ms as u64));
                        }
                    }
                })?,
        );

        logging::info!(self.log, "game loop started"; "tick_ms" => self.tick_ms);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            logging::info!(self.log, "game loop stopped");
        }
    }
}

use crate::protocol::RoomInfo;
use hashbrown::HashMap;
use indexmap::IndexMap;
use keel::logging::{self, Logger};
use spindle::SessionId;
use std::sync::{Mutex, MutexGuard};

pub const MIN_ROOM_CAPACITY: i32 = 2;
pub const MAX_ROOM_CAPACITY: i32 = 10;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RoomStatus {
    Waiting,
    Playing,
}

impl RoomStatus {
    #[inline]
    pub fn wire(self) -> u8 {
        match self {
            RoomStatus::Waiting => 0,
            RoomStatus::Playing => 1,
        }
    }
}

/// A container of players. The first joiner becomes the owner; when the owner
/// leaves, the longest-present remaining player inherits the role.
pub struct Room {
    id: i32,
    title: String,
    max_players: i32,
    status: RoomStatus,
    owner: Option<SessionId>,
    players: Vec<SessionId>,
}

impl Room {
    fn new(id: i32, title: String, max_players: i32) -> Room {
        Room {
            id,
            title,
            max_players,
            status: RoomStatus::Waiting,
            owner: None,
            players: Vec::with_capacity(max_players.max(0) as usize),
        }
    }

    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    pub fn max_players(&self) -> i32 {
        self.max_players
    }

    #[inline]
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    #[inline]
    pub fn owner(&self) -> Option<SessionId> {
        self.owner
    }

    #[inline]
    pub fn players(&self) -> &[SessionId] {
        &self.players
    }

    #[inline]
    pub fn player_count(&self) -> i32 {
        self.players.len() as i32
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.player_count() >= self.max_players
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    #[inline]
    pub fn contains(&self, player: SessionId) -> bool {
        self.players.contains(&player)
    }

    fn add_player(&mut self, player: SessionId) -> bool {
        if self.is_full() || self.contains(player) {
            return false;
        }

        self.players.push(player);
        if self.owner.is_none() {
            self.owner = Some(player);
        }

        true
    }

    fn remove_player(&mut self, player: SessionId) -> bool {
        let index = match self.players.iter().position(|&p| p == player) {
            Some(index) => index,
            None => return false,
        };

        if self.owner == Some(player) {
            self.owner = self.players.iter().copied().find(|&p| p != player);
        }

        self.players.remove(index);
        true
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id,
            title: self.title.clone(),
            current_players: self.player_count(),
            max_players: self.max_players,
            status: self.status.wire(),
        }
    }
}

struct Inner {
    next_room_id: i32,
    /// Insertion order is creation order; snapshots iterate in reverse for a
    /// newest-first listing.
    rooms: IndexMap<i32, Room>,
    player_to_room: HashMap<SessionId, i32>,
}

/// Room lifecycle and the lookup indexes. One coarse mutex guards everything;
/// room operations are rare compared to packet traffic.
pub struct RoomManager {
    inner: Mutex<Inner>,
    log: Logger,
}

impl RoomManager {
    pub fn new(log: &Logger) -> RoomManager {
        RoomManager {
            inner: Mutex::new(Inner {
                next_room_id: 1,
                rooms: IndexMap::new(),
                player_to_room: HashMap::new(),
            }),
            log: log.new(logging::o!("layer" => "lobby")),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Creates an empty room and returns its id. Callers validate the title
    /// and capacity beforehand; the manager only allocates.
    pub fn create(&self, title: &str, max_players: i32) -> i32 {
        let mut inner = self.lock();

        let room_id = inner.next_room_id;
        inner.next_room_id += 1;
        inner.rooms.insert(room_id, Room::new(room_id, title.to_string(), max_players));

        logging::info!(self.log, "room created"; "room_id" => room_id, "title" => title, "max_players" => max_players);

        room_id
    }

    /// Puts a player into a room. Rejected when the player is already in some
    /// room, the room does not exist, or the room is full.
    pub fn join(&self, room_id: i32, player: SessionId) -> bool {
        let mut inner = self.lock();

        if inner.player_to_room.contains_key(&player) {
            return false;
        }

        let joined = match inner.rooms.get_mut(&room_id) {
            Some(room) => room.add_player(player),
            None => false,
        };

        if joined {
            inner.player_to_room.insert(player, room_id);
            logging::debug!(self.log, "player joined room"; "room_id" => room_id, "session_id" => %player);
        }

        joined
    }

    /// Takes a player out of whatever room it is in. Deletes the room when the
    /// last player leaves. Returns false if the player was not in a room.
    pub fn leave(&self, player: SessionId) -> bool {
        let mut inner = self.lock();

        let room_id = match inner.player_to_room.remove(&player) {
            Some(room_id) => room_id,
            None => return false,
        };

        let now_empty = match inner.rooms.get_mut(&room_id) {
            Some(room) => {
                room.remove_player(player);
                room.is_empty()
            }
            None => false,
        };

        logging::debug!(self.log, "player left room"; "room_id" => room_id, "session_id" => %player);

        if now_empty {
            inner.rooms.shift_remove(&room_id);
            logging::info!(self.log, "room deleted"; "room_id" => room_id);
        }

        true
    }

    /// Drops a room that never got its first player, so an empty room is
    /// never listed.
    pub fn discard_if_empty(&self, room_id: i32) {
        let mut inner = self.lock();

        let empty = inner.rooms.get(&room_id).map_or(false, Room::is_empty);
        if empty {
            inner.rooms.shift_remove(&room_id);
            logging::info!(self.log, "room discarded"; "room_id" => room_id);
        }
    }

    pub fn find_by_title(&self, title: &str) -> Option<i32> {
        let inner = self.lock();
        inner
            .rooms
            .values()
            .find(|room| room.title() == title)
            .map(Room::id)
    }

    pub fn find_by_player(&self, player: SessionId) -> Option<i32> {
        self.lock().player_to_room.get(&player).copied()
    }

    pub fn owner_of(&self, room_id: i32) -> Option<SessionId> {
        self.lock().rooms.get(&room_id).and_then(Room::owner)
    }

    /// Recency-ordered copy for the room-list reply, newest room first.
    pub fn snapshot(&self) -> Vec<RoomInfo> {
        self.lock().rooms.values().rev().map(Room::info).collect()
    }

    pub fn room_count(&self) -> i32 {
        self.lock().rooms.len() as i32
    }

    /// Number of players currently inside any room.
    pub fn player_count(&self) -> i32 {
        self.lock().player_to_room.len() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel::logging;

    fn manager() -> RoomManager {
        RoomManager::new(&logging::discard())
    }

    fn sid(n: u64) -> SessionId {
        SessionId::assemble(n as u16, n)
    }

    #[test]
    fn test_first_joiner_becomes_owner() {
        let rooms = manager();
        let room_id = rooms.create("lounge", 4);

        assert!(rooms.join(room_id, sid(1)));
        assert!(rooms.join(room_id, sid(2)));

        assert_eq!(rooms.owner_of(room_id), Some(sid(1)));
        assert_eq!(rooms.player_count(), 2);
    }

    #[test]
    fn test_owner_succession_follows_insertion_order() {
        let rooms = manager();
        let room_id = rooms.create("lounge", 4);

        rooms.join(room_id, sid(1));
        rooms.join(room_id, sid(2));
        rooms.join(room_id, sid(3));

        assert!(rooms.leave(sid(1)));
        assert_eq!(rooms.owner_of(room_id), Some(sid(2)));

        // A non-owner leaving does not move the role.
        assert!(rooms.leave(sid(3)));
        assert_eq!(rooms.owner_of(room_id), Some(sid(2)));
    }

    #[test]
    fn test_room_deleted_when_last_player_leaves() {
        let rooms = manager();
        let room_id = rooms.create("lounge", 4);

        rooms.join(room_id, sid(1));
        assert_eq!(rooms.room_count(), 1);

        assert!(rooms.leave(sid(1)));
        assert_eq!(rooms.room_count(), 0);
        assert_eq!(rooms.find_by_title("lounge"), None);
        assert!(!rooms.join(room_id, sid(2)));
    }

    #[test]
    fn test_join_rejections() {
        let rooms = manager();
        let room_id = rooms.create("duo", 2);

        assert!(!rooms.join(999, sid(1)), "missing room");

        assert!(rooms.join(room_id, sid(1)));
        assert!(!rooms.join(room_id, sid(1)), "player already in a room");

        assert!(rooms.join(room_id, sid(2)));
        assert!(!rooms.join(room_id, sid(3)), "room full");
    }

    #[test]
    fn test_player_room_index_stays_consistent() {
        let rooms = manager();
        let first = rooms.create("first", 4);
        let second = rooms.create("second", 4);

        rooms.join(first, sid(1));
        rooms.join(second, sid(2));

        assert_eq!(rooms.find_by_player(sid(1)), Some(first));
        assert_eq!(rooms.find_by_player(sid(2)), Some(second));

        // A player already mapped to a room cannot enter another.
        assert!(!rooms.join(second, sid(1)));

        rooms.leave(sid(1));
        assert_eq!(rooms.find_by_player(sid(1)), None);
        assert_eq!(rooms.player_count(), 1);
    }

    #[test]
    fn test_leave_without_room_is_noop() {
        let rooms = manager();

        assert!(!rooms.leave(sid(9)));
    }

    #[test]
    fn test_snapshot_is_newest_first() {
        let rooms = manager();
        let first = rooms.create("first", 4);
        let second = rooms.create("second", 4);
        let third = rooms.create("third", 4);

        rooms.join(first, sid(1));
        rooms.join(second, sid(2));
        rooms.join(third, sid(3));

        let listing = rooms.snapshot();
        let ids: Vec<i32> = listing.iter().map(|info| info.room_id).collect();
        assert_eq!(ids, vec![third, second, first]);
    }

    #[test]
    fn test_snapshot_counts_match_membership() {
        let rooms = manager();
        let room_id = rooms.create("lounge", 10);

        for player in 1..=5 {
            rooms.join(room_id, sid(player));
        }

        let listing = rooms.snapshot();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].current_players, 5);
        assert_eq!(listing[0].max_players, 10);
        assert_eq!(listing[0].status, RoomStatus::Waiting.wire());
        assert_eq!(listing[0].title, "lounge");
    }

    #[test]
    fn test_room_ids_are_monotonic() {
        let rooms = manager();

        let first = rooms.create("a", 2);
        rooms.join(first, sid(1));
        rooms.leave(sid(1));

        // Deleted rooms never free their id.
        let second = rooms.create("b", 2);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_discard_if_empty_only_removes_unused_rooms() {
        let rooms = manager();
        let empty = rooms.create("empty", 4);
        let used = rooms.create("used", 4);
        rooms.join(used, sid(1));

        rooms.discard_if_empty(empty);
        rooms.discard_if_empty(used);

        assert_eq!(rooms.room_count(), 1);
        assert_eq!(rooms.find_by_title("used"), Some(used));
    }
}

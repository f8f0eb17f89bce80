//! Full-stack tests: a real engine with its worker pool, the game-logic
//! thread, and plain blocking TCP clients exercising the lobby protocol.

use spindle::frame::{Header, HEADER_SIZE};
use spindle::{Architecture, EngineSettings, IoEngine};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use taverncore::protocol::{
    self, decode_error, decode_room_created, decode_room_joined, decode_room_list, MsgKind,
};
use taverncore::server::GameServer;

struct Harness {
    engine: Arc<IoEngine>,
    game: GameServer,
}

impl Harness {
    fn start() -> Harness {
        let log = keel::logging::discard();
        let settings = EngineSettings {
            bind: "127.0.0.1:0".to_string(),
            max_clients: 16,
            nodelay: true,
            architecture: Architecture::Centralized,
        };

        let engine = Arc::new(IoEngine::new(settings, &log).unwrap());
        engine.start().unwrap();

        let mut game = GameServer::new(Arc::clone(&engine), 1, &log);
        game.start().unwrap();

        Harness { engine, game }
    }

    fn client(&self) -> Client {
        let stream = TcpStream::connect(self.engine.local_addr()).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.set_nodelay(true).unwrap();
        Client { stream }
    }

    fn shutdown(mut self) {
        self.game.stop();
        self.engine.stop();
    }
}

struct Client {
    stream: TcpStream,
}

impl Client {
    fn send(&mut self, packet: &[u8]) {
        self.stream.write_all(packet).unwrap();
    }

    /// Reads one framed message and returns its kind and payload.
    fn read_message(&mut self) -> (u16, Vec<u8>) {
        let mut raw = [0u8; HEADER_SIZE];
        self.stream.read_exact(&mut raw).unwrap();
        let header = Header::decode_array(&raw);

        let mut payload = vec![0u8; header.size as usize - HEADER_SIZE];
        self.stream.read_exact(&mut payload).unwrap();
        (header.kind, payload)
    }

    fn expect(&mut self, kind: MsgKind) -> Vec<u8> {
        let (wire_kind, payload) = self.read_message();
        assert_eq!(wire_kind, kind.wire(), "unexpected message kind");
        payload
    }
}

#[test]
fn test_room_list_starts_empty() {
    let harness = Harness::start();
    let mut client = harness.client();

    client.send(&protocol::request_room_list());

    let payload = client.expect(MsgKind::RoomList);
    assert_eq!(payload, vec![0, 0, 0, 0]);

    harness.shutdown();
}

#[test]
fn test_create_room_then_list_it() {
    let harness = Harness::start();
    let mut client = harness.client();

    client.send(&protocol::create_room("ROOM1", 4));

    let created = decode_room_created(&client.expect(MsgKind::RoomCreated)).unwrap();
    assert_eq!(created.room_id, 1);
    assert!(created.success);

    client.send(&protocol::request_room_list());
    let rooms = decode_room_list(&client.expect(MsgKind::RoomList)).unwrap();

    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room_id, 1);
    assert_eq!(rooms[0].title, "ROOM1");
    assert_eq!(rooms[0].current_players, 1);
    assert_eq!(rooms[0].max_players, 4);
    assert_eq!(rooms[0].status, 0);

    harness.shutdown();
}

#[test]
fn test_invalid_room_parameters_reply_pair() {
    let harness = Harness::start();
    let mut client = harness.client();

    client.send(&protocol::create_room("", 4));

    let created = decode_room_created(&client.expect(MsgKind::RoomCreated)).unwrap();
    assert_eq!(created.room_id, -1);
    assert!(!created.success);

    let text = decode_error(&client.expect(MsgKind::Error)).unwrap();
    assert_eq!(text, "Invalid room parameters");

    harness.shutdown();
}

#[test]
fn test_duplicate_title_across_clients() {
    let harness = Harness::start();
    let mut first = harness.client();
    let mut second = harness.client();

    first.send(&protocol::create_room("DUPE", 3));
    assert!(decode_room_created(&first.expect(MsgKind::RoomCreated)).unwrap().success);

    second.send(&protocol::create_room("DUPE", 3));
    let created = decode_room_created(&second.expect(MsgKind::RoomCreated)).unwrap();
    assert_eq!(created.room_id, -1);
    assert!(!created.success);
    assert_eq!(
        decode_error(&second.expect(MsgKind::Error)).unwrap(),
        "Room title already exists"
    );

    harness.shutdown();
}

#[test]
fn test_join_missing_room() {
    let harness = Harness::start();
    let mut client = harness.client();

    client.send(&protocol::join_room(999));

    let joined = decode_room_joined(&client.expect(MsgKind::RoomJoined)).unwrap();
    assert_eq!(joined.room_id, 999);
    assert!(!joined.success);
    assert_eq!(
        decode_error(&client.expect(MsgKind::Error)).unwrap(),
        "Failed to join room"
    );

    harness.shutdown();
}

#[test]
fn test_two_clients_share_a_room() {
    let harness = Harness::start();
    let mut host = harness.client();
    let mut guest = harness.client();

    host.send(&protocol::create_room("shared", 2));
    assert!(decode_room_created(&host.expect(MsgKind::RoomCreated)).unwrap().success);

    guest.send(&protocol::join_room(1));
    let joined = decode_room_joined(&guest.expect(MsgKind::RoomJoined)).unwrap();
    assert_eq!(joined.room_id, 1);
    assert!(joined.success);

    guest.send(&protocol::request_room_list());
    let rooms = decode_room_list(&guest.expect(MsgKind::RoomList)).unwrap();
    assert_eq!(rooms[0].current_players, 2);

    harness.shutdown();
}

#[test]
fn test_disconnect_deletes_owned_room() {
    let harness = Harness::start();
    let mut owner = harness.client();

    owner.send(&protocol::create_room("transient", 4));
    assert!(decode_room_created(&owner.expect(MsgKind::RoomCreated)).unwrap().success);

    drop(owner);

    // The disconnect crosses the event queue; poll the listing until the
    // room is gone.
    let mut observer = harness.client();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        observer.send(&protocol::request_room_list());
        let rooms = decode_room_list(&observer.expect(MsgKind::RoomList)).unwrap();
        if rooms.is_empty() {
            break;
        }
        assert!(Instant::now() < deadline, "room was not deleted after disconnect");
        thread::sleep(Duration::from_millis(10));
    }

    harness.shutdown();
}

#[test]
fn test_undersized_declared_packet_disconnects() {
    let harness = Harness::start();
    let mut client = harness.client();

    // A valid exchange first, so the session is known to be live.
    client.send(&protocol::request_room_list());
    client.expect(MsgKind::RoomList);

    // size = 2 violates the bare-header minimum and must cost the connection.
    client.send(&[0x02, 0x00, 0xe8, 0x03]);

    let mut raw = [0u8; 1];
    assert!(client.stream.read_exact(&mut raw).is_err());

    harness.shutdown();
}

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use spindle::frame::{Header, HEADER_SIZE};
use std::io::{self, Cursor, Read, Write};

/// Capacity of the fixed-length room title field, terminator included.
pub const TITLE_LEN: usize = 64;
/// Capacity of the fixed-length error text field, terminator included.
pub const ERROR_TEXT_LEN: usize = 256;
/// Wire footprint of one `RoomInfo` entry.
pub const ROOM_INFO_SIZE: usize = 4 + TITLE_LEN + 4 + 4 + 1;

/// Lobby message kinds. Requests flow client to server, replies the other way.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MsgKind {
    RequestRoomList = 1000,
    RoomList = 1001,
    CreateRoom = 1002,
    RoomCreated = 1003,
    JoinRoom = 1004,
    RoomJoined = 1005,
    LeaveRoom = 1006,
    RoomLeft = 1007,
    Error = 1008,
}

impl MsgKind {
    pub fn from_wire(kind: u16) -> Option<MsgKind> {
        match kind {
            1000 => Some(MsgKind::RequestRoomList),
            1001 => Some(MsgKind::RoomList),
            1002 => Some(MsgKind::CreateRoom),
            1003 => Some(MsgKind::RoomCreated),
            1004 => Some(MsgKind::JoinRoom),
            1005 => Some(MsgKind::RoomJoined),
            1006 => Some(MsgKind::LeaveRoom),
            1007 => Some(MsgKind::RoomLeft),
            1008 => Some(MsgKind::Error),
            _ => None,
        }
    }

    #[inline]
    pub fn wire(self) -> u16 {
        self as u16
    }
}

/// One room entry in a `RoomList` reply.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RoomInfo {
    pub room_id: i32,
    pub title: String,
    pub current_players: i32,
    pub max_players: i32,
    pub status: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProtoError {
    Truncated,
}

impl From<io::Error> for ProtoError {
    fn from(_: io::Error) -> Self {
        ProtoError::Truncated
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CreateRoomMsg {
    pub title: String,
    pub max_players: i32,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RoomCreatedMsg {
    pub room_id: i32,
    pub success: bool,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RoomJoinedMsg {
    pub room_id: i32,
    pub success: bool,
}

fn packet(kind: MsgKind, payload_size: usize) -> Vec<u8> {
    let total = HEADER_SIZE + payload_size;
    let mut out = Vec::with_capacity(total);
    Header::new(total as u16, kind.wire())
        .encode(&mut out)
        .expect("Error writing message header");
    out
}

/// Writes `text` into a fixed `cap` byte field, truncated to `cap - 1` bytes
/// so the terminator always fits, and NUL-padded to the end.
fn write_fixed_str<W: Write>(out: &mut W, text: &str, cap: usize) {
    let bytes = text.as_bytes();
    let len = bytes.len().min(cap - 1);

    out.write_all(&bytes[..len]).expect("Error writing string field");
    for _ in len..cap {
        out.write_u8(0).expect("Error padding string field");
    }
}

/// Reads a fixed `cap` byte field, stopping at the first NUL. An all-NUL
/// field reads back as the empty string.
fn read_fixed_str<R: Read>(input: &mut R, cap: usize) -> Result<String, ProtoError> {
    let mut raw = vec![0u8; cap];
    input.read_exact(&mut raw)?;

    let end = raw.iter().position(|&b| b == 0).unwrap_or(cap);
    Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
}

// Client to server.

pub fn request_room_list() -> Vec<u8> {
    packet(MsgKind::RequestRoomList, 0)
}

pub fn create_room(title: &str, max_players: i32) -> Vec<u8> {
    let mut out = packet(MsgKind::CreateRoom, TITLE_LEN + 4);
    write_fixed_str(&mut out, title, TITLE_LEN);
    out.write_i32::<LittleEndian>(max_players)
        .expect("Error writing max players");
    out
}

pub fn join_room(room_id: i32) -> Vec<u8> {
    let mut out = packet(MsgKind::JoinRoom, 4);
    out.write_i32::<LittleEndian>(room_id).expect("Error writing room id");
    out
}

pub fn leave_room() -> Vec<u8> {
    packet(MsgKind::LeaveRoom, 0)
}

// Server to client.

pub fn room_list(rooms: &[RoomInfo]) -> Vec<u8> {
    let mut out = packet(MsgKind::RoomList, 4 + rooms.len() * ROOM_INFO_SIZE);
    out.write_i32::<LittleEndian>(rooms.len() as i32)
        .expect("Error writing room count");

    for room in rooms {
        out.write_i32::<LittleEndian>(room.room_id).expect("Error writing room id");
        write_fixed_str(&mut out, &room.title, TITLE_LEN);
        out.write_i32::<LittleEndian>(room.current_players)
            .expect("Error writing player count");
        out.write_i32::<LittleEndian>(room.max_players)
            .expect("Error writing room capacity");
        out.write_u8(room.status).expect("Error writing room status");
    }

    out
}

pub fn room_created(room_id: i32, success: bool) -> Vec<u8> {
    let mut out = packet(MsgKind::RoomCreated, 5);
    out.write_i32::<LittleEndian>(room_id).expect("Error writing room id");
    out.write_u8(if success { 1 } else { 0 }).expect("Error writing result");
    out
}

pub fn room_joined(room_id: i32, success: bool) -> Vec<u8> {
    let mut out = packet(MsgKind::RoomJoined, 5);
    out.write_i32::<LittleEndian>(room_id).expect("Error writing room id");
    out.write_u8(if success { 1 } else { 0 }).expect("Error writing result");
    out
}

pub fn room_left(success: bool) -> Vec<u8> {
    let mut out = packet(MsgKind::RoomLeft, 1);
    out.write_u8(if success { 1 } else { 0 }).expect("Error writing result");
    out
}

pub fn error_message(text: &str) -> Vec<u8> {
    let mut out = packet(MsgKind::Error, ERROR_TEXT_LEN);
    write_fixed_str(&mut out, text, ERROR_TEXT_LEN);
    out
}

// Payload decoders. All take the payload after the header.

pub fn decode_create_room(payload: &[u8]) -> Result<CreateRoomMsg, ProtoError> {
    let mut cursor = Cursor::new(payload);
    let title = read_fixed_str(&mut cursor, TITLE_LEN)?;
    let max_players = cursor.read_i32::<LittleEndian>()?;

    Ok(CreateRoomMsg { title, max_players })
}

pub fn decode_join_room(payload: &[u8]) -> Result<i32, ProtoError> {
    Ok(Cursor::new(payload).read_i32::<LittleEndian>()?)
}

pub fn decode_room_created(payload: &[u8]) -> Result<RoomCreatedMsg, ProtoError> {
    let mut cursor = Cursor::new(payload);
    let room_id = cursor.read_i32::<LittleEndian>()?;
    let success = cursor.read_u8()? != 0;

    Ok(RoomCreatedMsg { room_id, success })
}

pub fn decode_room_joined(payload: &[u8]) -> Result<RoomJoinedMsg, ProtoError> {
    let mut cursor = Cursor::new(payload);
    let room_id = cursor.read_i32::<LittleEndian>()?;
    let success = cursor.read_u8()? != 0;

    Ok(RoomJoinedMsg { room_id, success })
}

pub fn decode_room_left(payload: &[u8]) -> Result<bool, ProtoError> {
    Ok(Cursor::new(payload).read_u8()? != 0)
}

pub fn decode_error(payload: &[u8]) -> Result<String, ProtoError> {
    read_fixed_str(&mut Cursor::new(payload), ERROR_TEXT_LEN)
}

pub fn decode_room_list(payload: &[u8]) -> Result<Vec<RoomInfo>, ProtoError> {
    let mut cursor = Cursor::new(payload);
    let count = cursor.read_i32::<LittleEndian>()?;

    let mut rooms = Vec::with_capacity(count.max(0) as usize);
    for _ in 0..count {
        let room_id = cursor.read_i32::<LittleEndian>()?;
        let title = read_fixed_str(&mut cursor, TITLE_LEN)?;
        let current_players = cursor.read_i32::<LittleEndian>()?;
        let max_players = cursor.read_i32::<LittleEndian>()?;
        let status = cursor.read_u8()?;

        rooms.push(RoomInfo {
            room_id,
            title,
            current_players,
            max_players,
            status,
        });
    }

    Ok(rooms)
}

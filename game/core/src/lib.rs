//! Game-logic layer of the tavern server: the lobby protocol, the room and
//! player model, and the single-threaded game loop that drains the network
//! event queue.

pub mod config;
pub mod lobby;
pub mod player;
pub mod protocol;
pub mod server;

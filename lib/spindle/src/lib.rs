//! The networking modules in `spindle` handle all the transport between
//! clients and the game-logic layer: bounded ring buffers, the fixed session
//! table with ABA-safe identities, length-prefixed framing, and the
//! completion-driven I/O engine.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod completion;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod ring;
pub mod session;
mod sync;

pub use crate::engine::{Architecture, EngineSettings, IoEngine};
pub use crate::error::{FaultKind, NetError, NetResult};
pub use crate::event::NetEvent;
pub use crate::session::SessionId;

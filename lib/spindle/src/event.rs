use crate::session::SessionId;
use crate::sync;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Hand-off from the I/O threads to the game-logic thread. `Received` carries
/// one complete framed message, header included.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NetEvent {
    Connected(SessionId),
    Disconnected(SessionId),
    Received(SessionId, Vec<u8>),
}

/// Mutex-guarded FIFO with multiple producers and a single consumer. The
/// consumer polls with the non-blocking `try_pop`; pacing is the game loop's
/// business, not the queue's.
pub struct EventQueue {
    queue: Mutex<VecDeque<NetEvent>>,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    #[inline]
    pub fn push(&self, event: NetEvent) {
        sync::lock(&self.queue).push_back(event);
    }

    #[inline]
    pub fn try_pop(&self) -> Option<NetEvent> {
        sync::lock(&self.queue).pop_front()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        sync::lock(&self.queue).is_empty()
    }
}

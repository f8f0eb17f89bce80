use crate::ring::{RingBuffer, SharedRing};
use crate::sync;
use mio::net::TcpStream;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

// Receive ring must hold a maximal packet plus room to keep draining; the
// send ring is sized for bursts of room-list responses.
pub const RECV_BUF_SIZE: usize = 2 * 65536;
pub const SEND_BUF_SIZE: usize = 8 * 65536;

const UNIQUE_BITS: u32 = 48;
const UNIQUE_MASK: u64 = (1 << UNIQUE_BITS) - 1;

/// Identity of one connection: the upper 16 bits locate the session record in
/// the engine's fixed table, the lower 48 bits are a monotonically increasing
/// unique id distinguishing successive occupants of the same slot. A stale
/// completion therefore never matches a reused slot: both halves must agree
/// with the current occupant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// The id no live session ever carries.
    pub const NIL: SessionId = SessionId(0);

    #[inline]
    pub fn assemble(slot: u16, unique: u64) -> SessionId {
        SessionId((u64::from(slot) << UNIQUE_BITS) | (unique & UNIQUE_MASK))
    }

    #[inline]
    pub fn from_raw(raw: u64) -> SessionId {
        SessionId(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn slot(self) -> u16 {
        (self.0 >> UNIQUE_BITS) as u16
    }

    #[inline]
    pub fn unique(self) -> u64 {
        self.0 & UNIQUE_MASK
    }

    /// Masks a counter value into the unique-id domain.
    #[inline]
    pub fn mask_unique(counter: u64) -> u64 {
        counter & UNIQUE_MASK
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.slot(), self.unique())
    }
}

/// The direction of an asynchronous operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IoOp {
    Recv,
    Send,
}

/// Descriptor attached to each direction of a session's I/O. It carries the
/// identity the session had when the operation was issued, so completions
/// that outlive the occupant are rejected by comparing this id against the
/// record's current one.
pub struct IoRequest {
    pub op: IoOp,
    id: AtomicU64,
}

impl IoRequest {
    #[inline]
    fn new(op: IoOp) -> IoRequest {
        IoRequest {
            op,
            id: AtomicU64::new(SessionId::NIL.raw()),
        }
    }

    #[inline]
    pub fn stamp(&self, id: SessionId) {
        self.id.store(id.raw(), Ordering::SeqCst);
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        SessionId::from_raw(self.id.load(Ordering::SeqCst))
    }
}

/// Per-connection state. Records are allocated once at engine start and
/// reused; nothing on the accept hot path allocates.
pub struct Session {
    slot: u16,
    socket: Mutex<Option<TcpStream>>,
    id: AtomicU64,
    pub valid: AtomicBool,
    pub sending: AtomicBool,
    recv_ring: Mutex<RingBuffer>,
    pub send_ring: SharedRing,
    pub recv_req: IoRequest,
    pub send_req: IoRequest,
}

impl Session {
    pub fn vacant(slot: u16) -> Session {
        Session {
            slot,
            socket: Mutex::new(None),
            id: AtomicU64::new(SessionId::NIL.raw()),
            valid: AtomicBool::new(false),
            sending: AtomicBool::new(false),
            recv_ring: Mutex::new(RingBuffer::new(RECV_BUF_SIZE)),
            send_ring: SharedRing::new(SEND_BUF_SIZE),
            recv_req: IoRequest::new(IoOp::Recv),
            send_req: IoRequest::new(IoOp::Send),
        }
    }

    /// Binds a fresh connection into this record. Runs on the acceptor before
    /// the socket is registered for readiness, so the rings are never cleared
    /// while a worker is using them.
    pub fn initialize(&self, stream: TcpStream, id: SessionId) {
        debug_assert_eq!(id.slot(), self.slot);

        self.recv_ring().clear();
        self.send_ring.clear();
        self.sending.store(false, Ordering::SeqCst);
        self.recv_req.stamp(id);
        self.send_req.stamp(id);
        self.id.store(id.raw(), Ordering::SeqCst);
        *self.socket() = Some(stream);
        self.valid.store(true, Ordering::SeqCst);
    }

    /// Drops the socket if it is still open. The accept path arms
    /// `SO_LINGER{1,0}`, so the close is abortive. Idempotent.
    pub fn close(&self) {
        self.socket().take();
    }

    #[inline]
    pub fn slot(&self) -> u16 {
        self.slot
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        SessionId::from_raw(self.id.load(Ordering::SeqCst))
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn socket(&self) -> MutexGuard<'_, Option<TcpStream>> {
        sync::lock(&self.socket)
    }

    #[inline]
    pub fn recv_ring(&self) -> MutexGuard<'_, RingBuffer> {
        sync::lock(&self.recv_ring)
    }
}

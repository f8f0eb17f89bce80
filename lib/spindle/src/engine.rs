use crate::completion::{Completion, CompletionPort};
use crate::error::{FaultKind, NetError, NetResult};
use crate::event::{EventQueue, NetEvent};
use crate::frame::{Header, HEADER_SIZE};
use crate::ring::{RingBuffer, SendView};
use crate::session::{IoOp, Session, SessionId};
use crate::sync;
use keel::logging::{self, Logger};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, IoSlice, IoSliceMut, Read, Write};
use std::mem;
use std::net::{self, IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const LISTEN_BACKLOG: i32 = 1024;
const EVENTS_CAPACITY: usize = 1024;
const WAKE_TOKEN: Token = Token(std::usize::MAX);

/// How accepted traffic is routed to game logic. The set is closed: each
/// per-event hook branches on the value instead of going through a trait
/// object.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Architecture {
    /// Parsed messages are written straight back to the peer on the worker
    /// thread. No events are produced.
    EchoTest,
    /// Events cross the queue to a single game-logic thread.
    Centralized,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Listen address, `<ip>:<port>`.
    pub bind: String,
    pub max_clients: u16,
    pub nodelay: bool,
    pub architecture: Architecture,
}

impl Default for EngineSettings {
    fn default() -> EngineSettings {
        EngineSettings {
            bind: "0.0.0.0:6000".to_string(),
            max_clients: 1000,
            nodelay: true,
            architecture: Architecture::Centralized,
        }
    }
}

enum ReadOutcome {
    Data,
    WouldBlock,
    Closed,
    Overflow,
    Gone,
    Error(io::ErrorKind),
}

enum SendFate {
    Wrote,
    Blocked,
    Drained,
    Gone,
    Fatal(FaultKind),
}

enum RecvFate {
    Keep,
    Drop(FaultKind),
}

/// The network I/O layer. Owns every socket, the fixed session table, the
/// worker pool and the readiness thread; game logic above it sees only
/// [`NetEvent`]s and the `request_*` entry points, which are safe from any
/// thread.
pub struct IoEngine {
    log: Logger,
    architecture: Architecture,
    nodelay: bool,
    running: AtomicBool,
    unique_counter: AtomicU64,
    sessions: Vec<Session>,
    /// Slots ready for a new occupant. Touched only on the acceptor thread.
    available: Mutex<Vec<u16>>,
    /// Torn-down identities awaiting reclamation, drained on the acceptor so
    /// slot reuse is sequenced after closure.
    pending_disconnect: Mutex<Vec<SessionId>>,
    port: CompletionPort,
    events: EventQueue,
    listener: Mutex<Option<net::TcpListener>>,
    io_poll: Mutex<Option<Poll>>,
    registry: Registry,
    io_waker: Waker,
    local_addr: SocketAddr,
    worker_count: usize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl IoEngine {
    pub fn new(settings: EngineSettings, log: &Logger) -> NetResult<IoEngine> {
        let addr: SocketAddr = settings.bind.parse()?;
        let listener = Self::create_listener(addr)?;
        let local_addr = listener.local_addr()?;

        let io_poll = Poll::new()?;
        let io_waker = Waker::new(io_poll.registry(), WAKE_TOKEN)?;
        let registry = io_poll.registry().try_clone()?;

        let sessions: Vec<Session> = (0..settings.max_clients).map(Session::vacant).collect();
        let available: Vec<u16> = (0..settings.max_clients).rev().collect();

        let worker_count = 2 * thread::available_parallelism().map(|n| n.get()).unwrap_or(2);

        Ok(IoEngine {
            log: log.new(logging::o!("layer" => "net")),
            architecture: settings.architecture,
            nodelay: settings.nodelay,
            running: AtomicBool::new(false),
            unique_counter: AtomicU64::new(0),
            sessions,
            available: Mutex::new(available),
            pending_disconnect: Mutex::new(Vec::new()),
            port: CompletionPort::new(),
            events: EventQueue::new(),
            listener: Mutex::new(Some(listener)),
            io_poll: Mutex::new(Some(io_poll)),
            registry,
            io_waker,
            local_addr,
            worker_count,
            threads: Mutex::new(Vec::new()),
        })
    }

    fn create_listener(addr: SocketAddr) -> NetResult<net::TcpListener> {
        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        Ok(socket.into())
    }

    /// Spawns the acceptor, the readiness thread and the worker pool. The
    /// listener stays in blocking mode; shutdown unblocks it with a loopback
    /// connection.
    pub fn start(self: &Arc<Self>) -> NetResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let listener = sync::lock(&self.listener)
            .take()
            .expect("engine started more than once");
        let io_poll = sync::lock(&self.io_poll)
            .take()
            .expect("engine started more than once");

        let mut threads = sync::lock(&self.threads);

        let engine = Arc::clone(self);
        threads.push(
            thread::Builder::new()
                .name("spindle-io".to_string())
                .spawn(move || engine.readiness_loop(io_poll))?,
        );

        for index in 0..self.worker_count {
            let engine = Arc::clone(self);
            threads.push(
                thread::Builder::new()
                    .name(format!("spindle-worker-{}", index))
                    .spawn(move || engine.worker_loop())?,
            );
        }

        let engine = Arc::clone(self);
        threads.push(
            thread::Builder::new()
                .name("spindle-accept".to_string())
                .spawn(move || engine.accept_loop(listener))?,
        );

        logging::info!(self.log, "engine started";
                       "addr" => %self.local_addr,
                       "workers" => self.worker_count,
                       "max_clients" => self.sessions.len());

        Ok(())
    }

    /// Cooperative shutdown: close every socket abortively, unblock each
    /// thread, then join them all. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        logging::info!(self.log, "stopping engine");

        for session in &self.sessions {
            if session.valid.swap(false, Ordering::SeqCst) {
                session.close();
                session.sending.store(false, Ordering::SeqCst);
            }
        }

        // A loopback connection returns the acceptor from its blocking accept.
        let wake_addr = match self.local_addr.ip() {
            ip if ip.is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.local_addr.port())
            }
            _ => self.local_addr,
        };
        let _ = net::TcpStream::connect_timeout(&wake_addr, Duration::from_millis(500));

        let _ = self.io_waker.wake();

        for _ in 0..self.worker_count {
            self.port.post(Completion::Shutdown);
        }

        let threads = mem::replace(&mut *sync::lock(&self.threads), Vec::new());
        for handle in threads {
            let _ = handle.join();
        }

        logging::info!(self.log, "engine stopped");
    }

    #[inline]
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// The bound listen address; useful when the configured port was 0.
    #[inline]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Non-blocking event hand-off for the game-logic thread.
    #[inline]
    pub fn pop_event(&self) -> Option<NetEvent> {
        self.events.try_pop()
    }

    /// Queues `data` for transmission to a session. Safe from any thread.
    /// A full send ring means the peer is not draining; the session is torn
    /// down rather than blocked on.
    pub fn request_send(&self, id: SessionId, data: &[u8]) {
        let session = match self.find_session(id) {
            Some(session) => session,
            None => return,
        };

        if session.send_ring.enqueue(data) == 0 {
            logging::warn!(self.log, "send ring overflow"; "session_id" => %id, "bytes" => data.len());
            self.disconnect_session(session, FaultKind::SendCongestion);
            return;
        }

        self.post_send(session);
    }

    /// Tears down a session on request of the logic layer. Returns false if
    /// the identity no longer names a live session.
    pub fn request_disconnect(&self, id: SessionId) -> bool {
        match self.find_session(id) {
            Some(session) => {
                self.disconnect_session(session, FaultKind::Requested);
                true
            }
            None => false,
        }
    }

    /// Resolves an identity to the live session it names. Both halves of the
    /// id must match the current occupant of the slot.
    fn find_session(&self, id: SessionId) -> Option<&Session> {
        let session = self.sessions.get(id.slot() as usize)?;
        if session.is_valid() && session.id() == id {
            Some(session)
        } else {
            None
        }
    }

    // ----------------------------------------------------------------- accept

    fn accept_loop(&self, listener: net::TcpListener) {
        logging::debug!(self.log, "acceptor running"; "addr" => %self.local_addr);

        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    if !self.running() {
                        break;
                    }
                    self.reclaim_slots();
                    self.process_accept(stream, peer);
                }
                Err(err) => {
                    if !self.running() {
                        break;
                    }
                    logging::warn!(self.log, "accept failed"; "error" => %err);
                }
            }
        }

        logging::debug!(self.log, "acceptor stopped");
    }

    /// Returns slots whose teardown has been observed to the free list. Runs
    /// only on the acceptor thread, so a slot can never be handed out while
    /// its previous occupant is still closing.
    fn reclaim_slots(&self) {
        let pending = mem::replace(&mut *sync::lock(&self.pending_disconnect), Vec::new());
        if pending.is_empty() {
            return;
        }

        let mut available = sync::lock(&self.available);
        for id in pending {
            let session = &self.sessions[id.slot() as usize];
            if !session.is_valid() && session.id() == id {
                session.close();
                available.push(id.slot());
                logging::trace!(self.log, "slot reclaimed"; "session_id" => %id);
            }
        }
    }

    fn process_accept(&self, stream: net::TcpStream, peer: SocketAddr) {
        let slot = match sync::lock(&self.available).pop() {
            Some(slot) => slot,
            None => {
                logging::warn!(self.log, "connection refused, session table full"; "peer" => %peer);
                Self::abort_stream(&stream);
                return;
            }
        };

        let unique = SessionId::mask_unique(self.unique_counter.fetch_add(1, Ordering::Relaxed) + 1);
        let id = SessionId::assemble(slot, unique);

        let stream = match self.configure_stream(stream) {
            Ok(stream) => stream,
            Err(err) => {
                logging::warn!(self.log, "failed to configure socket"; "peer" => %peer, "error" => %err);
                sync::lock(&self.available).push(slot);
                return;
            }
        };

        let session = &self.sessions[slot as usize];
        session.initialize(stream, id);

        // Queue Connected before readiness delivery starts so no Received can
        // overtake it.
        if let Architecture::Centralized = self.architecture {
            self.events.push(NetEvent::Connected(id));
        }

        if let Err(err) = self.register_session(session) {
            logging::warn!(self.log, "failed to register socket"; "session_id" => %id, "error" => %err);
            self.disconnect_session(session, FaultKind::Io(err.kind()));
            return;
        }

        logging::info!(self.log, "client connected"; "session_id" => %id, "peer" => %peer);

        // First receive: bytes may have landed before registration, and edge
        // readiness would never replay them.
        self.process_recv(session);
    }

    fn configure_stream(&self, stream: net::TcpStream) -> io::Result<TcpStream> {
        stream.set_nonblocking(true)?;
        // Closes send RST, so a reclaimed slot never waits out TIME_WAIT.
        SockRef::from(&stream).set_linger(Some(Duration::from_secs(0)))?;
        if self.nodelay {
            stream.set_nodelay(true)?;
        }
        Ok(TcpStream::from_std(stream))
    }

    fn abort_stream(stream: &net::TcpStream) {
        let _ = SockRef::from(stream).set_linger(Some(Duration::from_secs(0)));
    }

    fn register_session(&self, session: &Session) -> io::Result<()> {
        let mut socket = session.socket();
        match socket.as_mut() {
            Some(stream) => self.registry.register(
                stream,
                Token(session.slot() as usize),
                Interest::READABLE | Interest::WRITABLE,
            ),
            None => Ok(()),
        }
    }

    // -------------------------------------------------------------- readiness

    /// Translates readiness into completions. This thread never touches the
    /// rings; it only stamps each event with the identity the session's
    /// request descriptor currently carries.
    fn readiness_loop(&self, mut poll: Poll) {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        loop {
            if let Err(err) = poll.poll(&mut events, None) {
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                logging::error!(self.log, "readiness poll failed"; "error" => %err);
                break;
            }

            if !self.running() {
                break;
            }

            for event in events.iter() {
                let token = event.token();
                if token == WAKE_TOKEN {
                    continue;
                }

                let session = match self.sessions.get(token.0) {
                    Some(session) => session,
                    None => continue,
                };
                if !session.is_valid() {
                    continue;
                }
                let slot = token.0 as u16;

                if event.is_readable() || event.is_read_closed() {
                    self.port.post(Completion::Io {
                        slot,
                        id: session.recv_req.id(),
                        op: session.recv_req.op,
                    });
                }
                if event.is_writable() || event.is_write_closed() {
                    self.port.post(Completion::Io {
                        slot,
                        id: session.send_req.id(),
                        op: session.send_req.op,
                    });
                }
            }
        }

        logging::debug!(self.log, "readiness thread stopped");
    }

    // ---------------------------------------------------------------- workers

    fn worker_loop(&self) {
        loop {
            match self.port.wait() {
                Completion::Shutdown => break,
                Completion::Io { slot, id, op } => {
                    let session = match self.sessions.get(slot as usize) {
                        Some(session) => session,
                        None => continue,
                    };
                    // Stale completion for a prior occupant of the slot.
                    if !session.is_valid() || session.id() != id {
                        continue;
                    }
                    match op {
                        IoOp::Recv => self.process_recv(session),
                        IoOp::Send => self.process_send(session),
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------- recv path

    /// Drains the socket into the receive ring and frames complete packets
    /// out of it. The ring guard is held for the whole drain, which is what
    /// makes this session single-parser: concurrent completions serialize
    /// here and find nothing left to do.
    fn process_recv(&self, session: &Session) {
        let id = session.id();

        let fate = {
            let mut ring = session.recv_ring();
            loop {
                if !session.is_valid() || session.id() != id {
                    break RecvFate::Keep;
                }
                match self.read_once(session, &mut ring) {
                    ReadOutcome::Data => match self.parse_packets(session, &mut ring) {
                        Ok(()) => continue,
                        Err(kind) => break RecvFate::Drop(kind),
                    },
                    ReadOutcome::WouldBlock => break RecvFate::Keep,
                    ReadOutcome::Gone => break RecvFate::Keep,
                    ReadOutcome::Closed => break RecvFate::Drop(FaultKind::PeerClosed),
                    ReadOutcome::Overflow => break RecvFate::Drop(FaultKind::RecvOverflow),
                    ReadOutcome::Error(kind) => break RecvFate::Drop(FaultKind::Io(kind)),
                }
            }
        };

        if let RecvFate::Drop(reason) = fate {
            self.disconnect_session(session, reason);
        }
    }

    /// One scatter-gather read into the ring's free spans.
    fn read_once(&self, session: &Session, ring: &mut RingBuffer) -> ReadOutcome {
        if ring.free_size() == 0 {
            return ReadOutcome::Overflow;
        }

        let mut socket = session.socket();
        let stream = match socket.as_mut() {
            Some(stream) => stream,
            None => return ReadOutcome::Gone,
        };

        loop {
            let result = {
                let (first, second) = ring.write_ptrs();
                let mut spans = [IoSliceMut::new(first), IoSliceMut::new(second)];
                stream.read_vectored(&mut spans)
            };

            return match result {
                Ok(0) => ReadOutcome::Closed,
                Ok(count) => {
                    ring.move_write(count);
                    ReadOutcome::Data
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => ReadOutcome::WouldBlock,
                Err(err) => ReadOutcome::Error(err.kind()),
            };
        }
    }

    /// Frames as many complete packets as the ring holds. A size-bound
    /// violation aborts the session; an incomplete tail waits for more bytes.
    fn parse_packets(&self, session: &Session, ring: &mut RingBuffer) -> Result<(), FaultKind> {
        loop {
            if !session.is_valid() {
                return Ok(());
            }

            let mut raw = [0u8; HEADER_SIZE];
            if ring.peek(&mut raw) == 0 {
                return Ok(());
            }

            let header = Header::decode_array(&raw);
            match header.validate_size() {
                Ok(()) => {}
                Err(NetError::Fatal(kind)) => return Err(kind),
                Err(NetError::Wait) => return Ok(()),
            }

            let size = header.size as usize;
            if ring.data_size() < size {
                return Ok(());
            }

            let mut packet = vec![0u8; size];
            ring.dequeue(&mut packet);

            match self.architecture {
                Architecture::Centralized => {
                    self.events.push(NetEvent::Received(session.id(), packet))
                }
                Architecture::EchoTest => {
                    if session.send_ring.enqueue(&packet) == 0 {
                        return Err(FaultKind::SendCongestion);
                    }
                    self.post_send(session);
                }
            }
        }
    }

    // ------------------------------------------------------------- send path

    /// Claims the single-writer role for this session's socket. If a write is
    /// already in flight the new data is left in the ring; the in-flight
    /// drain observes it before releasing the claim.
    fn post_send(&self, session: &Session) {
        if session.sending.swap(true, Ordering::SeqCst) {
            return;
        }
        self.drive_send(session);
    }

    /// Writable completion. Only meaningful while a claimed drain is parked on
    /// a full socket buffer.
    fn process_send(&self, session: &Session) {
        if !session.sending.load(Ordering::SeqCst) {
            return;
        }
        self.drive_send(session);
    }

    fn drive_send(&self, session: &Session) {
        let id = session.id();

        loop {
            if !session.is_valid() || session.id() != id {
                return;
            }

            let fate = {
                let mut view = session.send_ring.send_view();
                if view.data_size() == 0 {
                    session.sending.store(false, Ordering::SeqCst);
                    SendFate::Drained
                } else {
                    self.write_once(session, &mut view)
                }
            };

            match fate {
                SendFate::Wrote => continue,
                SendFate::Blocked | SendFate::Gone => return,
                SendFate::Drained => {
                    // A producer may have enqueued after observing the claim
                    // but before the flag cleared; that data would otherwise
                    // sit until the next unrelated send.
                    if session.send_ring.data_size() > 0
                        && !session.sending.swap(true, Ordering::SeqCst)
                    {
                        continue;
                    }
                    return;
                }
                SendFate::Fatal(kind) => {
                    self.disconnect_session(session, kind);
                    return;
                }
            }
        }
    }

    /// One scatter-gather write out of the view's read spans, consumed inside
    /// the same critical section that produced them.
    fn write_once(&self, session: &Session, view: &mut SendView<'_>) -> SendFate {
        let mut socket = session.socket();
        let stream = match socket.as_mut() {
            Some(stream) => stream,
            None => return SendFate::Gone,
        };

        loop {
            let result = {
                let (first, second) = view.spans();
                let spans = [IoSlice::new(first), IoSlice::new(second)];
                stream.write_vectored(&spans)
            };

            return match result {
                Ok(0) => SendFate::Fatal(FaultKind::Io(io::ErrorKind::WriteZero)),
                Ok(count) => {
                    view.consume(count);
                    SendFate::Wrote
                }
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => SendFate::Blocked,
                Err(err) => SendFate::Fatal(FaultKind::Io(err.kind())),
            };
        }
    }

    // --------------------------------------------------------------- teardown

    /// Exactly-once teardown, safe under concurrent completions of both
    /// directions. The slot is only handed back to the free list after the
    /// acceptor observes the closure via `pending_disconnect`.
    fn disconnect_session(&self, session: &Session, reason: FaultKind) {
        if !session.valid.swap(false, Ordering::SeqCst) {
            return;
        }

        let id = session.id();
        logging::info!(self.log, "client disconnected"; "session_id" => %id, "reason" => ?reason);

        session.close();
        session.sending.store(false, Ordering::SeqCst);
        sync::lock(&self.pending_disconnect).push(id);

        if self.running() {
            if let Architecture::Centralized = self.architecture {
                self.events.push(NetEvent::Disconnected(id));
            }
        }
    }
}

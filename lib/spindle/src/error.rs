use std::io;
use std::net;

pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NetError {
    /// The operation cannot make progress right now; retry when readiness returns.
    Wait,
    /// The session (or the engine) cannot continue.
    Fatal(FaultKind),
}

/// The reason a session or an engine operation was aborted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FaultKind {
    Requested,
    PeerClosed,
    RecvOverflow,
    SendCongestion,
    UndersizePacket,
    OversizePacket,
    AtCapacity,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetError::Wait,
            kind => NetError::Fatal(FaultKind::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetError::Fatal(FaultKind::AddrParse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_would_block_is_wait() {
        let err: NetError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(err, NetError::Wait);
    }

    #[test]
    fn test_other_io_errors_are_fatal() {
        let err: NetError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert_eq!(err, NetError::Fatal(FaultKind::Io(io::ErrorKind::ConnectionReset)));
    }
}

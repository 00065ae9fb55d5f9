//! Per-connection buffering and request/response pipelining.
//!
//! Each connection owns a fixed-capacity read buffer and write buffer; no
//! per-connection allocation grows without bound. A connection can have
//! several requests queued in its read buffer (pipelining); each is
//! dispatched and flushed in turn, one reply at a time, so the write
//! buffer never needs to hold more than a single encoded reply.

use arrayvec::ArrayVec;
use std::io::{self, Read, Write};

use crate::dispatcher;
use crate::keyspace::Keyspace;
use crate::protocol::{ParseOutcome, ProtocolError, Reply};

/// Read buffer capacity: a 4-byte length prefix plus one maximal message.
const READ_BUF_CAP: usize = 4 + 4096;
/// Write buffer capacity: exactly one maximal encoded reply, so a single
/// queued reply can never overflow it.
const WRITE_BUF_CAP: usize = 4 + 4096;

/// What the reactor should do with a connection after a poll/drive cycle.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnState {
    /// Keep watching for readability (and writability, if the write
    /// buffer is non-empty).
    Active,
    /// The peer closed the connection, or it violated the protocol;
    /// the reactor should deregister and drop it.
    Close,
}

/// Buffering and protocol state for one TCP connection.
pub struct Connection {
    read_buf: ArrayVec<u8, READ_BUF_CAP>,
    write_buf: ArrayVec<u8, WRITE_BUF_CAP>,
    write_pos: usize,
}

impl Connection {
    pub fn new() -> Self {
        Connection {
            read_buf: ArrayVec::new(),
            write_buf: ArrayVec::new(),
            write_pos: 0,
        }
    }

    /// True once there are queued reply bytes the reactor should try to
    /// write out.
    pub fn wants_write(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }

    /// Reads whatever is available from `socket` into the read buffer,
    /// then dispatches and flushes buffered requests one at a time.
    /// Requests are only ever parsed once the previous reply has fully
    /// drained, so the write buffer holds at most one reply; if flushing
    /// blocks partway, remaining requests stay in `read_buf` for the next
    /// readiness event to pick up. Returns [`ConnState::Close`] if the
    /// peer disconnected or broke protocol.
    pub fn on_readable<S: Read + Write>(&mut self, socket: &mut S, keyspace: &mut Keyspace) -> io::Result<ConnState> {
        loop {
            if self.read_buf.is_full() {
                // A full buffer with no parseable frame means a request
                // larger than we ever accept; try_drain below already
                // rejects this as ProtocolError::TooBig once 4 header
                // bytes are in, so this only guards against never
                // reaching that point (which can't happen since 4 <
                // READ_BUF_CAP).
                return Ok(ConnState::Close);
            }
            let mut chunk = [0u8; 4096];
            let room = self.read_buf.remaining_capacity().min(chunk.len());
            let n = match socket.read(&mut chunk[..room]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.read_buf.try_extend_from_slice(&chunk[..n]).expect("bounded by remaining_capacity");
            if n < room {
                break;
            }
        }

        match self.drain_requests(socket, keyspace) {
            Ok(()) => Ok(ConnState::Active),
            Err(DrainError::Protocol) => Ok(ConnState::Close),
            Err(DrainError::Io(e)) => Err(e),
            Err(DrainError::PeerClosed) => Ok(ConnState::Close),
        }
    }

    /// Parses and dispatches one buffered request at a time, flushing each
    /// reply before the next request is even parsed. A reply is only
    /// queued into an empty write buffer, so `WRITE_BUF_CAP` (sized to one
    /// maximal message) always has room — no reply is ever silently
    /// dropped under pipelining.
    fn drain_requests<W: Write>(&mut self, socket: &mut W, keyspace: &mut Keyspace) -> Result<(), DrainError> {
        loop {
            if self.wants_write() {
                self.flush(socket)?;
                if self.wants_write() {
                    // Flushing blocked partway; stop parsing further
                    // requests until the reactor reports writability again.
                    return Ok(());
                }
            }
            let outcome = crate::protocol::try_parse(&self.read_buf).map_err(|e| {
                self.log_protocol_error(e);
                DrainError::Protocol
            })?;
            match outcome {
                ParseOutcome::Incomplete => return Ok(()),
                ParseOutcome::Parsed { args, consumed } => {
                    let reply = dispatcher::dispatch(keyspace, &args);
                    self.queue_reply(&reply);
                    self.read_buf.drain(..consumed);
                }
            }
        }
    }

    fn log_protocol_error(&self, err: ProtocolError) {
        log::warn!("closing connection: {err}");
    }

    fn queue_reply(&mut self, reply: &Reply) {
        let encoded = reply.encode();
        debug_assert!(!self.wants_write(), "queue_reply called with an unflushed write buffer");
        self.write_buf.clear();
        self.write_pos = 0;
        self.write_buf
            .try_extend_from_slice(&encoded)
            .expect("WRITE_BUF_CAP holds any single encoded reply, by construction");
    }

    /// Writes as much of the queued reply bytes to `socket` as it will
    /// accept without blocking.
    fn flush<W: Write>(&mut self, socket: &mut W) -> Result<(), DrainError> {
        while self.write_pos < self.write_buf.len() {
            match socket.write(&self.write_buf[self.write_pos..]) {
                Ok(0) => return Err(DrainError::PeerClosed),
                Ok(n) => self.write_pos += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DrainError::Io(e)),
            }
        }
        if self.write_pos == self.write_buf.len() {
            self.write_buf.clear();
            self.write_pos = 0;
        }
        Ok(())
    }

    /// Flushes as much of the queued reply bytes to `socket` as it will
    /// accept without blocking, for use when the reactor reports
    /// writability outside of a read cycle.
    pub fn on_writable<W: Write>(&mut self, socket: &mut W) -> io::Result<ConnState> {
        match self.flush(socket) {
            Ok(()) => Ok(ConnState::Active),
            Err(DrainError::PeerClosed) => Ok(ConnState::Close),
            Err(DrainError::Io(e)) => Err(e),
            Err(DrainError::Protocol) => unreachable!("flush never produces a protocol error"),
        }
    }
}

/// Internal outcome of a flush/drain attempt, distinguishing a fatal I/O
/// error (propagated to the caller) from conditions that just mean "close
/// this connection".
enum DrainError {
    Protocol,
    PeerClosed,
    Io(io::Error),
}

impl From<io::Error> for DrainError {
    fn from(e: io::Error) -> Self {
        DrainError::Io(e)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

//! The readiness-multiplexer boundary the event loop programs against.
//!
//! [`EventLoop`](crate::event_loop::EventLoop) only depends on the
//! [`Reactor`] trait, not on any particular I/O multiplexer; [`MioReactor`]
//! is the one production implementation, built on `mio`. Keeping the
//! boundary explicit makes the event loop's dispatch logic testable
//! against a fake reactor that never touches a real socket.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

/// Identifies one registered I/O source across calls to a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(pub usize);

/// One readiness notification from [`Reactor::poll`].
#[derive(Debug, Clone, Copy)]
pub struct ReadyEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

/// A readiness-based I/O multiplexer: a listener plus a set of registered
/// streams, each addressed by a [`Token`].
pub trait Reactor {
    /// The registered-stream type; connections read and write through
    /// this directly.
    type Stream: Read + Write;

    /// The token reserved for listener-readiness events.
    const LISTENER_TOKEN: Token;

    /// Blocks until at least one registered source has new readiness,
    /// returning every event observed.
    fn poll(&mut self) -> io::Result<Vec<ReadyEvent>>;

    /// Accepts one pending connection without blocking. `Ok(None)` means
    /// no connection was waiting.
    fn accept(&mut self) -> io::Result<Option<Self::Stream>>;

    /// Registers `stream` for readability under `token`. New connections
    /// start with nothing queued to write, so there's no reason to ask
    /// for writability yet; call [`Reactor::reregister`] once that
    /// changes.
    fn register(&mut self, stream: &mut Self::Stream, token: Token) -> io::Result<()>;

    /// Updates a registered stream's interest: always readable, and
    /// writable only when `writable` is true. Driven by each connection's
    /// own state (`Connection::wants_write`) rather than kept static for
    /// the socket's whole lifetime — registering for constant writability
    /// would make the reactor report writable on essentially every poll,
    /// since a TCP send buffer is almost always non-full.
    fn reregister(&mut self, stream: &mut Self::Stream, token: Token, writable: bool) -> io::Result<()>;

    /// Stops watching `stream`. Called just before it's dropped.
    fn deregister(&mut self, stream: &mut Self::Stream) -> io::Result<()>;
}

/// The production [`Reactor`], backed by `mio`'s epoll/kqueue/IOCP
/// abstraction.
pub struct MioReactor {
    poll: mio::Poll,
    listener: mio::net::TcpListener,
    events: mio::Events,
}

impl MioReactor {
    const LISTENER_TOKEN_RAW: mio::Token = mio::Token(0);

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let mut listener = mio::net::TcpListener::bind(addr)?;
        let poll = mio::Poll::new()?;
        poll.registry()
            .register(&mut listener, Self::LISTENER_TOKEN_RAW, mio::Interest::READABLE)?;
        Ok(MioReactor {
            poll,
            listener,
            events: mio::Events::with_capacity(1024),
        })
    }
}

impl Reactor for MioReactor {
    type Stream = mio::net::TcpStream;

    const LISTENER_TOKEN: Token = Token(0);

    fn poll(&mut self) -> io::Result<Vec<ReadyEvent>> {
        self.poll.poll(&mut self.events, None)?;
        Ok(self
            .events
            .iter()
            .map(|event| ReadyEvent {
                token: Token(event.token().0),
                readable: event.is_readable(),
                writable: event.is_writable(),
            })
            .collect())
    }

    fn accept(&mut self) -> io::Result<Option<Self::Stream>> {
        match self.listener.accept() {
            Ok((stream, _peer)) => Ok(Some(stream)),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn register(&mut self, stream: &mut Self::Stream, token: Token) -> io::Result<()> {
        self.poll.registry().register(stream, mio::Token(token.0), mio::Interest::READABLE)
    }

    fn reregister(&mut self, stream: &mut Self::Stream, token: Token, writable: bool) -> io::Result<()> {
        let interest = if writable {
            mio::Interest::READABLE | mio::Interest::WRITABLE
        } else {
            mio::Interest::READABLE
        };
        self.poll.registry().reregister(stream, mio::Token(token.0), interest)
    }

    fn deregister(&mut self, stream: &mut Self::Stream) -> io::Result<()> {
        self.poll.registry().deregister(stream)
    }
}

//! Debugger transport
//!
//! The engine carries no debug protocol of its own. A Context keeps at most
//! one attached transport and services it when asked: it drains whatever the
//! client sent and notices when the client goes away.

use crate::context::Context;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

/// Byte channel to a debug client.
pub trait DebugTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Bytes available without blocking.
    fn peek(&mut self) -> io::Result<usize>;

    fn read_flush(&mut self) {}

    fn write_flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// The Context dropped this transport.
    fn detached(&mut self) {}
}

/// Blocking TCP transport for a single client.
pub struct SocketTransport {
    stream: TcpStream,
    peer: SocketAddr,
}

impl SocketTransport {
    /// Listen on `addr` and block until one client connects.
    pub fn accept(addr: &str) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        tracing::info!(addr = %listener.local_addr()?, "waiting for debugger");
        let (stream, peer) = listener.accept()?;
        stream.set_nodelay(true)?;
        tracing::info!(%peer, "debugger connected");
        Ok(Self { stream, peer })
    }

    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        Ok(Self { stream, peer })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl DebugTransport for SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn peek(&mut self) -> io::Result<usize> {
        let mut peeked = [0u8; 256];
        self.stream.set_nonblocking(true)?;
        let available = match self.stream.peek(&mut peeked) {
            // A readable socket with nothing in it is a closed one.
            Ok(0) => Err(io::Error::from(ErrorKind::UnexpectedEof)),
            Ok(count) => Ok(count),
            Err(error) if error.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(error) => Err(error),
        };
        self.stream.set_nonblocking(false)?;
        available
    }

    fn write_flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }

    fn detached(&mut self) {
        tracing::info!(peer = %self.peer, "debugger detached");
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl Context {
    /// Block until a debug client connects on `addr`, then attach it.
    pub fn wait_for_debugger(&self, addr: &str) -> io::Result<()> {
        let transport = SocketTransport::accept(addr)?;
        self.attach_debugger(Box::new(transport));
        Ok(())
    }

    pub fn attach_debugger(&self, transport: Box<dyn DebugTransport>) {
        let previous = self.shared.state.debugger.borrow_mut().replace(transport);
        if let Some(mut previous) = previous {
            previous.detached();
        }
        tracing::debug!(context = self.id().0, "debugger attached");
    }

    pub fn is_debugging(&self) -> bool {
        self.shared.state.debugger.borrow().is_some()
    }

    /// Service the attached transport. Returns the number of bytes drained.
    ///
    /// A transport failure detaches the debugger.
    pub fn cooperate_debugger(&self) -> usize {
        let mut slot = self.shared.state.debugger.borrow_mut();
        let Some(transport) = slot.as_mut() else {
            return 0;
        };

        let mut drained = 0;
        let mut buf = [0u8; 1024];
        let outcome = loop {
            match transport.peek() {
                Ok(0) => break Ok(()),
                Ok(_) => match transport.read(&mut buf) {
                    Ok(0) => break Err(io::Error::from(ErrorKind::UnexpectedEof)),
                    Ok(count) => drained += count,
                    Err(error) => break Err(error),
                },
                Err(error) => break Err(error),
            }
        };
        transport.read_flush();

        if let Err(error) = outcome.and_then(|()| transport.write_flush()) {
            tracing::warn!(context = self.id().0, %error, "debug transport failed");
            if let Some(mut transport) = slot.take() {
                transport.detached();
            }
        }
        drained
    }

    pub fn detach_debugger(&self) {
        let transport = self.shared.state.debugger.borrow_mut().take();
        if let Some(mut transport) = transport {
            transport.detached();
        }
    }
}

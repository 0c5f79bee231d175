//! Per-socket buffering and frame reassembly
//!
//! A [`Connection`] owns one non-blocking client socket together with:
//! - a [`FrameParser`] holding the receive buffer and parse state
//! - an outbound byte buffer drained from the front as the socket accepts data
//! - the player name bound to the socket after a successful join
//!
//! Connections are only touched by the reactor thread. Write interest is
//! registered only while outbound bytes are queued.
//!
//! Once queued output reaches half the outbound limit the connection is
//! backlogged: the reactor stops reading from it until the peer has taken
//! enough of its replies.

use bytes::{Buf, BytesMut};
use log::debug;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use shared::{Action, FrameParser, ParseState, ProtocolError};
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};

/// Size of each non-blocking receive.
const RECV_CHUNK: usize = 12 * 1024;

/// Result of one receive call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// This many bytes were appended to the receive buffer; more may follow.
    Received(usize),
    /// The socket has no more bytes right now.
    Drained,
    /// Zero-byte read: the peer shut down its side.
    PeerClosed,
}

#[derive(Debug)]
pub struct Connection {
    pub token: Token,
    pub addr: SocketAddr,
    /// Player name bound by a successful join.
    pub peer_identity: Option<String>,
    stream: TcpStream,
    parser: FrameParser,
    send_buffer: BytesMut,
    interest: Interest,
    closing: bool,
    reading_paused: bool,
    last_seen: Instant,
    max_send_buffer: usize,
}

impl Connection {
    pub fn new(token: Token, stream: TcpStream, addr: SocketAddr, config: &ServerConfig) -> Self {
        Self {
            token,
            addr,
            peer_identity: None,
            stream,
            parser: FrameParser::with_max_content_length(config.max_content_length),
            send_buffer: BytesMut::new(),
            interest: Interest::READABLE,
            closing: false,
            reading_paused: false,
            last_seen: Instant::now(),
            max_send_buffer: config.max_send_buffer,
        }
    }

    pub fn register(&mut self, registry: &Registry) -> io::Result<()> {
        self.interest = Interest::READABLE;
        registry.register(&mut self.stream, self.token, self.interest)
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }

    /// Reads at most one chunk into the receive buffer.
    ///
    /// mio reports readiness on edges, so the caller must keep calling until
    /// `Drained` or `PeerClosed`, or come back later without a new event.
    pub fn receive(&mut self) -> io::Result<ReadStatus> {
        let mut chunk = [0u8; RECV_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(ReadStatus::PeerClosed),
                Ok(n) => {
                    self.last_seen = Instant::now();
                    self.parser.extend(&chunk[..n]);
                    return Ok(ReadStatus::Received(n));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadStatus::Drained),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Takes the next complete frame off the receive buffer and decodes it.
    pub fn next_action(&mut self) -> std::result::Result<Option<Action>, ProtocolError> {
        Ok(self
            .parser
            .next_frame()?
            .map(|frame| Action::from_content(&frame.content)))
    }

    /// Appends an encoded frame to the outbound buffer.
    ///
    /// When the frame does not fit, the buffer is flushed first; the
    /// connection is only full if the socket would block before enough room
    /// was made.
    pub fn queue(&mut self, bytes: &[u8]) -> Result<()> {
        if self.send_buffer.len() + bytes.len() > self.max_send_buffer {
            self.flush()?;
        }
        if self.send_buffer.len() + bytes.len() > self.max_send_buffer {
            return Err(ServerError::SendBufferFull {
                limit: self.max_send_buffer,
            });
        }
        self.send_buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes as much of the outbound buffer as the socket accepts.
    ///
    /// A short write is normal; the rest stays queued for the next writable
    /// event.
    pub fn flush(&mut self) -> io::Result<usize> {
        let mut written = 0;
        while !self.send_buffer.is_empty() {
            match self.stream.write(&self.send_buffer) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.send_buffer.advance(n);
                    written += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if written > 0 {
            debug!("Sent {} bytes to {}", written, self.addr);
        }
        Ok(written)
    }

    /// Registers write interest while output is pending and drops it once the
    /// buffer drains.
    pub fn sync_interest(&mut self, registry: &Registry) -> io::Result<()> {
        let wanted = if self.send_buffer.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if wanted != self.interest {
            registry.reregister(&mut self.stream, self.token, wanted)?;
            self.interest = wanted;
        }
        Ok(())
    }

    pub fn has_pending_output(&self) -> bool {
        !self.send_buffer.is_empty()
    }

    #[cfg(test)]
    pub fn pending_output(&self) -> &[u8] {
        &self.send_buffer
    }

    pub fn is_backlogged(&self) -> bool {
        self.send_buffer.len() >= self.max_send_buffer / 2
    }

    pub fn pause_reading(&mut self) {
        self.reading_paused = true;
    }

    /// Clears the pause flag, returning whether reads were paused.
    pub fn resume_reading(&mut self) -> bool {
        std::mem::replace(&mut self.reading_paused, false)
    }

    #[cfg(test)]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn parse_state(&self) -> &ParseState {
        self.parser.state()
    }

    pub fn mark_closing(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

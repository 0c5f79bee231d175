//! Single-threaded readiness loop
//!
//! The [`Reactor`] owns the listening socket, every client [`Connection`] and
//! the [`GameState`]. One thread runs [`Reactor::run`]; the only blocking
//! call is the bounded `poll`. For each iteration it:
//! - accepts pending connections until the listener would block
//! - services each ready connection, reads before writes
//! - resumes connections whose reads were deferred or paused
//! - drains the control channel when woken
//! - runs periodic work (closing flagged connections, idle eviction,
//!   heartbeats)
//!
//! Other threads talk to the reactor only through a [`ReactorHandle`], which
//! queues a [`ControlMessage`] and wakes the poll.
//!
//! Reads are interleaved with dispatch one chunk at a time and capped per
//! readiness event, so a peer streaming requests cannot starve the others.
//! A peer that stops taking its replies stops being read once its outbound
//! buffer is backlogged, and is picked up again when writes catch up.
//!
//! A fault on one connection closes that connection only; `run` returns an
//! error only when polling itself fails.

use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use serde::Serialize;
use shared::{encode_message, Action, GameSnapshot, ProtocolError, Reply, ServerEvent};
use std::io;
use std::net::SocketAddr;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::broadcaster;
use crate::config::ServerConfig;
use crate::connection::{Connection, ReadStatus};
use crate::dispatcher::{self, Caller, Dispatch, IdentityChange};
use crate::error::{Result, ServerError};
use crate::game::GameState;
use crate::registry::ConnectionRegistry;

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);

/// Loop iterations between debug statistics lines.
const STATS_INTERVAL: u64 = 600;

/// Bytes read from one connection per readiness event before moving on.
const READ_BUDGET: usize = 64 * 1024;

/// Requests delivered to the reactor thread from elsewhere.
#[derive(Debug)]
pub enum ControlMessage {
    Snapshot {
        reply: mpsc::Sender<GameSnapshot>,
    },
    /// Runs an action through the dispatcher. `as_player` is the identity to
    /// act with; `None` acts with operator rights.
    Execute {
        as_player: Option<String>,
        action: Action,
        reply: mpsc::Sender<Option<Reply>>,
    },
    Shutdown,
}

/// Cloneable, thread-safe handle to a running reactor.
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    sender: mpsc::Sender<ControlMessage>,
    waker: Arc<Waker>,
}

impl ReactorHandle {
    fn send(&self, message: ControlMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| ServerError::ControlChannelClosed)?;
        self.waker.wake()?;
        Ok(())
    }

    /// Asks the reactor to stop after the current iteration.
    pub fn shutdown(&self) -> Result<()> {
        self.send(ControlMessage::Shutdown)
    }

    pub fn snapshot(&self) -> Result<GameSnapshot> {
        let (reply, response) = mpsc::channel();
        self.send(ControlMessage::Snapshot { reply })?;
        response.recv().map_err(|_| ServerError::ControlChannelClosed)
    }

    /// Applies `action` on the reactor thread and returns its direct reply.
    /// Broadcasts it produces go out to every connection.
    pub fn execute(&self, as_player: Option<String>, action: Action) -> Result<Option<Reply>> {
        let (reply, response) = mpsc::channel();
        self.send(ControlMessage::Execute {
            as_player,
            action,
            reply,
        })?;
        response.recv().map_err(|_| ServerError::ControlChannelClosed)
    }
}

pub struct Reactor {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    connections: ConnectionRegistry,
    game: GameState,
    config: ServerConfig,
    control_tx: mpsc::Sender<ControlMessage>,
    control_rx: mpsc::Receiver<ControlMessage>,
    waker: Arc<Waker>,
    /// Connections to read again on the next iteration without a new event.
    deferred_reads: Vec<Token>,
    running: bool,
    iterations: u64,
    last_heartbeat: Instant,
}

impl Reactor {
    /// Binds the listening socket and starts a fresh game.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        config.validate()?;
        let game = GameState::new(config.grid_size)?;
        Self::with_game(config, game)
    }

    /// Binds the listening socket around an existing game.
    pub fn with_game(config: ServerConfig, game: GameState) -> Result<Self> {
        config.validate()?;
        if game.grid_size != config.grid_size {
            return Err(ServerError::Config(format!(
                "game grid size {} does not match configured grid size {}",
                game.grid_size, config.grid_size
            )));
        }
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(config.addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER)?);
        let (control_tx, control_rx) = mpsc::channel();

        info!("Server listening on {}", listener.local_addr()?);

        Ok(Self {
            poll,
            events: Events::with_capacity(1024),
            listener,
            connections: ConnectionRegistry::new(),
            game,
            config,
            control_tx,
            control_rx,
            waker,
            deferred_reads: Vec::new(),
            running: true,
            iterations: 0,
            last_heartbeat: Instant::now(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            sender: self.control_tx.clone(),
            waker: Arc::clone(&self.waker),
        }
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Runs the loop until a shutdown request arrives.
    pub fn run(&mut self) -> Result<()> {
        info!("Server started successfully");
        while self.running {
            self.poll_once()?;
        }
        for mut connection in self.connections.drain() {
            if let Err(e) = connection.deregister(self.poll.registry()) {
                debug!("Failed to deregister {}: {}", connection.addr, e);
            }
        }
        info!("Server stopped after {} iterations", self.iterations);
        Ok(())
    }

    /// Waits for readiness once and services everything that became ready.
    pub fn poll_once(&mut self) -> Result<()> {
        let timeout = if self.deferred_reads.is_empty() {
            self.config.poll_timeout
        } else {
            Duration::ZERO
        };
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => {
                error!("Poll failed: {}", e);
                return Err(e.into());
            }
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                (
                    event.token(),
                    event.is_readable() || event.is_read_closed() || event.is_error(),
                    event.is_writable(),
                )
            })
            .collect();

        for (token, readable, writable) in ready {
            match token {
                LISTENER => self.accept_connections(),
                WAKER => self.drain_control(),
                token => self.service(token, readable, writable),
            }
        }

        for token in std::mem::take(&mut self.deferred_reads) {
            self.service(token, true, false);
        }

        self.run_periodic();
        Ok(())
    }

    fn accept_connections(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.register_connection(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    break;
                }
            }
        }
    }

    fn register_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let token = self.connections.next_token();
        let mut connection = Connection::new(token, stream, addr, &self.config);
        if let Err(e) = connection.register(self.poll.registry()) {
            warn!("Failed to register connection from {}: {}", addr, e);
            return;
        }
        info!("Client connected from {} as {:?}", addr, token);
        self.connections.insert(connection);
    }

    fn service(&mut self, token: Token, readable: bool, writable: bool) {
        match self.service_connection(token, readable, writable) {
            Ok(()) => {}
            Err(ServerError::Protocol(e)) => {
                warn!("Protocol error on {:?}: {}", token, e);
                self.reject(token, &e);
                self.close_connection(token);
            }
            Err(e) => {
                warn!("Closing {:?}: {}", token, e);
                self.close_connection(token);
            }
        }
    }

    fn service_connection(&mut self, token: Token, readable: bool, writable: bool) -> Result<()> {
        if !self.connections.contains(token) {
            debug!("Ignoring event for closed connection {:?}", token);
            return Ok(());
        }
        if readable {
            self.handle_readable(token)?;
        }
        if writable {
            self.handle_writable(token)?;
        }
        Ok(())
    }

    /// Alternates between reading one chunk and dispatching the frames it
    /// completed.
    ///
    /// Stops early when the outbound buffer is backlogged (resumed from
    /// `handle_writable`) or the read budget is spent (resumed next
    /// iteration).
    fn handle_readable(&mut self, token: Token) -> Result<()> {
        let mut budget = READ_BUDGET;
        loop {
            self.drain_frames(token)?;

            let Some(connection) = self.connections.get_mut(token) else {
                return Ok(());
            };
            if connection.is_closing() {
                return Ok(());
            }
            if connection.is_backlogged() {
                debug!("Pausing reads on {:?} until output drains", token);
                connection.pause_reading();
                break;
            }
            if budget == 0 {
                self.deferred_reads.push(token);
                break;
            }

            match connection.receive()? {
                ReadStatus::Received(n) => budget = budget.saturating_sub(n),
                ReadStatus::Drained => break,
                ReadStatus::PeerClosed => {
                    // Complete frames that arrived before end of stream are still processed.
                    self.drain_frames(token)?;
                    info!("Peer {:?} closed the connection", token);
                    self.close_connection(token);
                    return Ok(());
                }
            }
        }

        // Replies produced by this read go out without waiting for another event.
        self.handle_writable(token)
    }

    fn handle_writable(&mut self, token: Token) -> Result<()> {
        let Some(connection) = self.connections.get_mut(token) else {
            return Ok(());
        };
        if connection.has_pending_output() {
            connection.flush()?;
        }
        connection.sync_interest(self.poll.registry())?;
        if !connection.is_backlogged() && connection.resume_reading() {
            debug!("Resuming reads on {:?}", token);
            self.deferred_reads.push(token);
        }
        Ok(())
    }

    /// Dispatches complete frames in arrival order while there is room for
    /// their replies.
    fn drain_frames(&mut self, token: Token) -> Result<()> {
        loop {
            let Some(connection) = self.connections.get_mut(token) else {
                return Ok(());
            };
            if connection.is_closing() {
                return Ok(());
            }
            if connection.is_backlogged() {
                connection.flush()?;
                if connection.is_backlogged() {
                    return Ok(());
                }
            }
            let Some(action) = connection.next_action()? else {
                return Ok(());
            };
            let identity = connection.peer_identity.clone();
            debug!("{:?} requested {}", token, action.name());

            let outcome = dispatcher::dispatch(&mut self.game, Caller::Peer(identity.as_deref()), action);
            self.apply(Some(token), outcome);
        }
    }

    /// Applies a dispatch result: identity changes, direct reply, broadcasts.
    fn apply(&mut self, origin: Option<Token>, outcome: Dispatch) -> Option<Reply> {
        let Dispatch {
            reply,
            broadcasts,
            identity,
            departed,
        } = outcome;

        for name in &departed {
            self.connections.unbind_identity(name);
        }

        if let Some(token) = origin {
            if let IdentityChange::Bind(name) = identity {
                if let Some(connection) = self.connections.get_mut(token) {
                    connection.peer_identity = Some(name);
                }
            }

            if let Some(reply) = &reply {
                if let Err(e) =
                    broadcaster::send_to(&mut self.connections, self.poll.registry(), token, reply)
                {
                    warn!("Failed to queue reply for {:?}: {}", token, e);
                }
            }
        }

        for event in &broadcasts {
            self.broadcast(event);
        }
        reply
    }

    fn broadcast<T: Serialize>(&mut self, message: &T) {
        if let Err(e) = broadcaster::broadcast(&mut self.connections, self.poll.registry(), message)
        {
            error!("Failed to encode broadcast: {}", e);
        }
    }

    /// Queues a best-effort error frame before a connection is dropped.
    fn reject(&mut self, token: Token, reason: &ProtocolError) {
        let Some(connection) = self.connections.get_mut(token) else {
            return;
        };
        let Ok(bytes) = encode_message(&Reply::error(reason.to_string())) else {
            return;
        };
        if connection.queue(&bytes).is_ok() {
            if let Err(e) = connection.flush() {
                debug!("Could not deliver protocol error to {}: {}", connection.addr, e);
            }
        }
    }

    /// Removes a connection, discarding queued output, and announces the
    /// departure of its player.
    fn close_connection(&mut self, token: Token) {
        let Some(mut connection) = self.connections.remove(token) else {
            return;
        };
        if let Err(e) = connection.deregister(self.poll.registry()) {
            debug!("Failed to deregister {}: {}", connection.addr, e);
        }
        info!("Client {} disconnected", connection.addr);
        debug!("{:?} closed while {:?}", token, connection.parse_state());

        let identity = connection.peer_identity.take();
        drop(connection);

        if let Some(name) = identity {
            if let Some(event) = dispatcher::depart(&mut self.game, &name) {
                self.broadcast(&event);
            }
        }
    }

    fn drain_control(&mut self) {
        while let Ok(message) = self.control_rx.try_recv() {
            match message {
                ControlMessage::Snapshot { reply } => {
                    let _ = reply.send(self.game.snapshot());
                }
                ControlMessage::Execute {
                    as_player,
                    action,
                    reply,
                } => {
                    let caller = match as_player.as_deref() {
                        Some(name) => Caller::Peer(Some(name)),
                        None => Caller::Operator,
                    };
                    let outcome = dispatcher::dispatch(&mut self.game, caller, action);
                    let _ = reply.send(self.apply(None, outcome));
                }
                ControlMessage::Shutdown => {
                    info!("Shutdown requested");
                    self.running = false;
                }
            }
        }
    }

    fn run_periodic(&mut self) {
        self.iterations += 1;

        for token in self.connections.closing_tokens() {
            self.close_connection(token);
        }

        if let Some(timeout) = self.config.idle_timeout {
            for token in self.connections.idle_tokens(timeout) {
                info!("Connection {:?} timed out", token);
                self.close_connection(token);
            }
        }

        if let Some(interval) = self.config.heartbeat_interval {
            if self.last_heartbeat.elapsed() >= interval {
                self.last_heartbeat = Instant::now();
                if !self.connections.is_empty() {
                    let heartbeat = ServerEvent::Heartbeat {
                        turn: self.game.turn,
                        players: self.game.players.len(),
                    };
                    self.broadcast(&heartbeat);
                }
            }
        }

        if self.iterations % STATS_INTERVAL == 0 {
            debug!(
                "Iteration {}: {} connections, {} players, turn {}",
                self.iterations,
                self.connections.len(),
                self.game.players.len(),
                self.game.turn
            );
        }
    }
}

/// A reactor running on its own thread.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    handle: ReactorHandle,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn handle(&self) -> &ReactorHandle {
        &self.handle
    }

    /// Requests shutdown and waits for the reactor thread to exit.
    pub fn stop(mut self) -> Result<()> {
        self.handle.shutdown()?;
        self.join()
    }

    /// Waits for the reactor thread to exit on its own.
    pub fn wait(mut self) -> Result<()> {
        self.join()
    }

    fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| ServerError::ReactorPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.handle.shutdown();
            let _ = self.join();
        }
    }
}

/// Binds a reactor with a fresh game and runs it on a dedicated thread.
pub fn spawn_server(config: ServerConfig) -> Result<ServerHandle> {
    start(Reactor::bind(config)?)
}

/// Like [`spawn_server`], around an existing game.
pub fn spawn_server_with_game(config: ServerConfig, game: GameState) -> Result<ServerHandle> {
    start(Reactor::with_game(config, game)?)
}

fn start(mut reactor: Reactor) -> Result<ServerHandle> {
    let addr = reactor.local_addr()?;
    let handle = reactor.handle();
    let thread = thread::Builder::new()
        .name("reactor".into())
        .spawn(move || reactor.run())?;
    Ok(ServerHandle {
        addr,
        handle,
        thread: Some(thread),
    })
}

//! # Game Server Library
//!
//! This library provides the authoritative server for the grid treasure-hunt
//! game. It owns the canonical game state, decodes framed client requests,
//! applies them as game actions and fans the results out to every connected
//! client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! Every rule decision happens here. Clients send requests and render whatever
//! the server broadcasts; they never mutate state on their own.
//!
//! ### Connection Management
//! Handles the complete lifecycle of client sockets:
//! - Accepting connections and assigning poll tokens
//! - Reassembling frames from partial reads
//! - Binding a connection to the player it joined as
//! - Closing faulty, slow or idle connections without disturbing the others
//!
//! ### Broadcasting
//! Roster changes, state updates and chat are encoded once and queued on every
//! connection; each socket drains its own queue as it becomes writable.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Reactor
//! One thread polls all sockets with a bounded timeout and processes every
//! event sequentially. The game state, the connection registry and all
//! buffers belong to that thread, so no locks are needed. Other threads reach
//! the game only through a [`reactor::ReactorHandle`].
//!
//! ### Framed TCP
//! Each message is a two-byte big-endian header length, a JSON header
//! describing the payload, and the payload itself. Framing lives in the
//! `shared` crate so the client uses the exact same codec.
//!
//! ## Module Organization
//!
//! - `game`: grid, players, treasure and the rules that change them
//! - `connection`: one socket with its receive parser and outbound buffer
//! - `registry`: token-indexed set of open connections
//! - `dispatcher`: maps a decoded action to replies, broadcasts and identity changes
//! - `broadcaster`: encodes messages once and queues them on their targets
//! - `reactor`: the readiness loop, control channel and threaded runner
//! - `config` and `error`: tunables and the server error type
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::{spawn_server, ServerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = spawn_server(ServerConfig::default())?;
//!     println!("listening on {}", server.addr());
//!
//!     // Inspect the game from outside the reactor thread
//!     let snapshot = server.handle().snapshot()?;
//!     println!("{} players", snapshot.players.len());
//!
//!     server.stop()?;
//!     Ok(())
//! }
//! ```

pub mod broadcaster;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod reactor;
pub mod registry;

pub use config::ServerConfig;
pub use error::{Result, ServerError};
pub use game::{GameError, GameState};
pub use reactor::{
    spawn_server, spawn_server_with_game, ControlMessage, Reactor, ReactorHandle, ServerHandle,
};

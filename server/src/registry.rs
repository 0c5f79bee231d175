//! Connection registry
//!
//! Tracks every open client socket by its poll token. Tokens are handed out
//! in increasing order and never reused during the life of a reactor, so a
//! stale readiness event can never be mistaken for a newer connection.
//!
//! The registry also answers the questions the reactor asks once per loop
//! iteration: which connections were flagged for closing during a broadcast,
//! and which have been silent longer than the idle timeout.

use mio::Token;
use std::collections::HashMap;
use std::time::Duration;

use crate::connection::Connection;

/// First token available to connections; lower values are reserved for the
/// listener and the waker.
pub const FIRST_CONNECTION_TOKEN: usize = 2;

#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
            next_token: FIRST_CONNECTION_TOKEN,
        }
    }

    /// Reserves the token for the next accepted socket.
    pub fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.token, connection);
    }

    pub fn remove(&mut self, token: Token) -> Option<Connection> {
        self.connections.remove(&token)
    }

    pub fn get(&self, token: Token) -> Option<&Connection> {
        self.connections.get(&token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(&token)
    }

    pub fn contains(&self, token: Token) -> bool {
        self.connections.contains_key(&token)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the current tokens in accept order.
    ///
    /// Callers iterate the snapshot, so connections may be removed while the
    /// iteration is in progress.
    pub fn tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self.connections.keys().copied().collect();
        tokens.sort();
        tokens
    }

    /// Token of the connection bound to the given player, if any.
    #[cfg(test)]
    pub fn find_by_identity(&self, name: &str) -> Option<Token> {
        self.connections
            .values()
            .find(|c| c.peer_identity.as_deref() == Some(name))
            .map(|c| c.token)
    }

    /// Clears the binding of `name` from every connection, once the player
    /// has left the game or been eliminated.
    pub fn unbind_identity(&mut self, name: &str) {
        for connection in self.connections.values_mut() {
            if connection.peer_identity.as_deref() == Some(name) {
                connection.peer_identity = None;
            }
        }
    }

    pub fn closing_tokens(&self) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .connections
            .values()
            .filter(|c| c.is_closing())
            .map(|c| c.token)
            .collect();
        tokens.sort();
        tokens
    }

    pub fn idle_tokens(&self, timeout: Duration) -> Vec<Token> {
        let mut tokens: Vec<Token> = self
            .connections
            .values()
            .filter(|c| c.is_idle(timeout))
            .map(|c| c.token)
            .collect();
        tokens.sort();
        tokens
    }

    /// Removes every connection, e.g. on shutdown.
    pub fn drain(&mut self) -> Vec<Connection> {
        self.connections.drain().map(|(_, c)| c).collect()
    }
}

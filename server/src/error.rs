//! Server error type

use mio::Token;
use shared::ProtocolError;
use thiserror::Error;

use crate::game::GameError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("no connection registered for {0:?}")]
    UnknownConnection(Token),

    #[error("outbound buffer exceeded {limit} bytes")]
    SendBufferFull { limit: usize },

    #[error("game error: {0}")]
    Game(#[from] GameError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reactor control channel closed")]
    ControlChannelClosed,

    #[error("reactor thread panicked")]
    ReactorPanicked,
}

pub type Result<T> = std::result::Result<T, ServerError>;

//! Types and wire format shared by the game server and its clients
//!
//! - [`protocol`]: pure frame encode/decode functions
//! - [`frame`]: incremental reassembly of frames from a byte stream
//! - [`message`]: requests, decoded actions, replies and broadcast events
//! - [`types`]: grid positions, directions and game snapshots

pub mod frame;
pub mod message;
pub mod protocol;
pub mod types;

pub use frame::{Frame, FrameParser, ParseState};
pub use message::{Action, Reply, Request, ServerEvent, ServerMessage, UNKNOWN_ACTION_ERROR};
pub use protocol::{
    decode_content, decode_header, decode_header_length, encode, encode_json, encode_message,
    Content, FrameHeader, ProtocolError,
};
pub use types::{Direction, GameSnapshot, PlayerSnapshot, Position};

/// Side length of the default square board.
pub const GRID_SIZE: u32 = 10;
/// Maximum concurrent players; one per corner.
pub const MAX_PLAYERS: usize = 4;
pub const STARTING_HEALTH: u32 = 2;
/// Default TCP port of the game server.
pub const DEFAULT_PORT: u16 = 12345;

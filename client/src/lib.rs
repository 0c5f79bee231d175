//! # Game Client Library
//!
//! Terminal client for the grid treasure-hunt server. The server is
//! authoritative: the client sends requests, then prints whatever the server
//! broadcasts or replies.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! [`network::GameClient`] wraps any async byte stream, writes one frame per
//! request and reassembles incoming frames with the same parser the server
//! uses. Reading is cancellation safe, so it can sit in a `tokio::select!`
//! next to stdin.
//!
//! ### Input Module (`input`)
//! Turns typed lines such as `move ne` or `chat hello` into commands.
//!
//! ### Rendering Module (`rendering`)
//! Prints the board as a text grid plus a per-player summary, and formats
//! every kind of server message.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::GameClient;
//! use client::rendering::render_message;
//! use shared::Direction;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = GameClient::connect("127.0.0.1:12345").await?;
//!     client.join("alice").await?;
//!     client.move_player(Direction::SE).await?;
//!
//!     while let Some(message) = client.next_message().await? {
//!         println!("{}", render_message(&message, client.player_name()));
//!     }
//!     Ok(())
//! }
//! ```

pub mod input;
pub mod network;
pub mod rendering;

pub use input::{parse_command, Command, CommandError};
pub use network::{ClientError, GameClient};

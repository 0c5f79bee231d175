//! Framed connection to the game server

use log::{debug, info};
use shared::{encode_json, Direction, FrameParser, ProtocolError, Request, ServerMessage};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("not joined to a game")]
    NotJoined,
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// A connection to the server over any async byte stream.
pub struct GameClient<S> {
    stream: S,
    parser: FrameParser,
    player_name: Option<String>,
}

impl GameClient<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);
        Ok(Self::new(stream))
    }
}

impl<S> GameClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            parser: FrameParser::new(),
            player_name: None,
        }
    }

    /// Name used by the last `join`, if any.
    pub fn player_name(&self) -> Option<&str> {
        self.player_name.as_deref()
    }

    /// Encodes one request as a single frame and writes it out.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        let frame = encode_json(&request.to_content())?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        debug!("Sent {:?}", request);
        Ok(())
    }

    /// Waits for the next complete message from the server.
    ///
    /// Returns `Ok(None)` once the server closes the connection. Partial frames
    /// are kept across calls, so dropping the future between reads loses no
    /// data.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(frame) = self.parser.next_frame()? {
                return Ok(Some(ServerMessage::from_content(frame.content)));
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                if self.parser.buffered() > 0 {
                    debug!("Server closed with {} unparsed bytes", self.parser.buffered());
                }
                return Ok(None);
            }
            self.parser.extend(&chunk[..n]);
        }
    }

    pub async fn join(&mut self, player_name: &str) -> Result<()> {
        self.send(&Request::Join {
            player_name: player_name.to_string(),
        })
        .await?;
        self.player_name = Some(player_name.to_string());
        Ok(())
    }

    pub async fn leave(&mut self) -> Result<()> {
        let player_name = self.player_name.take().ok_or(ClientError::NotJoined)?;
        self.send(&Request::Leave { player_name }).await
    }

    pub async fn move_player(&mut self, direction: Direction) -> Result<()> {
        let player_name = self.joined_name()?;
        self.send(&Request::Move {
            player_name,
            direction,
        })
        .await
    }

    pub async fn attack(&mut self, target: &str) -> Result<()> {
        let player_name = self.joined_name()?;
        self.send(&Request::Attack {
            player_name,
            target: target.to_string(),
        })
        .await
    }

    pub async fn chat(&mut self, message: &str) -> Result<()> {
        let player_name = self.joined_name()?;
        self.send(&Request::Chat {
            player_name,
            message: message.to_string(),
        })
        .await
    }

    pub async fn request_state(&mut self) -> Result<()> {
        self.send(&Request::GetState).await
    }

    pub async fn replay(&mut self) -> Result<()> {
        self.send(&Request::Replay).await
    }

    fn joined_name(&self) -> Result<String> {
        self.player_name.clone().ok_or(ClientError::NotJoined)
    }
}

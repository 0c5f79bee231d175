//! Incremental frame reassembly
//!
//! TCP delivers a byte stream, not messages: one read may hold half a header,
//! or three whole frames and the start of a fourth. [`FrameParser`] owns the
//! receive buffer for one peer and walks a small state machine over it:
//!
//! - `AwaitingHeaderLength`: need the 2-byte prefix
//! - `AwaitingHeaderBody`: prefix read, need `header_len` bytes of JSON header
//! - `AwaitingPayload`: header parsed, need `content-length` payload bytes
//!
//! A completed frame is returned from [`FrameParser::next_frame`] and the state
//! goes back to `AwaitingHeaderLength`, so pipelined frames are drained by
//! calling it until it yields `Ok(None)`.

use bytes::{Buf, BytesMut};

use crate::protocol::{
    decode_content, decode_header, decode_header_length, Content, FrameHeader, ProtocolError,
    DEFAULT_MAX_CONTENT_LENGTH,
};

/// A fully received frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    pub content: Content,
}

/// Where the parser is within the current frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseState {
    AwaitingHeaderLength,
    AwaitingHeaderBody { header_len: usize },
    AwaitingPayload { header: FrameHeader },
}

/// Receive buffer plus frame reassembly state for one peer.
#[derive(Debug)]
pub struct FrameParser {
    buffer: BytesMut,
    state: ParseState,
    max_content_length: usize,
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameParser {
    pub fn new() -> Self {
        Self::with_max_content_length(DEFAULT_MAX_CONTENT_LENGTH)
    }

    pub fn with_max_content_length(max_content_length: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: ParseState::AwaitingHeaderLength,
            max_content_length,
        }
    }

    /// Appends freshly received bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Appends `data` and returns every frame it completes.
    ///
    /// Convenience for callers that do not need to act between frames.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>, ProtocolError> {
        self.extend(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Advances the state machine as far as the buffered bytes allow.
    ///
    /// Returns `Ok(Some(frame))` when a frame completes, `Ok(None)` when more
    /// bytes are needed. After an `Err` the stream is unrecoverable.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        loop {
            match &self.state {
                ParseState::AwaitingHeaderLength => {
                    let Some((header_len, consumed)) = decode_header_length(&self.buffer) else {
                        return Ok(None);
                    };
                    self.buffer.advance(consumed);
                    self.state = ParseState::AwaitingHeaderBody { header_len };
                }

                ParseState::AwaitingHeaderBody { header_len } => {
                    let header_len = *header_len;
                    if self.buffer.len() < header_len {
                        return Ok(None);
                    }
                    let header = decode_header(&self.buffer, header_len)?;
                    if header.content_length > self.max_content_length {
                        return Err(ProtocolError::ContentTooLarge {
                            length: header.content_length,
                            max: self.max_content_length,
                        });
                    }
                    self.buffer.advance(header_len);
                    self.state = ParseState::AwaitingPayload { header };
                }

                ParseState::AwaitingPayload { header } => {
                    let Some(content) = decode_content(&self.buffer, header)? else {
                        return Ok(None);
                    };
                    self.buffer.advance(header.content_length);

                    let ParseState::AwaitingPayload { header } =
                        std::mem::replace(&mut self.state, ParseState::AwaitingHeaderLength)
                    else {
                        unreachable!("state checked above");
                    };
                    return Ok(Some(Frame { header, content }));
                }
            }
        }
    }

    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// The header of the frame currently being received, once parsed.
    #[cfg(test)]
    pub fn pending_header(&self) -> Option<&FrameHeader> {
        match &self.state {
            ParseState::AwaitingPayload { header } => Some(header),
            _ => None,
        }
    }

    /// Number of received bytes not yet consumed by a completed frame step.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

//! Wire codec for length-prefixed, self-describing frames
//!
//! Every frame on the wire has three parts:
//!
//! ```text
//! [2 bytes, big-endian]    header length
//! [header length bytes]    JSON header: byteorder, content-type, content-encoding, content-length
//! [content-length bytes]   payload, decoded per content-encoding
//! ```
//!
//! The functions here are pure: they never touch a socket and never hold state.
//! "Not enough bytes yet" is reported as `None` so callers can wait for the next
//! read, while bytes that can never form a valid frame are reported as a
//! [`ProtocolError`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Size of the big-endian header length prefix.
pub const HEADER_LENGTH_PREFIX: usize = 2;

/// Content type used for every game message.
pub const JSON_CONTENT_TYPE: &str = "text/json";

/// Content encoding used for every game message.
pub const UTF8_ENCODING: &str = "utf-8";

/// Upper bound on a single payload. Protects against unbounded buffering from a
/// bogus `content-length`.
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

const REQUIRED_HEADER_KEYS: [&str; 4] = [
    "byteorder",
    "content-type",
    "content-encoding",
    "content-length",
];

/// Errors produced while encoding or decoding frames
///
/// None of these represent "wait for more data"; that condition is always
/// expressed as `Ok(None)` / `None` by the decoding functions.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed content: {0}")]
    MalformedContent(String),

    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("header is {0} bytes, larger than the 2-byte length prefix allows")]
    HeaderTooLarge(usize),

    #[error("content length {length} exceeds maximum {max}")]
    ContentTooLarge { length: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Metadata describing the payload that follows it
///
/// Field order matches the serialized key order, which keeps encoding
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub byteorder: String,
    #[serde(rename = "content-type")]
    pub content_type: String,
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    #[serde(rename = "content-length")]
    pub content_length: usize,
}

impl FrameHeader {
    pub fn is_json(&self) -> bool {
        self.content_type == JSON_CONTENT_TYPE
    }
}

/// A decoded payload
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Json(Value),
    Binary(Vec<u8>),
}

impl Content {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Content::Json(value) => Some(value),
            Content::Binary(_) => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            Content::Json(value) => Some(value),
            Content::Binary(_) => None,
        }
    }
}

/// Byte order tag of the encoding host, written into every header.
pub fn native_byteorder() -> &'static str {
    if cfg!(target_endian = "big") {
        "big"
    } else {
        "little"
    }
}

fn normalize_encoding(encoding: &str) -> Result<TextEncoding, ProtocolError> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
        "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
        _ => Err(ProtocolError::UnsupportedEncoding(encoding.to_string())),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextEncoding {
    Utf8,
    Ascii,
}

impl TextEncoding {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Result<&'a str, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::MalformedContent(format!("invalid text: {e}")))?;
        if *self == TextEncoding::Ascii && !text.is_ascii() {
            return Err(ProtocolError::MalformedContent(
                "non-ascii byte in ascii content".to_string(),
            ));
        }
        Ok(text)
    }

    fn encode(&self, text: String) -> Result<Vec<u8>, ProtocolError> {
        if *self == TextEncoding::Ascii && !text.is_ascii() {
            return Err(ProtocolError::MalformedContent(
                "content cannot be represented as ascii".to_string(),
            ));
        }
        Ok(text.into_bytes())
    }
}

/// Encodes structured content as one complete frame.
pub fn encode(
    content: &Value,
    content_type: &str,
    encoding: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let text_encoding = normalize_encoding(encoding)?;
    let content_bytes = text_encoding.encode(serde_json::to_string(content)?)?;
    encode_bytes(&content_bytes, content_type, encoding)
}

/// Encodes a JSON message with the default content type and encoding.
pub fn encode_json(content: &Value) -> Result<Vec<u8>, ProtocolError> {
    encode(content, JSON_CONTENT_TYPE, UTF8_ENCODING)
}

/// Serializes any message type to JSON and frames it.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    encode_json(&serde_json::to_value(message)?)
}

/// Wraps already-serialized payload bytes in a frame.
pub fn encode_bytes(
    content: &[u8],
    content_type: &str,
    encoding: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let header = FrameHeader {
        byteorder: native_byteorder().to_string(),
        content_type: content_type.to_string(),
        content_encoding: encoding.to_string(),
        content_length: content.len(),
    };
    let header_bytes = serde_json::to_vec(&header)?;
    let header_len = u16::try_from(header_bytes.len())
        .map_err(|_| ProtocolError::HeaderTooLarge(header_bytes.len()))?;

    let mut frame = Vec::with_capacity(HEADER_LENGTH_PREFIX + header_bytes.len() + content.len());
    frame.extend_from_slice(&header_len.to_be_bytes());
    frame.extend_from_slice(&header_bytes);
    frame.extend_from_slice(content);
    Ok(frame)
}

/// Reads the 2-byte header length prefix.
///
/// Returns `(header_len, bytes_consumed)`, or `None` when fewer than two bytes
/// are buffered.
pub fn decode_header_length(buffer: &[u8]) -> Option<(usize, usize)> {
    if buffer.len() < HEADER_LENGTH_PREFIX {
        return None;
    }
    let header_len = u16::from_be_bytes([buffer[0], buffer[1]]) as usize;
    Some((header_len, HEADER_LENGTH_PREFIX))
}

/// Parses the JSON header occupying the first `header_len` bytes of `buffer`.
///
/// The caller must have buffered at least `header_len` bytes; a shorter buffer
/// is reported as malformed.
pub fn decode_header(buffer: &[u8], header_len: usize) -> Result<FrameHeader, ProtocolError> {
    if buffer.len() < header_len {
        return Err(ProtocolError::MalformedHeader(format!(
            "expected {header_len} header bytes, got {}",
            buffer.len()
        )));
    }

    let raw: Value = serde_json::from_slice(&buffer[..header_len])
        .map_err(|e| ProtocolError::MalformedHeader(format!("invalid JSON: {e}")))?;

    let object = raw
        .as_object()
        .ok_or_else(|| ProtocolError::MalformedHeader("header is not an object".to_string()))?;
    for key in REQUIRED_HEADER_KEYS {
        if !object.contains_key(key) {
            return Err(ProtocolError::MalformedHeader(format!(
                "missing required header \"{key}\""
            )));
        }
    }

    serde_json::from_value(raw).map_err(|e| ProtocolError::MalformedHeader(e.to_string()))
}

/// Decodes the payload described by `header` from the front of `buffer`.
///
/// Returns `Ok(None)` while fewer than `content-length` bytes are available.
pub fn decode_content(
    buffer: &[u8],
    header: &FrameHeader,
) -> Result<Option<Content>, ProtocolError> {
    if buffer.len() < header.content_length {
        return Ok(None);
    }
    let bytes = &buffer[..header.content_length];

    if !header.is_json() {
        return Ok(Some(Content::Binary(bytes.to_vec())));
    }

    let text = normalize_encoding(&header.content_encoding)?.decode(bytes)?;
    let value = serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedContent(format!("invalid JSON: {e}")))?;
    Ok(Some(Content::Json(value)))
}

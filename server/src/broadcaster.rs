//! Message delivery to one or all connections
//!
//! Messages are encoded once and the same frame bytes are appended to each
//! target's outbound buffer. Nothing is written to a socket here; delivery
//! happens when the reactor services write readiness.
//!
//! A target that cannot accept the frame (outbound limit reached, or the
//! interest update failed) is flagged for closing and removed by the reactor
//! on its next iteration, so a fan-out never mutates the registry it is
//! iterating.

use log::{debug, warn};
use mio::{Registry, Token};
use serde::Serialize;
use shared::{encode_message, ProtocolError};

use crate::connection::Connection;
use crate::error::{Result, ServerError};
use crate::registry::ConnectionRegistry;

/// Encodes `message` and queues it on every live connection.
///
/// Returns the number of connections the frame was queued on.
pub fn broadcast<T: Serialize>(
    connections: &mut ConnectionRegistry,
    registry: &Registry,
    message: &T,
) -> std::result::Result<usize, ProtocolError> {
    let bytes = encode_message(message)?;
    let targets = connections.tokens();
    Ok(fan_out(connections, registry, &targets, &bytes))
}

/// Queues pre-encoded frame bytes on each of `targets`.
///
/// Targets that are no longer registered are skipped.
pub fn fan_out(
    connections: &mut ConnectionRegistry,
    registry: &Registry,
    targets: &[Token],
    bytes: &[u8],
) -> usize {
    let mut delivered = 0;
    for &token in targets {
        let Some(connection) = connections.get_mut(token) else {
            debug!("Skipping {:?}: closed during broadcast", token);
            continue;
        };
        if connection.is_closing() {
            continue;
        }
        match enqueue(connection, registry, bytes) {
            Ok(()) => delivered += 1,
            Err(e) => {
                warn!("Dropping {}: {}", connection.addr, e);
                connection.mark_closing();
            }
        }
    }
    debug!("Broadcast {} bytes to {} connections", bytes.len(), delivered);
    delivered
}

/// Encodes `message` and queues it on a single connection.
pub fn send_to<T: Serialize>(
    connections: &mut ConnectionRegistry,
    registry: &Registry,
    token: Token,
    message: &T,
) -> Result<()> {
    let bytes = encode_message(message)?;
    let connection = connections
        .get_mut(token)
        .ok_or(ServerError::UnknownConnection(token))?;
    if let Err(e) = enqueue(connection, registry, &bytes) {
        connection.mark_closing();
        return Err(e);
    }
    Ok(())
}

fn enqueue(
    connection: &mut Connection,
    registry: &Registry,
    bytes: &[u8],
) -> Result<()> {
    connection.queue(bytes)?;
    connection.sync_interest(registry)?;
    Ok(())
}

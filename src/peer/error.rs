//! Peer-related errors.

use std::io;

use thiserror::Error;
use tokio::time::error::Elapsed;

use crate::{protocol::types::Version, serialization::SerializationError};

/// An error that interrupts a peer connection.
///
/// Any of these ends the connection; the dispatcher logs the error and moves
/// on to another peer.
#[derive(Error, Debug)]
pub enum PeerError {
    /// The remote peer closed the connection.
    #[error("peer closed connection")]
    ConnectionClosed,

    /// The peer sent a message with a network magic other than ours.
    #[error("peer sent a message with the wrong network magic")]
    WrongMagic,

    /// The peer declared a message body larger than the protocol limit.
    #[error("peer declared an oversized message body of {0} bytes")]
    OversizedMessage(u32),

    /// The peer sent a message that failed to deserialize.
    #[error("malformed message from peer: {0}")]
    Serialization(#[from] SerializationError),

    /// The peer sent a second `version` message.
    #[error("peer sent a duplicate version message")]
    DuplicateVersion,

    /// The peer sent a second `verack` message.
    #[error("peer sent a duplicate verack message")]
    DuplicateVerack,

    /// The peer sent a message out of handshake order.
    #[error("peer sent {0} before completing the handshake")]
    UnexpectedMessage(String),

    /// The peer is running a protocol version too old to talk to.
    #[error("peer protocol version {0:?} is obsolete")]
    ObsoleteVersion(Version),

    /// The peer does not provide the network services we require.
    #[error("peer does not advertise the NODE_NETWORK service")]
    MissingServices,

    /// The peer sent back our own nonce: we connected to ourselves.
    #[error("connection to self detected by nonce")]
    NonceReuse,

    /// An outbound connect attempt took too long.
    #[error("connect attempt timed out")]
    ConnectTimeout(#[from] Elapsed),

    /// An underlying network error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

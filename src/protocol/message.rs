//! Definitions of network messages.

use std::{fmt, net::SocketAddr};

use crate::{
    meta_addr::MetaAddr,
    protocol::types::{Nonce, PeerServices, Version},
};

/// A network message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    /// A `version` message, opening the handshake.
    Version(VersionMessage),

    /// A `verack` message, acknowledging a received `version`.
    Verack,

    /// An `addr` message, gossiping known peer addresses.
    Addr(Vec<MetaAddr>),

    /// A `getaddr` message, requesting an `addr` in reply.
    GetAddr,

    /// A message whose command we do not implement.
    ///
    /// Unknown messages are ignored after the handshake completes, so the
    /// body is dropped at decode time and only the command is kept for
    /// logging.
    Unknown([u8; 12]),
}

impl Message {
    /// The NUL-padded command field carried in this message's header.
    pub fn command(&self) -> [u8; 12] {
        match self {
            Message::Version(_) => *b"version\0\0\0\0\0",
            Message::Verack => *b"verack\0\0\0\0\0\0",
            Message::Addr(_) => *b"addr\0\0\0\0\0\0\0\0",
            Message::GetAddr => *b"getaddr\0\0\0\0\0",
            Message::Unknown(command) => *command,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let command = self.command();
        let trimmed = command
            .iter()
            .position(|&b| b == 0)
            .map_or(&command[..], |n| &command[..n]);
        f.write_str(&String::from_utf8_lossy(trimmed))
    }
}

/// The contents of a `version` message.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionMessage {
    /// The network protocol version of the sender.
    pub version: Version,

    /// The services advertised by the sender.
    pub services: PeerServices,

    /// The timestamp of the message, in seconds since the Unix epoch.
    pub timestamp: i64,

    /// The network address of the receiver, as seen by the sender.
    pub address_recv: AddrInVersion,

    /// The network address of the sender.
    pub address_from: AddrInVersion,

    /// A random nonce identifying the sending process instance, used to
    /// detect connections to self.
    pub nonce: Nonce,

    /// The sender's user agent string.
    pub user_agent: String,

    /// The height of the sender's best block.
    pub start_height: u32,
}

/// An address in a `version` message: services, IP, and port, with no
/// timestamp.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AddrInVersion {
    /// The services advertised at this address.
    pub services: PeerServices,

    /// The address itself.
    pub addr: SocketAddr,
}

impl AddrInVersion {
    /// Build an address field for a `version` message.
    pub fn new(addr: SocketAddr, services: PeerServices) -> AddrInVersion {
        AddrInVersion { services, addr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_fields_are_nul_padded() {
        assert_eq!(&Message::Verack.command(), b"verack\0\0\0\0\0\0");
        assert_eq!(&Message::GetAddr.command(), b"getaddr\0\0\0\0\0");
        assert_eq!(&Message::Addr(Vec::new()).command(), b"addr\0\0\0\0\0\0\0\0");
    }

    #[test]
    fn display_trims_padding() {
        assert_eq!(Message::Verack.to_string(), "verack");
        assert_eq!(
            Message::Unknown(*b"inv\0\0\0\0\0\0\0\0\0").to_string(),
            "inv"
        );
    }
}
